pub mod providers;
pub mod service;

pub use providers::{
    default_provider_stack, BinanceProvider, CoinGeckoProvider, CryptoCompareProvider,
    InternalPriceApiProvider,
};
pub use service::{PriceService, PriceServiceConfig};

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PriceError {
    #[error("Network request failed: {0}")]
    NetworkError(#[from] reqwest::Error),
    #[error("Request timeout: {0}")]
    Timeout(String),
    #[error("Invalid response from provider: {0}")]
    InvalidResponse(String),
    #[error("Symbol not listed: {0}")]
    SymbolNotListed(String),
    #[error("Provider does not quote trading pairs")]
    PairUnsupported,
    #[error("Non-positive price returned: {0}")]
    NonPositivePrice(f64),
}

/// One upstream price source. Providers are tried in order by the service;
/// any error means "skip to the next provider", never a caller-visible
/// failure.
#[async_trait]
pub trait PriceProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch_usd_price(&self, symbol: &str) -> Result<f64, PriceError>;

    /// Batch lookup. Providers without a batch endpoint fall back to the
    /// single-symbol call for the first symbol only; the service budgets
    /// live calls either way.
    async fn fetch_usd_prices(&self, symbols: &[String]) -> Result<HashMap<String, f64>, PriceError> {
        let mut prices = HashMap::new();
        if let Some(first) = symbols.first() {
            prices.insert(first.clone(), self.fetch_usd_price(first).await?);
        }
        Ok(prices)
    }

    /// Direct trading-pair quote. Only exchange-backed providers support
    /// this; the default declines so the service falls through to the
    /// USD-price ratio.
    async fn fetch_pair_rate(&self, _from: &str, _to: &str) -> Result<f64, PriceError> {
        Err(PriceError::PairUnsupported)
    }
}
