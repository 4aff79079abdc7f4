use super::{PriceError, PriceProvider};
use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const PROVIDER_TIMEOUT: Duration = Duration::from_secs(8);

fn build_http_client() -> HttpClient {
    HttpClient::builder()
        .timeout(PROVIDER_TIMEOUT)
        .user_agent("LutarPresale/1.0")
        .build()
        .expect("Failed to create HTTP client")
}

fn positive(price: f64) -> Result<f64, PriceError> {
    if price > 0.0 && price.is_finite() {
        Ok(price)
    } else {
        Err(PriceError::NonPositivePrice(price))
    }
}

/// Internal price endpoint (`/prices`), tried before any external provider.
/// The proxy already applies its own cache and fallback injection.
pub struct InternalPriceApiProvider {
    http_client: HttpClient,
    base_url: String,
}

impl InternalPriceApiProvider {
    pub fn new() -> Self {
        let base_url = std::env::var("PRICE_API_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:8080".to_string());
        Self::with_base_url(base_url)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            http_client: build_http_client(),
            base_url: base_url.into(),
        }
    }
}

impl Default for InternalPriceApiProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PriceProvider for InternalPriceApiProvider {
    fn name(&self) -> &'static str {
        "internal"
    }

    async fn fetch_usd_price(&self, symbol: &str) -> Result<f64, PriceError> {
        let prices = self.fetch_usd_prices(&[symbol.to_string()]).await?;
        prices
            .get(&symbol.to_uppercase())
            .copied()
            .ok_or_else(|| PriceError::SymbolNotListed(symbol.to_string()))
    }

    async fn fetch_usd_prices(&self, symbols: &[String]) -> Result<HashMap<String, f64>, PriceError> {
        let url = format!("{}/prices?symbols={}", self.base_url, symbols.join(","));
        let response = self.http_client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(PriceError::InvalidResponse(format!(
                "internal API returned {}",
                response.status()
            )));
        }
        let body: Value = response.json().await?;
        let mut prices = HashMap::new();
        if let Some(map) = body.get("prices").and_then(Value::as_object) {
            for (symbol, price) in map {
                if let Some(p) = price.as_f64() {
                    if let Ok(p) = positive(p) {
                        prices.insert(symbol.to_uppercase(), p);
                    }
                }
            }
        }
        if prices.is_empty() {
            return Err(PriceError::InvalidResponse("empty prices object".to_string()));
        }
        Ok(prices)
    }
}

/// CoinGecko simple-price aggregator.
pub struct CoinGeckoProvider {
    http_client: HttpClient,
    base_url: String,
}

impl CoinGeckoProvider {
    pub fn new() -> Self {
        Self::with_base_url("https://api.coingecko.com/api/v3")
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            http_client: build_http_client(),
            base_url: base_url.into(),
        }
    }

    fn coin_id(symbol: &str) -> Option<&'static str> {
        match symbol.to_uppercase().as_str() {
            "ETH" => Some("ethereum"),
            "BNB" => Some("binancecoin"),
            "POL" => Some("polygon-ecosystem-token"),
            "BTC" => Some("bitcoin"),
            "TRX" => Some("tron"),
            "SOL" => Some("solana"),
            "TON" => Some("the-open-network"),
            "USDT" => Some("tether"),
            "USDC" => Some("usd-coin"),
            _ => None,
        }
    }
}

impl Default for CoinGeckoProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PriceProvider for CoinGeckoProvider {
    fn name(&self) -> &'static str {
        "coingecko"
    }

    async fn fetch_usd_price(&self, symbol: &str) -> Result<f64, PriceError> {
        let id = Self::coin_id(symbol)
            .ok_or_else(|| PriceError::SymbolNotListed(symbol.to_string()))?;
        let url = format!(
            "{}/simple/price?ids={}&vs_currencies=usd",
            self.base_url, id
        );
        let response = self.http_client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(PriceError::InvalidResponse(format!(
                "coingecko returned {}",
                response.status()
            )));
        }
        let body: Value = response.json().await?;
        let price = body
            .get(id)
            .and_then(|v| v.get("usd"))
            .and_then(Value::as_f64)
            .ok_or_else(|| PriceError::InvalidResponse(format!("no usd price for {id}")))?;
        positive(price)
    }

    async fn fetch_usd_prices(&self, symbols: &[String]) -> Result<HashMap<String, f64>, PriceError> {
        let ids: Vec<(&str, &'static str)> = symbols
            .iter()
            .filter_map(|s| Self::coin_id(s).map(|id| (s.as_str(), id)))
            .collect();
        if ids.is_empty() {
            return Err(PriceError::SymbolNotListed(symbols.join(",")));
        }
        let id_list = ids.iter().map(|(_, id)| *id).collect::<Vec<_>>().join(",");
        let url = format!(
            "{}/simple/price?ids={}&vs_currencies=usd",
            self.base_url, id_list
        );
        let response = self.http_client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(PriceError::InvalidResponse(format!(
                "coingecko returned {}",
                response.status()
            )));
        }
        let body: Value = response.json().await?;
        let mut prices = HashMap::new();
        for (symbol, id) in ids {
            if let Some(p) = body.get(id).and_then(|v| v.get("usd")).and_then(Value::as_f64) {
                if let Ok(p) = positive(p) {
                    prices.insert(symbol.to_uppercase(), p);
                }
            }
        }
        debug!("CoinGecko batch resolved {}/{} symbols", prices.len(), symbols.len());
        Ok(prices)
    }
}

/// Binance spot ticker. The only provider in the default stack that quotes
/// trading pairs directly.
pub struct BinanceProvider {
    http_client: HttpClient,
    base_url: String,
}

impl BinanceProvider {
    pub fn new() -> Self {
        Self::with_base_url("https://api.binance.com/api/v3")
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            http_client: build_http_client(),
            base_url: base_url.into(),
        }
    }

    async fn ticker_price(&self, pair: &str) -> Result<f64, PriceError> {
        let url = format!("{}/ticker/price?symbol={}", self.base_url, pair);
        let response = self.http_client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(PriceError::InvalidResponse(format!(
                "binance returned {} for {}",
                response.status(),
                pair
            )));
        }
        let body: Value = response.json().await?;
        let price = body
            .get("price")
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<f64>().ok())
            .ok_or_else(|| PriceError::InvalidResponse(format!("no price field for {pair}")))?;
        positive(price)
    }
}

impl Default for BinanceProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PriceProvider for BinanceProvider {
    fn name(&self) -> &'static str {
        "binance"
    }

    async fn fetch_usd_price(&self, symbol: &str) -> Result<f64, PriceError> {
        // Binance quotes against USDT, which the service treats as USD.
        let upper = symbol.to_uppercase();
        if upper == "USDT" || upper == "USDC" {
            return Ok(1.0);
        }
        self.ticker_price(&format!("{upper}USDT")).await
    }

    async fn fetch_pair_rate(&self, from: &str, to: &str) -> Result<f64, PriceError> {
        let pair = format!("{}{}", from.to_uppercase(), to.to_uppercase());
        match self.ticker_price(&pair).await {
            Ok(rate) => Ok(rate),
            Err(_) => {
                // Inverse listing (e.g. no SOLBNB but BNBSOL may exist).
                let inverse = format!("{}{}", to.to_uppercase(), from.to_uppercase());
                let rate = self.ticker_price(&inverse).await?;
                positive(1.0 / rate)
            }
        }
    }
}

/// CryptoCompare single-symbol quotes, last resort before the static table.
pub struct CryptoCompareProvider {
    http_client: HttpClient,
    base_url: String,
}

impl CryptoCompareProvider {
    pub fn new() -> Self {
        Self::with_base_url("https://min-api.cryptocompare.com")
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            http_client: build_http_client(),
            base_url: base_url.into(),
        }
    }
}

impl Default for CryptoCompareProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PriceProvider for CryptoCompareProvider {
    fn name(&self) -> &'static str {
        "cryptocompare"
    }

    async fn fetch_usd_price(&self, symbol: &str) -> Result<f64, PriceError> {
        let url = format!(
            "{}/data/price?fsym={}&tsyms=USD",
            self.base_url,
            symbol.to_uppercase()
        );
        let response = self.http_client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(PriceError::InvalidResponse(format!(
                "cryptocompare returned {}",
                response.status()
            )));
        }
        let body: Value = response.json().await?;
        let price = body
            .get("USD")
            .and_then(Value::as_f64)
            .ok_or_else(|| PriceError::InvalidResponse(format!("no USD quote for {symbol}")))?;
        positive(price)
    }
}

/// Default ordered provider stack: internal proxy first, then three
/// independent public sources.
pub fn default_provider_stack() -> Vec<Arc<dyn PriceProvider>> {
    vec![
        Arc::new(InternalPriceApiProvider::new()),
        Arc::new(CoinGeckoProvider::new()),
        Arc::new(BinanceProvider::new()),
        Arc::new(CryptoCompareProvider::new()),
    ]
}
