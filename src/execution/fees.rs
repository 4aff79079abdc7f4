use crate::types::{Chain, CurrencyKind, PaymentCurrency};
use crate::wallets::ProviderRegistry;
use dashmap::DashMap;
use serde_json::json;
use std::time::{Duration, Instant};
use tracing::debug;

const FEE_CACHE_TTL: Duration = Duration::from_secs(30);
const ESTIMATE_TIMEOUT: Duration = Duration::from_millis(500);

const NATIVE_TRANSFER_GAS: u64 = 21_000;
const TOKEN_TRANSFER_GAS: u64 = 65_000;

/// Injected globals that answer `eth_gasPrice`, in preference order.
const EVM_PROVIDER_GLOBALS: [&str; 2] = ["ethereum", "trustwallet"];

#[derive(Debug, Clone)]
pub struct FeeEstimate {
    pub chain: Chain,
    /// Estimated fee in the chain's native currency.
    pub fee_native: f64,
    /// True when the static default was used instead of a live quote.
    pub approximate: bool,
}

/// Best-effort fee estimation. Failures fall back to conservative static
/// defaults; this never blocks or fails a payment.
pub struct FeeEstimator {
    providers: ProviderRegistry,
    cache: DashMap<(Chain, CurrencyKind), (FeeEstimate, Instant)>,
}

impl FeeEstimator {
    pub fn new(providers: ProviderRegistry) -> Self {
        Self {
            providers,
            cache: DashMap::new(),
        }
    }

    pub async fn estimate(&self, currency: &PaymentCurrency) -> FeeEstimate {
        let key = (currency.chain, currency.kind);
        if let Some(entry) = self.cache.get(&key) {
            let (estimate, at) = entry.value();
            if at.elapsed() < FEE_CACHE_TTL {
                return estimate.clone();
            }
        }

        let estimate = match self.live_estimate(currency).await {
            Some(estimate) => estimate,
            None => {
                let fallback = static_fee(currency.chain, currency.kind);
                debug!(
                    "Fee estimation degraded for {}, using static {} {}",
                    currency.symbol,
                    fallback,
                    currency.chain.as_str()
                );
                FeeEstimate {
                    chain: currency.chain,
                    fee_native: fallback,
                    approximate: true,
                }
            }
        };
        self.cache.insert(key, (estimate.clone(), Instant::now()));
        estimate
    }

    /// Live gas-price quote through the EVM injected provider. Non-EVM
    /// chains always use the static table.
    async fn live_estimate(&self, currency: &PaymentCurrency) -> Option<FeeEstimate> {
        if !currency.chain.is_evm() {
            return None;
        }
        let provider = EVM_PROVIDER_GLOBALS
            .iter()
            .find_map(|global| self.providers.get(global))?;
        let response = tokio::time::timeout(
            ESTIMATE_TIMEOUT,
            provider.request("eth_gasPrice", json!([])),
        )
        .await
        .ok()?
        .ok()?;
        let gas_price_wei = response
            .as_str()
            .and_then(|s| u128::from_str_radix(s.trim_start_matches("0x"), 16).ok())?;
        let gas_limit = match currency.kind {
            CurrencyKind::Native => NATIVE_TRANSFER_GAS,
            CurrencyKind::Token => TOKEN_TRANSFER_GAS,
        };
        Some(FeeEstimate {
            chain: currency.chain,
            fee_native: (gas_price_wei as f64 * gas_limit as f64) / 1e18,
            approximate: false,
        })
    }
}

fn static_fee(chain: Chain, kind: CurrencyKind) -> f64 {
    let base = match chain {
        Chain::Ethereum => 0.0015,
        Chain::Bnb => 0.0003,
        Chain::Polygon => 0.01,
        Chain::Tron => 1.1,
        Chain::Solana => 0.000005,
        Chain::Ton => 0.005,
        Chain::Bitcoin => 0.0001,
    };
    match kind {
        CurrencyKind::Native => base,
        CurrencyKind::Token => base * 3.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chains::resolve_payment_currency;
    use crate::wallets::{InjectedProvider, ProviderError};
    use async_trait::async_trait;
    use std::sync::Arc;

    struct GasPriceProvider;

    #[async_trait]
    impl InjectedProvider for GasPriceProvider {
        async fn request(
            &self,
            method: &str,
            _params: serde_json::Value,
        ) -> Result<serde_json::Value, ProviderError> {
            match method {
                "eth_gasPrice" => Ok(json!("0x3b9aca00")), // 1 gwei
                other => Err(ProviderError::UnsupportedMethod(other.to_string())),
            }
        }
    }

    #[tokio::test]
    async fn test_fallback_without_provider() {
        let estimator = FeeEstimator::new(ProviderRegistry::new());
        let currency = resolve_payment_currency("ETH", Chain::Ethereum).unwrap();
        let estimate = estimator.estimate(&currency).await;
        assert!(estimate.approximate);
        assert!(estimate.fee_native > 0.0);
    }

    #[tokio::test]
    async fn test_token_fee_exceeds_native_fee() {
        let estimator = FeeEstimator::new(ProviderRegistry::new());
        let native = estimator
            .estimate(&resolve_payment_currency("TRX", Chain::Tron).unwrap())
            .await;
        let token = estimator
            .estimate(&resolve_payment_currency("USDT", Chain::Tron).unwrap())
            .await;
        assert!(token.fee_native > native.fee_native);
    }

    #[tokio::test]
    async fn test_live_quote_through_any_evm_global() {
        // Only the Trust Wallet global is present; the estimate must still
        // come from a live gas price, not the static table.
        let providers = ProviderRegistry::new();
        providers.register("trustwallet", Arc::new(GasPriceProvider));
        let estimator = FeeEstimator::new(providers);

        let currency = resolve_payment_currency("ETH", Chain::Ethereum).unwrap();
        let estimate = estimator.estimate(&currency).await;
        assert!(!estimate.approximate);
        // 1 gwei * 21000 gas
        assert!((estimate.fee_native - 0.000021).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_estimates_are_cached() {
        let estimator = FeeEstimator::new(ProviderRegistry::new());
        let currency = resolve_payment_currency("SOL", Chain::Solana).unwrap();
        let first = estimator.estimate(&currency).await;
        let second = estimator.estimate(&currency).await;
        assert_eq!(first.fee_native, second.fee_native);
        assert_eq!(estimator.cache.len(), 1);
    }
}
