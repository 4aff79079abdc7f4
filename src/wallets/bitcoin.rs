use super::injected::{InjectedProvider, ProviderError, ProviderRegistry};
use super::{BalanceOutcome, ConnectOutcome, PaymentPayload, WalletAdapter};
use crate::types::{Chain, TransactionResult, TxErrorKind};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

const GLOBAL_NAME: &str = "unisat";

/// Unisat covers connect and balance only. Payment execution on Bitcoin
/// needs UTXO selection the injected-wallet pattern does not expose, so
/// `send_payment` refuses instead of attempting a partial implementation.
pub struct UnisatAdapter {
    providers: ProviderRegistry,
}

impl UnisatAdapter {
    pub fn new(providers: ProviderRegistry) -> Self {
        Self { providers }
    }

    fn provider(&self) -> Option<Arc<dyn InjectedProvider>> {
        self.providers.get(GLOBAL_NAME)
    }
}

#[async_trait]
impl WalletAdapter for UnisatAdapter {
    fn name(&self) -> &'static str {
        "unisat"
    }

    fn display_name(&self) -> &'static str {
        "Unisat"
    }

    fn install_url(&self) -> &'static str {
        "https://unisat.io/download"
    }

    fn supported_chains(&self) -> Vec<Chain> {
        vec![Chain::Bitcoin]
    }

    fn is_installed(&self) -> bool {
        self.providers.is_present(GLOBAL_NAME)
    }

    async fn connect(&self, chain_hint: Option<Chain>) -> ConnectOutcome {
        if let Some(hint) = chain_hint.filter(|c| *c != Chain::Bitcoin) {
            debug!("Unisat ignoring chain hint {}", hint.as_str());
        }
        let Some(provider) = self.provider() else {
            return ConnectOutcome::failed_with(
                TxErrorKind::WalletNotInstalled,
                "Unisat is not installed",
            );
        };
        let response = match provider.request("requestAccounts", json!([])).await {
            Ok(response) => response,
            Err(ProviderError::UserRejected) => {
                return ConnectOutcome::failed_with(
                    TxErrorKind::UserRejected,
                    "Connection request was rejected in Unisat",
                )
            }
            Err(err) => return ConnectOutcome::failed(format!("Unisat error: {err}")),
        };
        let Some(address) = response
            .as_array()
            .and_then(|a| a.first())
            .and_then(Value::as_str)
            .map(str::to_string)
        else {
            return ConnectOutcome::failed("Unisat returned no accounts");
        };
        let balance = match provider.request("getBalance", json!([])).await {
            Ok(v) => v
                .get("confirmed")
                .and_then(Value::as_u64)
                .map(|sats| sats as f64 / 1e8),
            Err(_) => None,
        };
        info!("Unisat connected as {}", address);
        ConnectOutcome::connected(address, balance, Chain::Bitcoin)
    }

    async fn disconnect(&self) {
        debug!("Unisat disconnect requested");
    }

    async fn get_balance(&self, _address: &str) -> BalanceOutcome {
        let Some(provider) = self.provider() else {
            return BalanceOutcome::failed("Unisat is not installed");
        };
        match provider.request("getBalance", json!([])).await {
            Ok(response) => match response.get("confirmed").and_then(Value::as_u64) {
                Some(sats) => BalanceOutcome::ok(sats as f64 / 1e8),
                None => BalanceOutcome::failed("Malformed balance response"),
            },
            Err(err) => BalanceOutcome::failed(format!("Unisat error: {err}")),
        }
    }

    async fn send_payment(&self, _payload: PaymentPayload) -> TransactionResult {
        TransactionResult::failed(
            TxErrorKind::UnsupportedChainOperation,
            "Bitcoin payments are not supported; pick another chain to pay on",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockUnisatProvider;

    #[async_trait]
    impl InjectedProvider for MockUnisatProvider {
        async fn request(&self, method: &str, _params: Value) -> Result<Value, ProviderError> {
            match method {
                "requestAccounts" => Ok(json!(["bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4"])),
                "getBalance" => Ok(json!({ "confirmed": 150_000_000u64, "unconfirmed": 0 })),
                other => Err(ProviderError::UnsupportedMethod(other.to_string())),
            }
        }
    }

    #[tokio::test]
    async fn test_connect_and_balance() {
        let providers = ProviderRegistry::new();
        providers.register(GLOBAL_NAME, Arc::new(MockUnisatProvider));
        let adapter = UnisatAdapter::new(providers);

        let outcome = adapter.connect(None).await;
        assert!(outcome.success);
        assert_eq!(outcome.balance, Some(1.5));
        assert_eq!(outcome.detected_chain, Some(Chain::Bitcoin));
    }

    #[tokio::test]
    async fn test_payment_always_refused() {
        let adapter = UnisatAdapter::new(ProviderRegistry::new());
        let result = adapter
            .send_payment(PaymentPayload::EvmTransaction {
                from: String::new(),
                to: String::new(),
                value_hex: "0x0".to_string(),
                data_hex: None,
                chain_id: 1,
            })
            .await;
        assert!(!result.success);
        assert_eq!(result.error_kind, Some(TxErrorKind::UnsupportedChainOperation));
    }
}
