use super::injected::{InjectedProvider, ProviderError, ProviderRegistry};
use super::{BalanceOutcome, ConnectOutcome, PaymentPayload, WalletAdapter};
use crate::types::{Chain, TransactionResult, TxErrorKind};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

const GLOBAL_NAME: &str = "tonkeeper";

pub struct TonkeeperAdapter {
    providers: ProviderRegistry,
}

impl TonkeeperAdapter {
    pub fn new(providers: ProviderRegistry) -> Self {
        Self { providers }
    }

    fn provider(&self) -> Option<Arc<dyn InjectedProvider>> {
        self.providers.get(GLOBAL_NAME)
    }
}

#[async_trait]
impl WalletAdapter for TonkeeperAdapter {
    fn name(&self) -> &'static str {
        "tonkeeper"
    }

    fn display_name(&self) -> &'static str {
        "Tonkeeper"
    }

    fn install_url(&self) -> &'static str {
        "https://tonkeeper.com/download"
    }

    fn supported_chains(&self) -> Vec<Chain> {
        vec![Chain::Ton]
    }

    fn is_installed(&self) -> bool {
        self.providers.is_present(GLOBAL_NAME)
    }

    async fn connect(&self, chain_hint: Option<Chain>) -> ConnectOutcome {
        if let Some(hint) = chain_hint.filter(|c| *c != Chain::Ton) {
            debug!("Tonkeeper ignoring chain hint {}", hint.as_str());
        }
        let Some(provider) = self.provider() else {
            return ConnectOutcome::failed_with(
                TxErrorKind::WalletNotInstalled,
                "Tonkeeper is not installed",
            );
        };
        let response = match provider.request("ton_requestAccounts", json!([])).await {
            Ok(response) => response,
            Err(ProviderError::UserRejected) => {
                return ConnectOutcome::failed_with(
                    TxErrorKind::UserRejected,
                    "Connection request was rejected in Tonkeeper",
                )
            }
            Err(err) => return ConnectOutcome::failed(format!("Tonkeeper error: {err}")),
        };
        let Some(address) = response
            .as_array()
            .and_then(|a| a.first())
            .and_then(Value::as_str)
            .map(str::to_string)
        else {
            return ConnectOutcome::failed("Tonkeeper returned no accounts");
        };
        let balance = match provider.request("ton_getBalance", json!([address])).await {
            Ok(v) => v.as_u64().map(|nanotons| nanotons as f64 / 1e9),
            Err(_) => None,
        };
        info!("Tonkeeper connected as {}", address);
        ConnectOutcome::connected(address, balance, Chain::Ton)
    }

    async fn disconnect(&self) {
        debug!("Tonkeeper disconnect requested");
    }

    async fn get_balance(&self, address: &str) -> BalanceOutcome {
        let Some(provider) = self.provider() else {
            return BalanceOutcome::failed("Tonkeeper is not installed");
        };
        match provider.request("ton_getBalance", json!([address])).await {
            Ok(response) => match response.as_u64() {
                Some(nanotons) => BalanceOutcome::ok(nanotons as f64 / 1e9),
                None => BalanceOutcome::failed("Malformed balance response"),
            },
            Err(err) => BalanceOutcome::failed(format!("Tonkeeper error: {err}")),
        }
    }

    async fn send_payment(&self, payload: PaymentPayload) -> TransactionResult {
        let PaymentPayload::TonTransfer {
            from,
            to,
            nanotons,
            jetton_master,
        } = payload
        else {
            return TransactionResult::failed(
                TxErrorKind::UnsupportedChainOperation,
                "Tonkeeper only submits TON transfers",
            );
        };
        let Some(provider) = self.provider() else {
            return TransactionResult::failed(
                TxErrorKind::WalletNotInstalled,
                "Tonkeeper is not installed",
            );
        };
        let mut message = json!({ "from": from, "to": to, "value": nanotons.to_string() });
        if let Some(master) = jetton_master {
            // Jetton payments route through the sender's jetton wallet.
            message["jettonMaster"] = Value::String(master);
        }
        match provider
            .request("ton_sendTransaction", json!({ "messages": [message] }))
            .await
        {
            Ok(response) => match response.get("hash").and_then(Value::as_str) {
                Some(hash) => TransactionResult::confirmed(hash),
                None => TransactionResult::failed(
                    TxErrorKind::TransactionFailed,
                    "Wallet returned no transaction hash",
                ),
            },
            Err(ProviderError::UserRejected) => TransactionResult::failed(
                TxErrorKind::UserRejected,
                "Transaction was rejected in Tonkeeper",
            ),
            Err(err) => TransactionResult::failed(
                TxErrorKind::TransactionFailed,
                format!("Tonkeeper error: {err}"),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockTonProvider;

    #[async_trait]
    impl InjectedProvider for MockTonProvider {
        async fn request(&self, method: &str, _params: Value) -> Result<Value, ProviderError> {
            match method {
                "ton_requestAccounts" => {
                    Ok(json!(["EQCxE6mUtQJKFnGfaROTKOt1lZbDiiX1kCixRv7Nw2Id_sDs"]))
                }
                "ton_getBalance" => Ok(json!(7_000_000_000u64)),
                "ton_sendTransaction" => Ok(json!({ "hash": "tonhash" })),
                other => Err(ProviderError::UnsupportedMethod(other.to_string())),
            }
        }
    }

    #[tokio::test]
    async fn test_connect_and_transfer() {
        let providers = ProviderRegistry::new();
        providers.register(GLOBAL_NAME, Arc::new(MockTonProvider));
        let adapter = TonkeeperAdapter::new(providers);

        let outcome = adapter.connect(None).await;
        assert!(outcome.success);
        assert_eq!(outcome.balance, Some(7.0));
        assert_eq!(outcome.detected_chain, Some(Chain::Ton));

        let result = adapter
            .send_payment(PaymentPayload::TonTransfer {
                from: outcome.address.unwrap(),
                to: "EQCxE6mUtQJKFnGfaROTKOt1lZbDiiX1kCixRv7Nw2Id_sDs".to_string(),
                nanotons: 1_000_000_000,
                jetton_master: None,
            })
            .await;
        assert!(result.success);
        assert_eq!(result.tx_hash.as_deref(), Some("tonhash"));
    }
}
