use super::injected::{InjectedProvider, ProviderError, ProviderRegistry};
use super::{BalanceOutcome, ConnectOutcome, PaymentPayload, WalletAdapter};
use crate::types::{Chain, TransactionResult, TxErrorKind};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

const GLOBAL_NAME: &str = "tronlink";
const READY_POLL_INTERVAL: Duration = Duration::from_millis(500);
const READY_POLL_BUDGET: Duration = Duration::from_secs(15);

/// TronLink populates its account object asynchronously after the user
/// approves the connection, so `connect` polls readiness instead of trusting
/// the approval response.
pub struct TronLinkAdapter {
    providers: ProviderRegistry,
    poll_interval: Duration,
    poll_budget: Duration,
}

impl TronLinkAdapter {
    pub fn new(providers: ProviderRegistry) -> Self {
        Self {
            providers,
            poll_interval: READY_POLL_INTERVAL,
            poll_budget: READY_POLL_BUDGET,
        }
    }

    /// Test hook: shrink the readiness polling window.
    pub fn with_polling(providers: ProviderRegistry, interval: Duration, budget: Duration) -> Self {
        Self {
            providers,
            poll_interval: interval,
            poll_budget: budget,
        }
    }

    fn provider(&self) -> Option<Arc<dyn InjectedProvider>> {
        self.providers.get(GLOBAL_NAME)
    }

    /// Bounded cooperative wait for the injected object to expose the
    /// default address. Both outcomes (ready, timed out) reach the caller.
    async fn await_account(&self, provider: &Arc<dyn InjectedProvider>) -> Option<String> {
        let deadline = Instant::now() + self.poll_budget;
        loop {
            if provider.ready() {
                if let Ok(response) = provider.request("tron_defaultAddress", json!([])).await {
                    if let Some(address) = response.as_str() {
                        return Some(address.to_string());
                    }
                }
            }
            if Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn sign_and_broadcast(
        &self,
        provider: &Arc<dyn InjectedProvider>,
        transaction: Value,
    ) -> TransactionResult {
        let signed = match provider.request("tron_signTransaction", transaction).await {
            Ok(signed) => signed,
            Err(ProviderError::UserRejected) => {
                return TransactionResult::failed(
                    TxErrorKind::UserRejected,
                    "Transaction was rejected in TronLink",
                )
            }
            Err(err) => {
                return TransactionResult::failed(
                    TxErrorKind::TransactionFailed,
                    format!("TronLink signing failed: {err}"),
                )
            }
        };
        match provider.request("tron_broadcastTransaction", signed).await {
            Ok(receipt) => match receipt.get("txid").and_then(Value::as_str) {
                Some(txid) => TransactionResult::confirmed(txid),
                None => TransactionResult::failed(
                    TxErrorKind::TransactionFailed,
                    "Broadcast returned no transaction id",
                ),
            },
            Err(err) => {
                warn!("TronLink broadcast failed: {}", err);
                TransactionResult::failed(
                    TxErrorKind::TransactionFailed,
                    format!("TronLink broadcast failed: {err}"),
                )
            }
        }
    }
}

#[async_trait]
impl WalletAdapter for TronLinkAdapter {
    fn name(&self) -> &'static str {
        "tronlink"
    }

    fn display_name(&self) -> &'static str {
        "TronLink"
    }

    fn install_url(&self) -> &'static str {
        "https://www.tronlink.org/"
    }

    fn supported_chains(&self) -> Vec<Chain> {
        vec![Chain::Tron]
    }

    fn is_installed(&self) -> bool {
        self.providers.is_present(GLOBAL_NAME)
    }

    /// Tron-only wallet: a mismatched chain hint is ignored and the outcome
    /// always reports `Chain::Tron`.
    async fn connect(&self, chain_hint: Option<Chain>) -> ConnectOutcome {
        if let Some(hint) = chain_hint.filter(|c| *c != Chain::Tron) {
            debug!("TronLink ignoring chain hint {}", hint.as_str());
        }
        let Some(provider) = self.provider() else {
            return ConnectOutcome::failed_with(
                TxErrorKind::WalletNotInstalled,
                "TronLink is not installed",
            );
        };
        if let Err(err) = provider.request("tron_requestAccounts", json!([])).await {
            return match err {
                ProviderError::UserRejected => ConnectOutcome::failed_with(
                    TxErrorKind::UserRejected,
                    "Connection request was rejected in TronLink",
                ),
                other => ConnectOutcome::failed(format!("TronLink error: {other}")),
            };
        }
        let Some(address) = self.await_account(&provider).await else {
            return ConnectOutcome::failed_with(
                TxErrorKind::ConnectionTimeout,
                "Timed out waiting for TronLink to expose the connected account",
            );
        };
        let balance = match provider.request("trx_getBalance", json!([address])).await {
            Ok(v) => v.as_u64().map(|sun| sun as f64 / 1e6),
            Err(_) => None,
        };
        info!("TronLink connected as {}", address);
        ConnectOutcome::connected(address, balance, Chain::Tron)
    }

    async fn disconnect(&self) {
        debug!("TronLink disconnect requested");
    }

    async fn get_balance(&self, address: &str) -> BalanceOutcome {
        let Some(provider) = self.provider() else {
            return BalanceOutcome::failed("TronLink is not installed");
        };
        match provider.request("trx_getBalance", json!([address])).await {
            Ok(response) => match response.as_u64() {
                Some(sun) => BalanceOutcome::ok(sun as f64 / 1e6),
                None => BalanceOutcome::failed("Malformed balance response"),
            },
            Err(err) => BalanceOutcome::failed(format!("TronLink error: {err}")),
        }
    }

    async fn send_payment(&self, payload: PaymentPayload) -> TransactionResult {
        let Some(provider) = self.provider() else {
            return TransactionResult::failed(
                TxErrorKind::WalletNotInstalled,
                "TronLink is not installed",
            );
        };
        match payload {
            PaymentPayload::TronNativeTransfer { from, to, amount_sun } => {
                let built = match provider
                    .request(
                        "tron_buildTransaction",
                        json!({ "from": from, "to": to, "amount": amount_sun }),
                    )
                    .await
                {
                    Ok(tx) => tx,
                    Err(err) => {
                        return TransactionResult::failed(
                            TxErrorKind::TransactionFailed,
                            format!("TronLink could not build the transfer: {err}"),
                        )
                    }
                };
                self.sign_and_broadcast(&provider, built).await
            }
            PaymentPayload::TronTokenTransfer {
                from,
                contract,
                to,
                amount,
            } => {
                let built = match provider
                    .request(
                        "tron_triggerSmartContract",
                        json!({
                            "from": from,
                            "contract": contract,
                            "function": "transfer(address,uint256)",
                            "parameters": [
                                { "type": "address", "value": to },
                                { "type": "uint256", "value": amount },
                            ],
                        }),
                    )
                    .await
                {
                    Ok(response) => match response.get("transaction") {
                        Some(tx) => tx.clone(),
                        None => {
                            return TransactionResult::failed(
                                TxErrorKind::TransactionFailed,
                                "Contract call returned no transaction",
                            )
                        }
                    },
                    Err(err) => {
                        return TransactionResult::failed(
                            TxErrorKind::TransactionFailed,
                            format!("TronLink contract call failed: {err}"),
                        )
                    }
                };
                self.sign_and_broadcast(&provider, built).await
            }
            _ => TransactionResult::failed(
                TxErrorKind::UnsupportedChainOperation,
                "TronLink only submits Tron transfers",
            ),
        }
    }
}
