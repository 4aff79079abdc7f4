use super::injected::{InjectedProvider, ProviderError, ProviderRegistry};
use super::{BalanceOutcome, ConnectOutcome, PaymentPayload, WalletAdapter};
use crate::types::{Chain, TransactionResult, TxErrorKind};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

/// Shared plumbing for Solana wallet products (Phantom, Solflare). Both
/// expose the same connect/signAndSendTransaction surface.
struct SolanaWalletCore {
    providers: ProviderRegistry,
    global_name: &'static str,
    wallet_name: &'static str,
}

impl SolanaWalletCore {
    fn provider(&self) -> Option<Arc<dyn InjectedProvider>> {
        self.providers.get(self.global_name)
    }

    async fn connect(&self, chain_hint: Option<Chain>) -> ConnectOutcome {
        if let Some(hint) = chain_hint.filter(|c| *c != Chain::Solana) {
            debug!("{} ignoring chain hint {}", self.wallet_name, hint.as_str());
        }
        let Some(provider) = self.provider() else {
            return ConnectOutcome::failed_with(
                TxErrorKind::WalletNotInstalled,
                format!("{} is not installed", self.wallet_name),
            );
        };
        let response = match provider.request("connect", json!({})).await {
            Ok(response) => response,
            Err(ProviderError::UserRejected) => {
                return ConnectOutcome::failed_with(
                    TxErrorKind::UserRejected,
                    format!("Connection request was rejected in {}", self.wallet_name),
                )
            }
            Err(err) => {
                return ConnectOutcome::failed(format!("{} error: {}", self.wallet_name, err))
            }
        };
        let Some(address) = response
            .get("publicKey")
            .and_then(Value::as_str)
            .map(str::to_string)
        else {
            return ConnectOutcome::failed(format!("{} returned no public key", self.wallet_name));
        };
        let balance = match provider.request("getBalance", json!([address])).await {
            Ok(v) => v.as_u64().map(|lamports| lamports as f64 / 1e9),
            Err(_) => None,
        };
        info!("{} connected as {}", self.wallet_name, address);
        ConnectOutcome::connected(address, balance, Chain::Solana)
    }

    async fn get_balance(&self, address: &str) -> BalanceOutcome {
        let Some(provider) = self.provider() else {
            return BalanceOutcome::failed(format!("{} is not installed", self.wallet_name));
        };
        match provider.request("getBalance", json!([address])).await {
            Ok(response) => match response.as_u64() {
                Some(lamports) => BalanceOutcome::ok(lamports as f64 / 1e9),
                None => BalanceOutcome::failed("Malformed balance response"),
            },
            Err(err) => BalanceOutcome::failed(format!("{} error: {}", self.wallet_name, err)),
        }
    }

    async fn send_payment(&self, payload: PaymentPayload) -> TransactionResult {
        let PaymentPayload::SolanaTransfer {
            from,
            to,
            amount,
            token_mint,
        } = payload
        else {
            return TransactionResult::failed(
                TxErrorKind::UnsupportedChainOperation,
                format!("{} only submits Solana transfers", self.wallet_name),
            );
        };
        let Some(provider) = self.provider() else {
            return TransactionResult::failed(
                TxErrorKind::WalletNotInstalled,
                format!("{} is not installed", self.wallet_name),
            );
        };
        // The wallet constructs, signs and broadcasts the transfer message;
        // SPL transfers only differ by carrying the mint.
        let mut message = json!({ "from": from, "to": to, "lamports": amount });
        if let Some(mint) = token_mint {
            message["splToken"] = Value::String(mint);
        }
        match provider
            .request("signAndSendTransaction", json!({ "message": message }))
            .await
        {
            Ok(response) => match response.get("signature").and_then(Value::as_str) {
                Some(signature) => TransactionResult::confirmed(signature),
                None => TransactionResult::failed(
                    TxErrorKind::TransactionFailed,
                    "Wallet returned no signature",
                ),
            },
            Err(ProviderError::UserRejected) => TransactionResult::failed(
                TxErrorKind::UserRejected,
                format!("Transaction was rejected in {}", self.wallet_name),
            ),
            Err(err) => TransactionResult::failed(
                TxErrorKind::TransactionFailed,
                format!("{} error: {}", self.wallet_name, err),
            ),
        }
    }
}

macro_rules! solana_adapter {
    ($adapter:ident, $name:literal, $display:literal, $global:literal, $install:literal) => {
        pub struct $adapter {
            core: SolanaWalletCore,
        }

        impl $adapter {
            pub fn new(providers: ProviderRegistry) -> Self {
                Self {
                    core: SolanaWalletCore {
                        providers,
                        global_name: $global,
                        wallet_name: $display,
                    },
                }
            }
        }

        #[async_trait]
        impl WalletAdapter for $adapter {
            fn name(&self) -> &'static str {
                $name
            }

            fn display_name(&self) -> &'static str {
                $display
            }

            fn install_url(&self) -> &'static str {
                $install
            }

            fn supported_chains(&self) -> Vec<Chain> {
                vec![Chain::Solana]
            }

            fn is_installed(&self) -> bool {
                self.core.providers.is_present($global)
            }

            async fn connect(&self, chain_hint: Option<Chain>) -> ConnectOutcome {
                self.core.connect(chain_hint).await
            }

            async fn disconnect(&self) {
                if let Some(provider) = self.core.provider() {
                    // Best effort; Phantom exposes an explicit disconnect.
                    let _ = provider.request("disconnect", json!({})).await;
                }
            }

            async fn get_balance(&self, address: &str) -> BalanceOutcome {
                self.core.get_balance(address).await
            }

            async fn send_payment(&self, payload: PaymentPayload) -> TransactionResult {
                self.core.send_payment(payload).await
            }
        }
    };
}

solana_adapter!(
    PhantomAdapter,
    "phantom",
    "Phantom",
    "phantom",
    "https://phantom.app/download"
);
solana_adapter!(
    SolflareAdapter,
    "solflare",
    "Solflare",
    "solflare",
    "https://solflare.com/download"
);
