use super::injected::{InjectedProvider, ProviderError, ProviderRegistry, RPC_CHAIN_NOT_ADDED};
use super::{BalanceOutcome, ConnectOutcome, PaymentPayload, WalletAdapter};
use crate::chains::evm_chain_id;
use crate::types::{Chain, TransactionResult, TxErrorKind};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

const EVM_CHAINS: [Chain; 3] = [Chain::Ethereum, Chain::Bnb, Chain::Polygon];

fn chain_from_id(chain_id: u64) -> Option<Chain> {
    match chain_id {
        1 => Some(Chain::Ethereum),
        56 => Some(Chain::Bnb),
        137 => Some(Chain::Polygon),
        _ => None,
    }
}

fn parse_hex_quantity(value: &Value) -> Option<u128> {
    value
        .as_str()
        .and_then(|s| u128::from_str_radix(s.trim_start_matches("0x"), 16).ok())
}

/// Network definition sent through `wallet_addEthereumChain` when the wallet
/// does not know the target chain yet.
fn network_definition(chain: Chain) -> Value {
    let (name, symbol, default_rpc, explorer, env_key) = match chain {
        Chain::Ethereum => (
            "Ethereum Mainnet",
            "ETH",
            "https://cloudflare-eth.com",
            "https://etherscan.io",
            "ETHEREUM_RPC_URL",
        ),
        Chain::Bnb => (
            "BNB Smart Chain",
            "BNB",
            "https://bsc-dataseed1.binance.org",
            "https://bscscan.com",
            "BSC_RPC_URL",
        ),
        Chain::Polygon => (
            "Polygon Mainnet",
            "POL",
            "https://polygon-rpc.com",
            "https://polygonscan.com",
            "POLYGON_RPC_URL",
        ),
        _ => ("", "", "", "", ""),
    };
    let rpc_url = std::env::var(env_key).unwrap_or_else(|_| default_rpc.to_string());
    json!({
        "chainId": format!("0x{:x}", evm_chain_id(chain).unwrap_or_default()),
        "chainName": name,
        "nativeCurrency": { "name": symbol, "symbol": symbol, "decimals": 18 },
        "rpcUrls": [rpc_url],
        "blockExplorerUrls": [explorer],
    })
}

/// Shared EIP-1193 plumbing for every EVM wallet product. Adapters only
/// differ in which injected global they probe and their install link.
pub struct EvmWalletCore {
    providers: ProviderRegistry,
    global_name: &'static str,
    wallet_name: &'static str,
}

impl EvmWalletCore {
    pub fn new(
        providers: ProviderRegistry,
        global_name: &'static str,
        wallet_name: &'static str,
    ) -> Self {
        Self {
            providers,
            global_name,
            wallet_name,
        }
    }

    fn provider(&self) -> Option<Arc<dyn InjectedProvider>> {
        self.providers.get(self.global_name)
    }

    pub fn is_installed(&self) -> bool {
        self.providers.is_present(self.global_name)
    }

    fn describe(&self, err: &ProviderError) -> String {
        match err {
            ProviderError::UserRejected => {
                format!("Connection request was rejected in {}", self.wallet_name)
            }
            other => format!("{} error: {}", self.wallet_name, other),
        }
    }

    async fn current_chain(&self, provider: &Arc<dyn InjectedProvider>) -> Option<Chain> {
        let response = provider.request("eth_chainId", json!([])).await.ok()?;
        let id = parse_hex_quantity(&response)?;
        chain_from_id(id as u64)
    }

    /// Ask the wallet to switch networks; on the "chain not added" error,
    /// push the network definition first and retry once.
    pub async fn switch_to_network(&self, chain: Chain) -> Result<(), String> {
        let provider = self
            .provider()
            .ok_or_else(|| format!("{} is not installed", self.wallet_name))?;
        let chain_id = evm_chain_id(chain)
            .ok_or_else(|| format!("{} is not an EVM chain", chain.as_str()))?;
        let params = json!([{ "chainId": format!("0x{chain_id:x}") }]);

        match provider.request("wallet_switchEthereumChain", params.clone()).await {
            Ok(_) => Ok(()),
            Err(err) if err.code() == Some(RPC_CHAIN_NOT_ADDED) => {
                info!("{} missing network {}, adding it", self.wallet_name, chain.as_str());
                provider
                    .request("wallet_addEthereumChain", json!([network_definition(chain)]))
                    .await
                    .map_err(|e| self.describe(&e))?;
                provider
                    .request("wallet_switchEthereumChain", params)
                    .await
                    .map(|_| ())
                    .map_err(|e| self.describe(&e))
            }
            Err(err) => Err(self.describe(&err)),
        }
    }

    async fn fetch_native_balance(
        &self,
        provider: &Arc<dyn InjectedProvider>,
        address: &str,
    ) -> Option<f64> {
        let response = provider
            .request("eth_getBalance", json!([address, "latest"]))
            .await
            .ok()?;
        parse_hex_quantity(&response).map(|wei| wei as f64 / 1e18)
    }

    pub async fn connect(&self, chain_hint: Option<Chain>) -> ConnectOutcome {
        let Some(provider) = self.provider() else {
            return ConnectOutcome::failed_with(
                TxErrorKind::WalletNotInstalled,
                format!("{} is not installed", self.wallet_name),
            );
        };
        let accounts = match provider.request("eth_requestAccounts", json!([])).await {
            Ok(accounts) => accounts,
            Err(ProviderError::UserRejected) => {
                return ConnectOutcome::failed_with(
                    TxErrorKind::UserRejected,
                    self.describe(&ProviderError::UserRejected),
                )
            }
            Err(err) => return ConnectOutcome::failed(self.describe(&err)),
        };
        let Some(address) = accounts
            .as_array()
            .and_then(|a| a.first())
            .and_then(Value::as_str)
            .map(str::to_string)
        else {
            return ConnectOutcome::failed(format!("{} returned no accounts", self.wallet_name));
        };

        let mut chain = self.current_chain(&provider).await;
        if let Some(target) = chain_hint.filter(Chain::is_evm) {
            if chain != Some(target) {
                if let Err(error) = self.switch_to_network(target).await {
                    return ConnectOutcome::failed_with(
                        TxErrorKind::NetworkMismatch,
                        format!(
                            "Could not switch {} to {}: {}",
                            self.wallet_name,
                            target.as_str(),
                            error
                        ),
                    );
                }
                chain = Some(target);
            }
        }
        let detected = chain.unwrap_or(Chain::Ethereum);
        let balance = self.fetch_native_balance(&provider, &address).await;
        info!(
            "{} connected to {} as {}",
            self.wallet_name,
            detected.as_str(),
            address
        );
        ConnectOutcome::connected(address, balance, detected)
    }

    pub async fn get_balance(&self, address: &str) -> BalanceOutcome {
        let Some(provider) = self.provider() else {
            return BalanceOutcome::failed(format!("{} is not installed", self.wallet_name));
        };
        match provider.request("eth_getBalance", json!([address, "latest"])).await {
            Ok(response) => match parse_hex_quantity(&response) {
                Some(wei) => BalanceOutcome::ok(wei as f64 / 1e18),
                None => BalanceOutcome::failed("Malformed balance response".to_string()),
            },
            Err(err) => BalanceOutcome::failed(self.describe(&err)),
        }
    }

    pub async fn send_payment(&self, payload: PaymentPayload) -> TransactionResult {
        let PaymentPayload::EvmTransaction {
            from,
            to,
            value_hex,
            data_hex,
            chain_id,
        } = payload
        else {
            return TransactionResult::failed(
                TxErrorKind::UnsupportedChainOperation,
                format!("{} only submits EVM transactions", self.wallet_name),
            );
        };
        let Some(provider) = self.provider() else {
            return TransactionResult::failed(
                TxErrorKind::WalletNotInstalled,
                format!("{} is not installed", self.wallet_name),
            );
        };
        let mut tx = json!({ "from": from, "to": to, "value": value_hex });
        if let Some(data) = data_hex {
            tx["data"] = Value::String(data);
        }
        debug!("Submitting EVM transaction on chain {}: {}", chain_id, tx);
        match provider.request("eth_sendTransaction", json!([tx])).await {
            Ok(response) => match response.as_str() {
                Some(hash) => TransactionResult::confirmed(hash),
                None => TransactionResult::failed(
                    TxErrorKind::TransactionFailed,
                    "Wallet returned no transaction hash".to_string(),
                ),
            },
            Err(ProviderError::UserRejected) => TransactionResult::failed(
                TxErrorKind::UserRejected,
                format!("Transaction was rejected in {}", self.wallet_name),
            ),
            Err(err) => {
                warn!("{} transaction failed: {}", self.wallet_name, err);
                TransactionResult::failed(TxErrorKind::TransactionFailed, self.describe(&err))
            }
        }
    }
}

macro_rules! evm_adapter {
    ($adapter:ident, $name:literal, $display:literal, $global:literal, $install:literal) => {
        pub struct $adapter {
            core: EvmWalletCore,
        }

        impl $adapter {
            pub fn new(providers: ProviderRegistry) -> Self {
                Self {
                    core: EvmWalletCore::new(providers, $global, $display),
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
                EVM_CHAINS.to_vec()
            }

            fn is_installed(&self) -> bool {
                self.core.is_installed()
            }

            async fn connect(&self, chain_hint: Option<Chain>) -> ConnectOutcome {
                self.core.connect(chain_hint).await
            }

            async fn disconnect(&self) {
                // EIP-1193 wallets expose no programmatic disconnect; the
                // session simply drops its handle.
                debug!("{} disconnect requested", $display);
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

evm_adapter!(
    MetaMaskAdapter,
    "metamask",
    "MetaMask",
    "ethereum",
    "https://metamask.io/download/"
);
evm_adapter!(
    TrustWalletAdapter,
    "trustwallet",
    "Trust Wallet",
    "trustwallet",
    "https://trustwallet.com/download"
);
