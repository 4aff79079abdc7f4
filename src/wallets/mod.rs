pub mod bitcoin;
pub mod evm;
pub mod injected;
pub mod solana;
pub mod ton;
pub mod tron;

pub use bitcoin::UnisatAdapter;
pub use evm::{MetaMaskAdapter, TrustWalletAdapter};
pub use injected::{InjectedProvider, ProviderError, ProviderRegistry};
pub use solana::{PhantomAdapter, SolflareAdapter};
pub use ton::TonkeeperAdapter;
pub use tron::TronLinkAdapter;

use crate::chains::chain_config;
use crate::types::{Chain, TransactionResult, TxErrorKind};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Chain-specific payment instruction, built by the execution engine and
/// submitted through the connected adapter's injected signer.
#[derive(Debug, Clone)]
pub enum PaymentPayload {
    /// Value transfer or contract call; `data_hex` carries ERC-20 calldata.
    EvmTransaction {
        from: String,
        to: String,
        value_hex: String,
        data_hex: Option<String>,
        chain_id: u64,
    },
    TronNativeTransfer {
        from: String,
        to: String,
        amount_sun: u64,
    },
    TronTokenTransfer {
        from: String,
        contract: String,
        to: String,
        amount: u64,
    },
    SolanaTransfer {
        from: String,
        to: String,
        amount: u64,
        token_mint: Option<String>,
    },
    TonTransfer {
        from: String,
        to: String,
        nanotons: u64,
        jetton_master: Option<String>,
    },
}

/// Result of a connect attempt. Never an `Err`: every failure path lands in
/// `error` so the state machine treats all adapters uniformly.
#[derive(Debug, Clone, Default)]
pub struct ConnectOutcome {
    pub success: bool,
    pub address: Option<String>,
    pub balance: Option<f64>,
    pub detected_chain: Option<Chain>,
    pub error_kind: Option<TxErrorKind>,
    pub error: Option<String>,
}

impl ConnectOutcome {
    pub fn connected(address: String, balance: Option<f64>, chain: Chain) -> Self {
        Self {
            success: true,
            address: Some(address),
            balance,
            detected_chain: Some(chain),
            error_kind: None,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn failed_with(kind: TxErrorKind, error: impl Into<String>) -> Self {
        Self {
            success: false,
            error_kind: Some(kind),
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BalanceOutcome {
    pub success: bool,
    pub balance: Option<f64>,
    pub error: Option<String>,
}

impl BalanceOutcome {
    pub fn ok(balance: f64) -> Self {
        Self {
            success: true,
            balance: Some(balance),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            balance: None,
            error: Some(error.into()),
        }
    }
}

/// Capability contract every wallet product implements. Adapters own no
/// state beyond a handle into the provider registry.
#[async_trait]
pub trait WalletAdapter: Send + Sync {
    /// Stable registry key (matches `ChainConfig::adapter_names`).
    fn name(&self) -> &'static str;
    fn display_name(&self) -> &'static str;
    fn install_url(&self) -> &'static str;
    fn supported_chains(&self) -> Vec<Chain>;

    /// Synchronous probe of the injected globals; pure, no side effects.
    fn is_installed(&self) -> bool;

    /// `detected_chain` in the outcome overrides the hint: chain-locked
    /// wallets report their native chain regardless of what was asked.
    async fn connect(&self, chain_hint: Option<Chain>) -> ConnectOutcome;

    async fn disconnect(&self);

    async fn get_balance(&self, address: &str) -> BalanceOutcome;

    async fn send_payment(&self, payload: PaymentPayload) -> TransactionResult;
}

/// All known adapters, keyed by name. Chain lookups preserve the order the
/// chain config lists its adapters in.
pub struct AdapterRegistry {
    adapters: HashMap<&'static str, Arc<dyn WalletAdapter>>,
}

impl AdapterRegistry {
    pub fn new(providers: ProviderRegistry) -> Self {
        let all: Vec<Arc<dyn WalletAdapter>> = vec![
            Arc::new(MetaMaskAdapter::new(providers.clone())),
            Arc::new(TrustWalletAdapter::new(providers.clone())),
            Arc::new(TronLinkAdapter::new(providers.clone())),
            Arc::new(PhantomAdapter::new(providers.clone())),
            Arc::new(SolflareAdapter::new(providers.clone())),
            Arc::new(TonkeeperAdapter::new(providers.clone())),
            Arc::new(UnisatAdapter::new(providers)),
        ];
        Self::from_adapters(all)
    }

    /// Build a registry from an explicit adapter set (tests inject mocks
    /// here; production uses `new`).
    pub fn from_adapters(adapters: Vec<Arc<dyn WalletAdapter>>) -> Self {
        Self {
            adapters: adapters.into_iter().map(|a| (a.name(), a)).collect(),
        }
    }

    pub fn adapter_by_name(&self, name: &str) -> Option<Arc<dyn WalletAdapter>> {
        self.adapters.get(name).cloned()
    }

    /// Adapters able to serve `chain`, in the chain config's preference
    /// order. Non-empty for every supported chain.
    pub fn adapters_for_chain(&self, chain: Chain) -> Vec<Arc<dyn WalletAdapter>> {
        chain_config(chain)
            .adapter_names
            .iter()
            .filter_map(|name| self.adapter_by_name(name))
            .collect()
    }

    /// First installed adapter for the chain; the default suggestion.
    pub fn default_adapter(&self, chain: Chain) -> Option<Arc<dyn WalletAdapter>> {
        self.adapters_for_chain(chain)
            .into_iter()
            .find(|a| a.is_installed())
    }
}
