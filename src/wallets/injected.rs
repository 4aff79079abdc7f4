use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// EIP-1193 user-rejection code; TronLink and Phantom reuse it.
pub const RPC_USER_REJECTED: i64 = 4001;
/// EVM "chain has not been added to the wallet" code.
pub const RPC_CHAIN_NOT_ADDED: i64 = 4902;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Request rejected in wallet")]
    UserRejected,
    #[error("Provider RPC error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("Provider method not supported: {0}")]
    UnsupportedMethod(String),
    #[error("Provider not ready")]
    NotReady,
    #[error("Provider transport error: {0}")]
    Transport(String),
}

impl ProviderError {
    pub fn rpc(code: i64, message: impl Into<String>) -> Self {
        if code == RPC_USER_REJECTED {
            ProviderError::UserRejected
        } else {
            ProviderError::Rpc {
                code,
                message: message.into(),
            }
        }
    }

    pub fn code(&self) -> Option<i64> {
        match self {
            ProviderError::UserRejected => Some(RPC_USER_REJECTED),
            ProviderError::Rpc { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Handle to one wallet product's injected global object. This is the wire
/// boundary: everything the core knows about a wallet goes through
/// `request`, mirroring the JSON-RPC surface the browser object exposes.
#[async_trait]
pub trait InjectedProvider: Send + Sync {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError>;

    /// Some wallets populate account data asynchronously after the
    /// permission grant; adapters poll this instead of assuming readiness.
    fn ready(&self) -> bool {
        true
    }
}

/// Registry of detected injected globals, keyed by the well-known global
/// name each wallet product uses. Injectable so tests can register mocks.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    inner: Arc<DashMap<String, Arc<dyn InjectedProvider>>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, global_name: impl Into<String>, provider: Arc<dyn InjectedProvider>) {
        self.inner.insert(global_name.into(), provider);
    }

    pub fn unregister(&self, global_name: &str) {
        self.inner.remove(global_name);
    }

    pub fn get(&self, global_name: &str) -> Option<Arc<dyn InjectedProvider>> {
        self.inner.get(global_name).map(|e| e.value().clone())
    }

    /// Pure presence probe; the `is_installed` capability check.
    pub fn is_present(&self, global_name: &str) -> bool {
        self.inner.contains_key(global_name)
    }
}
