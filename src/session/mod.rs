use crate::types::Chain;
use crate::wallets::{AdapterRegistry, WalletAdapter};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SessionStatus {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// The single source of truth for the wallet connection. Mutated only by
/// `SessionManager` transition methods; everything else reads snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletSession {
    pub chain: Chain,
    pub adapter_name: Option<String>,
    pub address: Option<String>,
    pub native_balance: Option<f64>,
    pub status: SessionStatus,
    pub last_error: Option<String>,
    pub last_connected_at: Option<DateTime<Utc>>,
}

impl WalletSession {
    fn initial(chain: Chain) -> Self {
        Self {
            chain,
            adapter_name: None,
            address: None,
            native_balance: None,
            status: SessionStatus::Disconnected,
            last_error: None,
            last_connected_at: None,
        }
    }
}

/// Remembered `{adapter, chain, address}` triple for reconnect-on-reload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PersistedSession {
    pub adapter_name: String,
    pub chain: Chain,
    pub address: String,
}

/// Persistence seam for the session marker (local storage in the browser,
/// in-memory here and in tests).
pub trait SessionStore: Send + Sync {
    fn save(&self, marker: &PersistedSession);
    fn load(&self) -> Option<PersistedSession>;
    fn clear(&self);
}

#[derive(Default)]
pub struct MemorySessionStore {
    inner: std::sync::Mutex<Option<PersistedSession>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn save(&self, marker: &PersistedSession) {
        *self.inner.lock().unwrap() = Some(marker.clone());
    }

    fn load(&self) -> Option<PersistedSession> {
        self.inner.lock().unwrap().clone()
    }

    fn clear(&self) {
        *self.inner.lock().unwrap() = None;
    }
}

/// Which chain switches may silently reuse the current adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectPolicy {
    /// Reconnect when the same adapter serves both chains within one
    /// family (EVM to EVM); single-chain wallets never qualify.
    CompatibleFamily,
    /// Reconnect whenever the exact same adapter supports the new chain.
    ExactAdapterOnly,
    Never,
}

/// Owns the wallet connection state machine. Transitions are serialized:
/// a connect in flight completes before any other transition runs, and a
/// second connect issued meanwhile is rejected without touching the wallet.
pub struct SessionManager {
    registry: Arc<AdapterRegistry>,
    store: Arc<dyn SessionStore>,
    session: RwLock<WalletSession>,
    transition: Mutex<()>,
    reconnect_policy: ReconnectPolicy,
}

impl SessionManager {
    pub fn new(registry: Arc<AdapterRegistry>, store: Arc<dyn SessionStore>) -> Self {
        Self::with_policy(registry, store, ReconnectPolicy::CompatibleFamily)
    }

    pub fn with_policy(
        registry: Arc<AdapterRegistry>,
        store: Arc<dyn SessionStore>,
        reconnect_policy: ReconnectPolicy,
    ) -> Self {
        Self {
            registry,
            store,
            session: RwLock::new(WalletSession::initial(Chain::Ethereum)),
            transition: Mutex::new(()),
            reconnect_policy,
        }
    }

    pub async fn snapshot(&self) -> WalletSession {
        self.session.read().await.clone()
    }

    /// Connect through a named adapter. A call arriving while another
    /// transition is in flight returns the current snapshot untouched.
    #[instrument(skip(self))]
    pub async fn connect(&self, adapter_name: &str, chain: Chain) -> WalletSession {
        let Ok(_guard) = self.transition.try_lock() else {
            debug!("connect ignored: another transition is in flight");
            return self.snapshot().await;
        };
        let Some(adapter) = self.registry.adapter_by_name(adapter_name) else {
            let mut session = self.session.write().await;
            *session = WalletSession::initial(chain);
            session.status = SessionStatus::Error;
            session.last_error = Some(format!("Unknown wallet: {adapter_name}"));
            return session.clone();
        };
        self.do_connect(adapter, chain).await
    }

    /// Shared connect path; the caller holds the transition guard.
    async fn do_connect(&self, adapter: Arc<dyn WalletAdapter>, chain: Chain) -> WalletSession {
        if !adapter.is_installed() {
            let mut session = self.session.write().await;
            *session = WalletSession::initial(chain);
            session.status = SessionStatus::Error;
            session.last_error = Some(format!(
                "{} is not installed. Get it at {}",
                adapter.display_name(),
                adapter.install_url()
            ));
            return session.clone();
        }

        {
            let mut session = self.session.write().await;
            *session = WalletSession::initial(chain);
            session.status = SessionStatus::Connecting;
            session.adapter_name = Some(adapter.name().to_string());
        }

        let outcome = adapter.connect(Some(chain)).await;
        let mut session = self.session.write().await;
        if outcome.success {
            // The adapter's detected chain wins over the requested one.
            let chain = outcome.detected_chain.unwrap_or(chain);
            session.chain = chain;
            session.status = SessionStatus::Connected;
            session.address = outcome.address.clone();
            session.native_balance = outcome.balance;
            session.last_error = None;
            session.last_connected_at = Some(Utc::now());
            if let Some(address) = &outcome.address {
                self.store.save(&PersistedSession {
                    adapter_name: adapter.name().to_string(),
                    chain,
                    address: address.clone(),
                });
            }
            info!("Session connected on {} via {}", chain.as_str(), adapter.name());
        } else {
            *session = WalletSession::initial(chain);
            session.status = SessionStatus::Error;
            session.last_error = outcome.error;
            warn!("Connect failed on {}: {:?}", chain.as_str(), session.last_error);
        }
        session.clone()
    }

    /// Switch the target chain. Disconnected sessions just record the new
    /// chain; connected sessions disconnect first and reconnect only when
    /// the policy admits the current adapter on the new chain.
    #[instrument(skip(self))]
    pub async fn switch_chain(&self, new_chain: Chain) -> WalletSession {
        let _guard = self.transition.lock().await;
        let current = self.session.read().await.clone();

        if current.status != SessionStatus::Connected {
            let mut session = self.session.write().await;
            session.chain = new_chain;
            session.status = SessionStatus::Disconnected;
            return session.clone();
        }
        if current.chain == new_chain {
            return current;
        }

        let adapter = current
            .adapter_name
            .as_deref()
            .and_then(|name| self.registry.adapter_by_name(name));
        if let Some(adapter) = &adapter {
            adapter.disconnect().await;
        }
        self.store.clear();
        {
            let mut session = self.session.write().await;
            *session = WalletSession::initial(new_chain);
        }

        let reconnectable = adapter.filter(|a| {
            a.is_installed()
                && a.supported_chains().contains(&new_chain)
                && match self.reconnect_policy {
                    ReconnectPolicy::Never => false,
                    ReconnectPolicy::ExactAdapterOnly => true,
                    ReconnectPolicy::CompatibleFamily => {
                        current.chain.is_evm() && new_chain.is_evm()
                    }
                }
        });
        match reconnectable {
            Some(adapter) => {
                info!(
                    "Chain switch {} -> {}: reconnecting via {}",
                    current.chain.as_str(),
                    new_chain.as_str(),
                    adapter.name()
                );
                self.do_connect(adapter, new_chain).await
            }
            None => {
                debug!(
                    "Chain switch {} -> {}: awaiting explicit wallet choice",
                    current.chain.as_str(),
                    new_chain.as_str()
                );
                self.snapshot().await
            }
        }
    }

    /// Best-effort disconnect; always lands in the initial state.
    #[instrument(skip(self))]
    pub async fn disconnect(&self) -> WalletSession {
        let _guard = self.transition.lock().await;
        let current = self.session.read().await.clone();
        if let Some(adapter) = current
            .adapter_name
            .as_deref()
            .and_then(|name| self.registry.adapter_by_name(name))
        {
            adapter.disconnect().await;
        }
        self.store.clear();
        let mut session = self.session.write().await;
        *session = WalletSession::initial(current.chain);
        session.clone()
    }

    /// Refresh only the balance field. No state transition; a no-op unless
    /// the session is connected.
    pub async fn refresh_balance(&self) -> WalletSession {
        let current = self.session.read().await.clone();
        let (Some(adapter_name), Some(address)) = (&current.adapter_name, &current.address) else {
            return current;
        };
        if current.status != SessionStatus::Connected {
            return current;
        }
        let Some(adapter) = self.registry.adapter_by_name(adapter_name) else {
            return current;
        };
        let outcome = adapter.get_balance(address).await;
        let mut session = self.session.write().await;
        // A disconnect or switch may have landed while the balance call was
        // in flight; a stale result must not touch the reset session.
        let still_current = session.status == SessionStatus::Connected
            && session.address.as_deref() == Some(address.as_str());
        if outcome.success && still_current {
            session.native_balance = outcome.balance;
        } else if !outcome.success {
            debug!("Balance refresh failed: {:?}", outcome.error);
        }
        session.clone()
    }

    /// Reconnect-on-reload. Attempted only when the remembered adapter is
    /// still installed; any failure silently clears the marker.
    #[instrument(skip(self))]
    pub async fn restore(&self) -> WalletSession {
        let _guard = self.transition.lock().await;
        let Some(marker) = self.store.load() else {
            return self.snapshot().await;
        };
        let Some(adapter) = self
            .registry
            .adapter_by_name(&marker.adapter_name)
            .filter(|a| a.is_installed())
        else {
            debug!("Stored session for {} no longer restorable", marker.adapter_name);
            self.store.clear();
            return self.snapshot().await;
        };
        let session = self.do_connect(adapter, marker.chain).await;
        if session.status != SessionStatus::Connected {
            self.store.clear();
            let mut session = self.session.write().await;
            *session = WalletSession::initial(marker.chain);
            return session.clone();
        }
        session
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TransactionResult;
    use crate::wallets::{BalanceOutcome, ConnectOutcome, PaymentPayload};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    struct ScriptedAdapter {
        name: &'static str,
        chains: Vec<Chain>,
        installed: AtomicBool,
        connect_calls: AtomicUsize,
        connect_delay: Duration,
        balance_delay: Duration,
        fail_connect: AtomicBool,
    }

    impl ScriptedAdapter {
        fn evm(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                chains: vec![Chain::Ethereum, Chain::Bnb, Chain::Polygon],
                installed: AtomicBool::new(true),
                connect_calls: AtomicUsize::new(0),
                connect_delay: Duration::from_millis(30),
                balance_delay: Duration::ZERO,
                fail_connect: AtomicBool::new(false),
            })
        }

        fn connect_count(&self) -> usize {
            self.connect_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl WalletAdapter for ScriptedAdapter {
        fn name(&self) -> &'static str {
            self.name
        }
        fn display_name(&self) -> &'static str {
            self.name
        }
        fn install_url(&self) -> &'static str {
            "https://example.invalid"
        }
        fn supported_chains(&self) -> Vec<Chain> {
            self.chains.clone()
        }
        fn is_installed(&self) -> bool {
            self.installed.load(Ordering::SeqCst)
        }
        async fn connect(&self, chain_hint: Option<Chain>) -> ConnectOutcome {
            self.connect_calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.connect_delay).await;
            if self.fail_connect.load(Ordering::SeqCst) {
                return ConnectOutcome::failed("scripted failure");
            }
            ConnectOutcome::connected(
                "0x55d398326f99059fF775485246999027B3197955".to_string(),
                Some(1.25),
                chain_hint.unwrap_or(Chain::Ethereum),
            )
        }
        async fn disconnect(&self) {}
        async fn get_balance(&self, _address: &str) -> BalanceOutcome {
            tokio::time::sleep(self.balance_delay).await;
            BalanceOutcome::ok(9.5)
        }
        async fn send_payment(&self, _payload: PaymentPayload) -> TransactionResult {
            TransactionResult::confirmed("0xtest")
        }
    }

    fn manager_with(adapter: Arc<ScriptedAdapter>) -> Arc<SessionManager> {
        let registry = Arc::new(AdapterRegistry::from_adapters(vec![adapter as _]));
        Arc::new(SessionManager::new(registry, Arc::new(MemorySessionStore::new())))
    }

    #[tokio::test]
    async fn test_connect_success_commits_atomically() {
        let adapter = ScriptedAdapter::evm("metamask");
        let manager = manager_with(adapter.clone());

        let session = manager.connect("metamask", Chain::Bnb).await;
        assert_eq!(session.status, SessionStatus::Connected);
        assert_eq!(session.chain, Chain::Bnb);
        assert_eq!(session.native_balance, Some(1.25));
        assert!(session.last_connected_at.is_some());
    }

    #[tokio::test]
    async fn test_overlapping_connect_is_rejected() {
        let adapter = ScriptedAdapter::evm("metamask");
        let manager = manager_with(adapter.clone());

        let (a, b) = tokio::join!(
            manager.connect("metamask", Chain::Ethereum),
            manager.connect("metamask", Chain::Ethereum),
        );
        // Exactly one wallet prompt regardless of click spam.
        assert_eq!(adapter.connect_count(), 1);
        assert!(
            a.status == SessionStatus::Connected || b.status == SessionStatus::Connected
        );
    }

    #[tokio::test]
    async fn test_connect_failure_clears_session_but_keeps_error() {
        let adapter = ScriptedAdapter::evm("metamask");
        adapter.fail_connect.store(true, Ordering::SeqCst);
        let manager = manager_with(adapter);

        let session = manager.connect("metamask", Chain::Ethereum).await;
        assert_eq!(session.status, SessionStatus::Error);
        assert_eq!(session.last_error.as_deref(), Some("scripted failure"));
        assert!(session.address.is_none());
        assert!(session.native_balance.is_none());
    }

    #[tokio::test]
    async fn test_not_installed_offers_install_link() {
        let adapter = ScriptedAdapter::evm("metamask");
        adapter.installed.store(false, Ordering::SeqCst);
        let manager = manager_with(adapter.clone());

        let session = manager.connect("metamask", Chain::Ethereum).await;
        assert_eq!(session.status, SessionStatus::Error);
        assert!(session.last_error.unwrap().contains("https://example.invalid"));
        assert_eq!(adapter.connect_count(), 0);
    }

    #[tokio::test]
    async fn test_switch_while_disconnected_records_chain_only() {
        let adapter = ScriptedAdapter::evm("metamask");
        let manager = manager_with(adapter.clone());

        let session = manager.switch_chain(Chain::Solana).await;
        assert_eq!(session.status, SessionStatus::Disconnected);
        assert_eq!(session.chain, Chain::Solana);
        assert_eq!(adapter.connect_count(), 0);
    }

    #[tokio::test]
    async fn test_evm_to_evm_switch_reconnects() {
        let adapter = ScriptedAdapter::evm("metamask");
        let manager = manager_with(adapter.clone());

        manager.connect("metamask", Chain::Ethereum).await;
        let session = manager.switch_chain(Chain::Bnb).await;
        assert_eq!(session.status, SessionStatus::Connected);
        assert_eq!(session.chain, Chain::Bnb);
        assert_eq!(adapter.connect_count(), 2);
    }

    #[tokio::test]
    async fn test_switch_without_compatible_adapter_stays_disconnected() {
        let adapter = ScriptedAdapter::evm("metamask");
        let manager = manager_with(adapter.clone());

        manager.connect("metamask", Chain::Ethereum).await;
        let session = manager.switch_chain(Chain::Tron).await;
        assert_eq!(session.status, SessionStatus::Disconnected);
        assert_eq!(session.chain, Chain::Tron);
        assert!(session.adapter_name.is_none());
        // Only the original connect; no reconnect attempt was made.
        assert_eq!(adapter.connect_count(), 1);
    }

    #[tokio::test]
    async fn test_never_policy_blocks_reconnect() {
        let adapter = ScriptedAdapter::evm("metamask");
        let registry = Arc::new(AdapterRegistry::from_adapters(vec![adapter.clone() as _]));
        let manager = SessionManager::with_policy(
            registry,
            Arc::new(MemorySessionStore::new()),
            ReconnectPolicy::Never,
        );

        manager.connect("metamask", Chain::Ethereum).await;
        let session = manager.switch_chain(Chain::Bnb).await;
        assert_eq!(session.status, SessionStatus::Disconnected);
        assert_eq!(adapter.connect_count(), 1);
    }

    #[tokio::test]
    async fn test_disconnect_resets_and_clears_marker() {
        let adapter = ScriptedAdapter::evm("metamask");
        let store = Arc::new(MemorySessionStore::new());
        let registry = Arc::new(AdapterRegistry::from_adapters(vec![adapter as _]));
        let manager = SessionManager::new(registry, store.clone());

        manager.connect("metamask", Chain::Ethereum).await;
        assert!(store.load().is_some());

        let session = manager.disconnect().await;
        assert_eq!(session.status, SessionStatus::Disconnected);
        assert!(session.address.is_none());
        assert!(store.load().is_none());
    }

    #[tokio::test]
    async fn test_refresh_balance_is_noop_when_disconnected() {
        let adapter = ScriptedAdapter::evm("metamask");
        let manager = manager_with(adapter);
        let session = manager.refresh_balance().await;
        assert_eq!(session.status, SessionStatus::Disconnected);
        assert!(session.native_balance.is_none());
    }

    #[tokio::test]
    async fn test_refresh_balance_updates_only_balance() {
        let adapter = ScriptedAdapter::evm("metamask");
        let manager = manager_with(adapter);
        manager.connect("metamask", Chain::Ethereum).await;
        let session = manager.refresh_balance().await;
        assert_eq!(session.status, SessionStatus::Connected);
        assert_eq!(session.native_balance, Some(9.5));
    }

    #[tokio::test]
    async fn test_refresh_racing_disconnect_keeps_session_reset() {
        let adapter = Arc::new(ScriptedAdapter {
            name: "metamask",
            chains: vec![Chain::Ethereum, Chain::Bnb, Chain::Polygon],
            installed: AtomicBool::new(true),
            connect_calls: AtomicUsize::new(0),
            connect_delay: Duration::ZERO,
            balance_delay: Duration::from_millis(100),
            fail_connect: AtomicBool::new(false),
        });
        let manager = manager_with(adapter);
        manager.connect("metamask", Chain::Ethereum).await;

        // Disconnect lands while the balance call is still in flight; the
        // late result must not repopulate the reset session.
        let refresh = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.refresh_balance().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        manager.disconnect().await;
        refresh.await.unwrap();

        let session = manager.snapshot().await;
        assert_eq!(session.status, SessionStatus::Disconnected);
        assert!(session.native_balance.is_none());
        assert!(session.address.is_none());
    }

    #[tokio::test]
    async fn test_restore_reconnects_from_marker() {
        let adapter = ScriptedAdapter::evm("metamask");
        let store = Arc::new(MemorySessionStore::new());
        store.save(&PersistedSession {
            adapter_name: "metamask".to_string(),
            chain: Chain::Bnb,
            address: "0x55d398326f99059fF775485246999027B3197955".to_string(),
        });
        let registry = Arc::new(AdapterRegistry::from_adapters(vec![adapter as _]));
        let manager = SessionManager::new(registry, store);

        let session = manager.restore().await;
        assert_eq!(session.status, SessionStatus::Connected);
        assert_eq!(session.chain, Chain::Bnb);
    }

    #[tokio::test]
    async fn test_restore_silently_clears_stale_marker() {
        let adapter = ScriptedAdapter::evm("metamask");
        adapter.installed.store(false, Ordering::SeqCst);
        let store = Arc::new(MemorySessionStore::new());
        store.save(&PersistedSession {
            adapter_name: "metamask".to_string(),
            chain: Chain::Ethereum,
            address: "0x55d398326f99059fF775485246999027B3197955".to_string(),
        });
        let registry = Arc::new(AdapterRegistry::from_adapters(vec![adapter as _]));
        let manager = SessionManager::new(registry, store.clone());

        let session = manager.restore().await;
        assert_eq!(session.status, SessionStatus::Disconnected);
        assert!(store.load().is_none());
    }
}
