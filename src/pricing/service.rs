use super::{PriceError, PriceProvider};
use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

/// Last-resort prices used when every provider is down. One entry per
/// supported symbol.
static STATIC_FALLBACK_PRICES: Lazy<HashMap<&'static str, f64>> = Lazy::new(|| {
    HashMap::from([
        ("ETH", 3500.0),
        ("BNB", 600.0),
        ("POL", 0.45),
        ("BTC", 65000.0),
        ("TRX", 0.12),
        ("SOL", 150.0),
        ("TON", 5.5),
        ("USDT", 1.0),
        ("USDC", 1.0),
        ("LUTAR", 0.004),
    ])
});

/// Copy of the static table, shared with the price-proxy API so both tiers
/// inject the same fallbacks.
pub fn static_fallback_prices() -> HashMap<String, f64> {
    STATIC_FALLBACK_PRICES
        .iter()
        .map(|(k, v)| (k.to_string(), *v))
        .collect()
}

#[derive(Debug, Clone)]
pub struct PriceEntry {
    pub usd_price: f64,
    pub fetched_at: Instant,
}

#[derive(Debug, Clone)]
pub struct RateEntry {
    pub rate: f64,
    pub fetched_at: Instant,
}

#[derive(Clone)]
pub struct PriceServiceConfig {
    /// Cache entries at or past this age are expired.
    pub cache_ttl: Duration,
    /// Minimum spacing between any two outbound provider calls.
    pub min_request_interval: Duration,
    /// Hard timeout applied around each provider call.
    pub provider_timeout: Duration,
    /// Live provider calls allowed per batch invocation.
    pub max_live_calls_per_batch: usize,
    pub fallback_prices: HashMap<String, f64>,
}

impl Default for PriceServiceConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(60),
            min_request_interval: Duration::from_secs(2),
            provider_timeout: Duration::from_secs(10),
            max_live_calls_per_batch: 3,
            fallback_prices: STATIC_FALLBACK_PRICES
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
        }
    }
}

struct ThrottleState {
    next_allowed: Option<Instant>,
    consecutive_failures: u32,
}

/// USD price and pairwise exchange-rate service. Provider failures are fully
/// absorbed: callers always get a number, worst case the static fallback.
pub struct PriceService {
    providers: Vec<Arc<dyn PriceProvider>>,
    config: PriceServiceConfig,
    price_cache: DashMap<String, PriceEntry>,
    rate_cache: DashMap<String, RateEntry>,
    throttle: Mutex<ThrottleState>,
    degraded: AtomicBool,
}

impl PriceService {
    pub fn new(providers: Vec<Arc<dyn PriceProvider>>, config: PriceServiceConfig) -> Self {
        Self {
            providers,
            config,
            price_cache: DashMap::new(),
            rate_cache: DashMap::new(),
            throttle: Mutex::new(ThrottleState {
                next_allowed: None,
                consecutive_failures: 0,
            }),
            degraded: AtomicBool::new(false),
        }
    }

    pub fn with_default_providers() -> Self {
        Self::new(super::default_provider_stack(), PriceServiceConfig::default())
    }

    /// True once any lookup had to use the static fallback table; cleared by
    /// the next live success. Exposed so a UI can show a "rates may be
    /// delayed" hint.
    pub fn degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    fn is_fresh(&self, fetched_at: Instant) -> bool {
        fetched_at.elapsed() < self.config.cache_ttl
    }

    /// Enforce the global inter-request spacing, doubled per consecutive
    /// failure to protect free-tier quotas.
    async fn throttle_before_call(&self) {
        let wait = {
            let mut state = self.throttle.lock().await;
            let now = Instant::now();
            let wait = state
                .next_allowed
                .and_then(|t| t.checked_duration_since(now))
                .unwrap_or(Duration::ZERO);
            let backoff_factor = 2u32.saturating_pow(state.consecutive_failures.min(6));
            let interval = self.config.min_request_interval * backoff_factor;
            state.next_allowed = Some(now + wait + interval);
            wait
        };
        if !wait.is_zero() {
            debug!("Throttling provider call for {:?}", wait);
            tokio::time::sleep(wait).await;
        }
    }

    async fn record_success(&self) {
        let mut state = self.throttle.lock().await;
        state.consecutive_failures = 0;
        self.degraded.store(false, Ordering::Relaxed);
    }

    async fn record_failure(&self) {
        let mut state = self.throttle.lock().await;
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
    }

    fn fallback_price(&self, symbol: &str) -> f64 {
        match self.config.fallback_prices.get(symbol) {
            Some(price) => {
                warn!("Price degraded: using static fallback {} for {}", price, symbol);
                self.degraded.store(true, Ordering::Relaxed);
                *price
            }
            None => {
                error!("No provider price and no static fallback for {}", symbol);
                0.0
            }
        }
    }

    async fn fetch_live_price(&self, symbol: &str) -> Option<f64> {
        for provider in &self.providers {
            self.throttle_before_call().await;
            let attempt = tokio::time::timeout(
                self.config.provider_timeout,
                provider.fetch_usd_price(symbol),
            )
            .await;
            match attempt {
                Ok(Ok(price)) => {
                    debug!("{} priced {} at {}", provider.name(), symbol, price);
                    self.record_success().await;
                    return Some(price);
                }
                Ok(Err(e)) => {
                    debug!("{} failed for {}: {}", provider.name(), symbol, e);
                    self.record_failure().await;
                }
                Err(_) => {
                    debug!("{} timed out for {}", provider.name(), symbol);
                    self.record_failure().await;
                }
            }
        }
        None
    }

    /// USD price for one symbol. Cache-first, then the ordered provider
    /// stack, then the static fallback. Never fails.
    #[instrument(skip(self))]
    pub async fn get_token_price_usd(&self, symbol: &str) -> f64 {
        let symbol = symbol.to_uppercase();
        if let Some(entry) = self.price_cache.get(&symbol) {
            if self.is_fresh(entry.fetched_at) {
                return entry.usd_price;
            }
        }
        match self.fetch_live_price(&symbol).await {
            Some(price) => {
                self.price_cache.insert(
                    symbol,
                    PriceEntry {
                        usd_price: price,
                        fetched_at: Instant::now(),
                    },
                );
                price
            }
            None => self.fallback_price(&symbol),
        }
    }

    /// Exchange rate between two symbols. USD legs delegate straight to the
    /// price lookup so `rate(X, USD) == price(X)` holds exactly.
    #[instrument(skip(self))]
    pub async fn get_exchange_rate(&self, from: &str, to: &str) -> f64 {
        let from = from.to_uppercase();
        let to = to.to_uppercase();
        if from == to {
            return 1.0;
        }
        if to == "USD" {
            return self.get_token_price_usd(&from).await;
        }
        if from == "USD" {
            let price = self.get_token_price_usd(&to).await;
            return if price > 0.0 { 1.0 / price } else { 0.0 };
        }

        let cache_key = format!("{from}->{to}");
        if let Some(entry) = self.rate_cache.get(&cache_key) {
            if self.is_fresh(entry.fetched_at) {
                return entry.rate;
            }
        }

        let rate = match self.fetch_live_pair_rate(&from, &to).await {
            Some(rate) => rate,
            None => {
                let from_usd = self.get_token_price_usd(&from).await;
                let to_usd = self.get_token_price_usd(&to).await;
                if to_usd > 0.0 {
                    from_usd / to_usd
                } else {
                    0.0
                }
            }
        };
        if rate > 0.0 {
            self.rate_cache.insert(
                cache_key,
                RateEntry {
                    rate,
                    fetched_at: Instant::now(),
                },
            );
        }
        rate
    }

    async fn fetch_live_pair_rate(&self, from: &str, to: &str) -> Option<f64> {
        for provider in &self.providers {
            self.throttle_before_call().await;
            let attempt = tokio::time::timeout(
                self.config.provider_timeout,
                provider.fetch_pair_rate(from, to),
            )
            .await;
            match attempt {
                Ok(Ok(rate)) => {
                    debug!("{} quoted {}/{} at {}", provider.name(), from, to, rate);
                    self.record_success().await;
                    return Some(rate);
                }
                Ok(Err(PriceError::PairUnsupported)) => continue,
                Ok(Err(e)) => {
                    debug!("{} pair quote failed for {}/{}: {}", provider.name(), from, to, e);
                    self.record_failure().await;
                }
                Err(_) => {
                    self.record_failure().await;
                }
            }
        }
        None
    }

    /// Batch USD lookup with a bounded live-call budget. Symbols that are
    /// not covered by cache or a live response come from the fallback table.
    #[instrument(skip(self))]
    pub async fn get_token_prices_usd(&self, symbols: &[String]) -> HashMap<String, f64> {
        let mut prices = HashMap::new();
        let mut misses: Vec<String> = Vec::new();
        for symbol in symbols {
            let symbol = symbol.to_uppercase();
            match self.price_cache.get(&symbol) {
                Some(entry) if self.is_fresh(entry.fetched_at) => {
                    prices.insert(symbol, entry.usd_price);
                }
                _ => {
                    if !misses.contains(&symbol) {
                        misses.push(symbol);
                    }
                }
            }
        }

        let mut live_calls = 0;
        for provider in &self.providers {
            if misses.is_empty() || live_calls >= self.config.max_live_calls_per_batch {
                break;
            }
            self.throttle_before_call().await;
            live_calls += 1;
            let attempt = tokio::time::timeout(
                self.config.provider_timeout,
                provider.fetch_usd_prices(&misses),
            )
            .await;
            match attempt {
                Ok(Ok(batch)) => {
                    self.record_success().await;
                    for (symbol, price) in batch {
                        let symbol = symbol.to_uppercase();
                        self.price_cache.insert(
                            symbol.clone(),
                            PriceEntry {
                                usd_price: price,
                                fetched_at: Instant::now(),
                            },
                        );
                        misses.retain(|m| m != &symbol);
                        prices.insert(symbol, price);
                    }
                }
                Ok(Err(e)) => {
                    debug!("{} batch fetch failed: {}", provider.name(), e);
                    self.record_failure().await;
                }
                Err(_) => {
                    debug!("{} batch fetch timed out", provider.name());
                    self.record_failure().await;
                }
            }
        }

        for symbol in misses {
            let price = self.fallback_price(&symbol);
            prices.insert(symbol, price);
        }

        self.sweep_stale_entries();
        info!("Batch price fetch served {} symbols ({} live calls)", prices.len(), live_calls);
        prices
    }

    /// Evict entries older than twice the TTL after each batch operation.
    fn sweep_stale_entries(&self) {
        let horizon = self.config.cache_ttl * 2;
        self.price_cache
            .retain(|_, entry| entry.fetched_at.elapsed() < horizon);
        self.rate_cache
            .retain(|_, entry| entry.fetched_at.elapsed() < horizon);
    }

    #[cfg(test)]
    fn insert_price_with_age(&self, symbol: &str, price: f64, age: Duration) {
        self.price_cache.insert(
            symbol.to_string(),
            PriceEntry {
                usd_price: price,
                fetched_at: Instant::now() - age,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    struct MockProvider {
        calls: AtomicUsize,
        price: Option<f64>,
    }

    impl MockProvider {
        fn working(price: f64) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                price: Some(price),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                price: None,
            })
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PriceProvider for MockProvider {
        fn name(&self) -> &'static str {
            "mock"
        }

        async fn fetch_usd_price(&self, symbol: &str) -> Result<f64, PriceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.price
                .ok_or_else(|| PriceError::SymbolNotListed(symbol.to_string()))
        }

        async fn fetch_pair_rate(&self, _from: &str, _to: &str) -> Result<f64, PriceError> {
            Err(PriceError::PairUnsupported)
        }
    }

    fn fast_config() -> PriceServiceConfig {
        PriceServiceConfig {
            cache_ttl: Duration::from_millis(100),
            min_request_interval: Duration::ZERO,
            provider_timeout: Duration::from_secs(1),
            ..PriceServiceConfig::default()
        }
    }

    #[tokio::test]
    async fn test_fallback_when_all_providers_fail() {
        let service = PriceService::new(
            vec![MockProvider::failing(), MockProvider::failing()],
            fast_config(),
        );
        for symbol in ["ETH", "BNB", "POL", "BTC", "TRX", "SOL", "TON", "LUTAR"] {
            let price = service.get_token_price_usd(symbol).await;
            assert!(price > 0.0, "expected positive fallback for {symbol}");
        }
        assert!(service.degraded());
    }

    #[tokio::test]
    async fn test_cached_price_issues_single_network_call() {
        let provider = MockProvider::working(3500.0);
        let service = PriceService::new(vec![provider.clone()], fast_config());

        assert_eq!(service.get_token_price_usd("ETH").await, 3500.0);
        assert_eq!(service.get_token_price_usd("ETH").await, 3500.0);
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_ttl_boundary_is_exclusive() {
        let provider = MockProvider::working(100.0);
        let service = PriceService::new(vec![provider.clone()], fast_config());
        let ttl = service.config.cache_ttl;

        // An entry aged exactly TTL counts as expired; TTL-1ms is fresh.
        assert!(service.is_fresh(Instant::now() - (ttl - Duration::from_millis(1))));
        assert!(!service.is_fresh(Instant::now() - ttl));
        assert!(!service.is_fresh(Instant::now() - (ttl + Duration::from_millis(1))));

        // Fresh entry short-circuits the provider entirely.
        service.insert_price_with_age("ETH", 42.0, Duration::from_millis(10));
        assert_eq!(service.get_token_price_usd("ETH").await, 42.0);
        assert_eq!(provider.call_count(), 0);

        // Expired entry triggers a live refetch.
        service.insert_price_with_age("ETH", 42.0, Duration::from_millis(500));
        assert_eq!(service.get_token_price_usd("ETH").await, 100.0);
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_usd_rate_equals_price_lookup() {
        let service = PriceService::new(vec![MockProvider::working(3500.0)], fast_config());
        let price = service.get_token_price_usd("ETH").await;
        let rate = service.get_exchange_rate("ETH", "USD").await;
        assert_eq!(rate, price);
    }

    #[tokio::test]
    async fn test_cross_rate_falls_back_to_usd_ratio() {
        let service = PriceService::new(vec![MockProvider::working(100.0)], fast_config());
        // Both legs priced at 100 by the mock, so the ratio is exactly 1.
        let rate = service.get_exchange_rate("ETH", "BNB").await;
        assert_eq!(rate, 1.0);
    }

    #[tokio::test]
    async fn test_batch_respects_live_call_budget() {
        let p1 = MockProvider::failing();
        let p2 = MockProvider::failing();
        let p3 = MockProvider::failing();
        let p4 = MockProvider::failing();
        let service = PriceService::new(
            vec![p1.clone(), p2.clone(), p3.clone(), p4.clone()],
            fast_config(),
        );
        let symbols: Vec<String> = ["ETH", "BNB", "SOL"].iter().map(|s| s.to_string()).collect();
        let prices = service.get_token_prices_usd(&symbols).await;
        assert_eq!(prices.len(), 3);
        assert!(prices.values().all(|p| *p > 0.0));
        // Budget is 3 live calls; the fourth provider must not be touched.
        // MockProvider batch path defers to fetch_usd_price, one call each.
        assert_eq!(p4.call_count(), 0);
    }

    #[tokio::test]
    async fn test_backoff_resets_on_success() {
        let service = PriceService::new(vec![MockProvider::failing()], fast_config());
        let _ = service.get_token_price_usd("ETH").await;
        {
            let state = service.throttle.lock().await;
            assert!(state.consecutive_failures > 0);
        }
        service.record_success().await;
        let state = service.throttle.lock().await;
        assert_eq!(state.consecutive_failures, 0);
    }
}
