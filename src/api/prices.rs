use crate::pricing::service::static_fallback_prices;
use crate::pricing::{CoinGeckoProvider, PriceProvider};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const PROXY_CACHE_TTL: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct PriceApiState {
    aggregator: Arc<dyn PriceProvider>,
    cache: Arc<DashMap<String, (HashMap<String, f64>, Instant)>>,
    fallbacks: Arc<HashMap<String, f64>>,
}

impl PriceApiState {
    pub fn new() -> Self {
        Self::with_aggregator(Arc::new(CoinGeckoProvider::new()))
    }

    pub fn with_aggregator(aggregator: Arc<dyn PriceProvider>) -> Self {
        Self {
            aggregator,
            cache: Arc::new(DashMap::new()),
            fallbacks: Arc::new(static_fallback_prices()),
        }
    }

    /// Serve a symbol list, proxying to the aggregator behind a 30s cache
    /// keyed by the sorted symbol list. Symbols the aggregator does not
    /// list get the fixed fallback price injected.
    async fn resolve(&self, symbols: &[String]) -> HashMap<String, f64> {
        let mut sorted: Vec<String> = symbols.iter().map(|s| s.to_uppercase()).collect();
        sorted.sort();
        sorted.dedup();
        let cache_key = sorted.join(",");

        if let Some(entry) = self.cache.get(&cache_key) {
            let (prices, at) = entry.value();
            if at.elapsed() < PROXY_CACHE_TTL {
                debug!("Price proxy cache hit for {}", cache_key);
                return prices.clone();
            }
        }

        let mut prices = match self.aggregator.fetch_usd_prices(&sorted).await {
            Ok(prices) => prices,
            Err(e) => {
                warn!("Aggregator fetch failed, serving fallbacks only: {}", e);
                HashMap::new()
            }
        };
        for symbol in &sorted {
            if !prices.contains_key(symbol) {
                if let Some(fallback) = self.fallbacks.get(symbol) {
                    prices.insert(symbol.clone(), *fallback);
                }
            }
        }

        self.cache.insert(cache_key, (prices.clone(), Instant::now()));
        prices
    }
}

impl Default for PriceApiState {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
pub struct PricesQueryParams {
    pub symbols: String,
}

#[derive(Debug, Deserialize)]
pub struct PricesBody {
    pub symbols: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct PricesResponse {
    pub prices: HashMap<String, f64>,
    pub timestamp: i64,
}

pub fn create_price_router() -> Router<PriceApiState> {
    Router::new()
        .route("/prices", get(get_prices))
        .route("/prices", post(post_prices))
}

async fn get_prices(
    State(state): State<PriceApiState>,
    Query(params): Query<PricesQueryParams>,
) -> Result<Json<PricesResponse>, StatusCode> {
    let symbols: Vec<String> = params
        .symbols
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    if symbols.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    info!("Price proxy GET for {} symbols", symbols.len());
    Ok(Json(PricesResponse {
        prices: state.resolve(&symbols).await,
        timestamp: Utc::now().timestamp(),
    }))
}

async fn post_prices(
    State(state): State<PriceApiState>,
    Json(body): Json<PricesBody>,
) -> Result<Json<PricesResponse>, StatusCode> {
    if body.symbols.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    Ok(Json(PricesResponse {
        prices: state.resolve(&body.symbols).await,
        timestamp: Utc::now().timestamp(),
    }))
}
