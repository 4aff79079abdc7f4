use axum::{response::Json, routing::get, Router};
use lutar_presale_backend::api::{create_price_router, PriceApiState};
use tower_http::cors::CorsLayer;
use tracing::info;

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "lutar-presale-backend",
        "timestamp": chrono::Utc::now().timestamp(),
    }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let price_state = PriceApiState::new();
    info!("✅ Price proxy initialized");

    let app = Router::new()
        .route("/health", get(health))
        .merge(create_price_router().with_state(price_state))
        .layer(CorsLayer::permissive());

    let port = std::env::var("PORT").unwrap_or_else(|_| "8080".to_string());
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("🚀 Lutar presale backend listening on {}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
