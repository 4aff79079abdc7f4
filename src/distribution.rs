use crate::types::Chain;
use reqwest::Client as HttpClient;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, instrument, warn};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum DistributionError {
    #[error("Network request failed: {0}")]
    NetworkError(#[from] reqwest::Error),
    #[error("Distribution engine rejected the request: {0}")]
    Rejected(String),
    #[error("Invalid response from distribution engine: {0}")]
    InvalidResponse(String),
}

/// One confirmed payment to settle. The payment hash proves the inbound
/// transfer; the engine mints/transfers LUTAR to the recipient.
#[derive(Debug, Clone, Serialize)]
pub struct DistributionRequest {
    pub recipient_address: String,
    pub lutar_amount: Decimal,
    pub payment_tx_hash: String,
    pub payment_chain: Chain,
    pub payment_token: String,
    pub payment_amount: String,
}

/// Either an immediate settlement hash or a queue ticket to poll.
#[derive(Debug, Clone, Deserialize)]
pub struct DistributionReceipt {
    #[serde(rename = "distributionTxHash")]
    pub distribution_tx_hash: Option<String>,
    #[serde(rename = "queueId")]
    pub queue_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueStatus {
    pub status: String,
    #[serde(rename = "distributionTxHash")]
    pub distribution_tx_hash: Option<String>,
}

/// HTTP client for the server-side distribution engine. Called once per
/// confirmed payment; failures are reported, never retried automatically.
pub struct DistributionClient {
    http_client: HttpClient,
    base_url: String,
}

impl DistributionClient {
    pub fn new() -> Self {
        let base_url = std::env::var("DISTRIBUTION_API_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:8080".to_string());
        Self::with_base_url(base_url)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("LutarPresale/1.0")
            .build()
            .expect("Failed to create HTTP client");
        Self {
            http_client,
            base_url: base_url.into(),
        }
    }

    #[instrument(skip(self, request), fields(chain = request.payment_chain.as_str(), tx = %request.payment_tx_hash))]
    pub async fn request_distribution(
        &self,
        request: &DistributionRequest,
    ) -> Result<DistributionReceipt, DistributionError> {
        let url = format!("{}/distribute-lutar", self.base_url);
        // Engine-side dedup key; a retried request must not double-distribute.
        let request_id = Uuid::new_v4();
        let body = json!({
            "requestId": request_id.to_string(),
            "recipientAddress": request.recipient_address,
            "lutarAmount": request.lutar_amount.to_string(),
            "paymentTxHash": request.payment_tx_hash,
            "paymentChain": request.payment_chain.as_str(),
            "paymentToken": request.payment_token,
            "paymentAmount": request.payment_amount,
        });
        let response = self.http_client.post(&url).json(&body).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            warn!("Distribution request failed with {}: {}", status, detail);
            return Err(DistributionError::Rejected(format!("{status}: {detail}")));
        }
        let receipt: DistributionReceipt = response.json().await?;
        if receipt.distribution_tx_hash.is_none() && receipt.queue_id.is_none() {
            return Err(DistributionError::InvalidResponse(
                "neither distributionTxHash nor queueId present".to_string(),
            ));
        }
        info!(
            "Distribution accepted: tx={:?} queue={:?}",
            receipt.distribution_tx_hash, receipt.queue_id
        );
        Ok(receipt)
    }

    /// Opaque read of the engine's remaining LUTAR balance.
    pub async fn engine_balance(&self) -> Result<Decimal, DistributionError> {
        let url = format!("{}/distribute-lutar?action=balance", self.base_url);
        let response = self.http_client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(DistributionError::Rejected(response.status().to_string()));
        }
        let body: serde_json::Value = response.json().await?;
        body.get("balance")
            .and_then(|v| v.as_str().map(str::to_string).or_else(|| v.as_f64().map(|f| f.to_string())))
            .and_then(|s| s.parse::<Decimal>().ok())
            .ok_or_else(|| DistributionError::InvalidResponse("no balance field".to_string()))
    }

    /// Opaque status poll for a queued distribution.
    pub async fn queue_status(&self, queue_id: &str) -> Result<QueueStatus, DistributionError> {
        let url = format!("{}/distribute-lutar?queueId={}", self.base_url, queue_id);
        let response = self.http_client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(DistributionError::Rejected(response.status().to_string()));
        }
        Ok(response.json().await?)
    }
}

impl Default for DistributionClient {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Query;
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn sample_request() -> DistributionRequest {
        DistributionRequest {
            recipient_address: "0x55d398326f99059fF775485246999027B3197955".to_string(),
            lutar_amount: dec!(25000.00),
            payment_tx_hash: "0xfeedbeef".to_string(),
            payment_chain: Chain::Bnb,
            payment_token: "USDT".to_string(),
            payment_amount: "100000000000000000000".to_string(),
        }
    }

    async fn status_endpoint(
        Query(params): Query<HashMap<String, String>>,
    ) -> Json<serde_json::Value> {
        if params.get("action").map(String::as_str) == Some("balance") {
            return Json(json!({ "balance": "1234.5" }));
        }
        Json(json!({ "status": "completed", "distributionTxHash": "0xdone" }))
    }

    #[tokio::test]
    async fn test_accepted_distribution_yields_receipt() {
        let router = Router::new().route(
            "/distribute-lutar",
            post(|Json(body): Json<serde_json::Value>| async move {
                assert_eq!(body["recipientAddress"], "0x55d398326f99059fF775485246999027B3197955");
                assert_eq!(body["lutarAmount"], "25000.00");
                assert_eq!(body["paymentChain"], "BNB");
                assert!(body["requestId"].as_str().is_some());
                Json(json!({ "distributionTxHash": "0xdist" }))
            }),
        );
        let client = DistributionClient::with_base_url(serve(router).await);

        let receipt = client.request_distribution(&sample_request()).await.unwrap();
        assert_eq!(receipt.distribution_tx_hash.as_deref(), Some("0xdist"));
        assert!(receipt.queue_id.is_none());
    }

    #[tokio::test]
    async fn test_non_2xx_is_rejected() {
        let router = Router::new().route(
            "/distribute-lutar",
            post(|| async { (StatusCode::BAD_REQUEST, "sold out") }),
        );
        let client = DistributionClient::with_base_url(serve(router).await);

        let err = client.request_distribution(&sample_request()).await.unwrap_err();
        match err {
            DistributionError::Rejected(detail) => assert!(detail.contains("sold out")),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_receipt_without_hash_or_queue_is_invalid() {
        let router = Router::new().route(
            "/distribute-lutar",
            post(|| async { Json(json!({ "status": "ok" })) }),
        );
        let client = DistributionClient::with_base_url(serve(router).await);

        let err = client.request_distribution(&sample_request()).await.unwrap_err();
        assert!(matches!(err, DistributionError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_queue_status_and_balance_reads() {
        let router = Router::new().route("/distribute-lutar", get(status_endpoint));
        let client = DistributionClient::with_base_url(serve(router).await);

        let status = client.queue_status("q-1").await.unwrap();
        assert_eq!(status.status, "completed");
        assert_eq!(status.distribution_tx_hash.as_deref(), Some("0xdone"));

        let balance = client.engine_balance().await.unwrap();
        assert_eq!(balance, dec!(1234.5));
    }
}
