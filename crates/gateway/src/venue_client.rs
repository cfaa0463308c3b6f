// =============================================================================
// VenueClient — signed REST client for the brokerage venue.
//
// Every outbound call funnels through the shared token bucket and the
// per-endpoint circuit breaker before it reaches the wire, and is preceded
// by an ensured-fresh bearer token (spec §4.1). This is the only code in
// the whole system that holds the venue credential.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use domain::market_data::{DailyPrice, MinutePrice, StockSnapshot};
use domain::order::{OrderRequest, OrderResult};
use domain::stock_code::StockCode;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

use crate::breaker::CircuitBreaker;
use crate::rate_limit::TokenBucket;
use crate::token_cache::CachedToken;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
pub enum VenueError {
    #[error("RATE_LIMITED")]
    RateLimited,
    #[error("CIRCUIT_OPEN")]
    CircuitOpen,
    #[error("UPSTREAM_ERROR: {0}")]
    Upstream(String),
    #[error("business error: {0}")]
    Business(String),
}

pub struct VenueClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    secret: String,
    token_file_path: String,
    bearer: RwLock<Option<CachedToken>>,
    bucket: Arc<TokenBucket>,
    breaker: Arc<CircuitBreaker>,
    acquire_timeout: Duration,
}

impl VenueClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        secret: impl Into<String>,
        token_file_path: impl Into<String>,
        bucket: Arc<TokenBucket>,
        breaker: Arc<CircuitBreaker>,
        http_timeout: Duration,
        acquire_timeout: Duration,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(http_timeout)
            .build()
            .expect("failed to build reqwest client");
        let token_file_path = token_file_path.into();
        let bearer = RwLock::new(CachedToken::load(&token_file_path));
        Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
            secret: secret.into(),
            token_file_path,
            bearer,
            bucket,
            breaker,
            acquire_timeout,
        }
    }

    fn sign(&self, payload: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .expect("HMAC accepts any key size");
        mac.update(payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Returns a valid bearer token, refreshing it if the cached one is
    /// within 5 minutes of expiry or absent (spec §4.1 token cache).
    async fn ensure_token(&self) -> Result<String> {
        {
            let guard = self.bearer.read().await;
            if let Some(cached) = guard.as_ref() {
                if !cached.needs_rotation() {
                    return Ok(cached.token.clone());
                }
            }
        }

        let issued = self.issue_token().await?;
        issued
            .save(&self.token_file_path)
            .context("failed to persist venue token")?;
        let token = issued.token.clone();
        *self.bearer.write().await = Some(issued);
        Ok(token)
    }

    #[instrument(skip(self), name = "venue::issue_token")]
    async fn issue_token(&self) -> Result<CachedToken> {
        debug!("requesting fresh venue bearer token");
        let resp = self
            .http
            .post(format!("{}/oauth2/tokenP", self.base_url))
            .json(&serde_json::json!({
                "grant_type": "client_credentials",
                "appkey": self.api_key,
                "appsecret": self.secret,
            }))
            .send()
            .await
            .context("token issuance request failed")?;
        let body: serde_json::Value = resp.json().await.context("token response not JSON")?;
        let token = body["access_token"]
            .as_str()
            .context("token response missing access_token")?
            .to_string();
        let expires_in = body["expires_in"].as_i64().unwrap_or(86_400);
        Ok(CachedToken {
            token,
            expires_at: Utc::now() + chrono::Duration::seconds(expires_in),
        })
    }

    async fn gate(&self, endpoint: &str) -> Result<(), VenueError> {
        if !self.breaker.allow(endpoint) {
            return Err(VenueError::CircuitOpen);
        }
        if !self.bucket.acquire(self.acquire_timeout).await {
            return Err(VenueError::RateLimited);
        }
        Ok(())
    }

    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        path: &str,
        body: serde_json::Value,
    ) -> Result<T, VenueError> {
        self.gate(endpoint).await?;
        let token = self
            .ensure_token()
            .await
            .map_err(|e| VenueError::Upstream(e.to_string()))?;

        let result = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(token)
            .header("appkey", &self.api_key)
            .json(&body)
            .send()
            .await;

        let resp = match result {
            Ok(r) => r,
            Err(e) => {
                self.breaker.record_failure(endpoint);
                return Err(VenueError::Upstream(e.to_string()));
            }
        };

        let status = resp.status();
        if status.is_server_error() {
            self.breaker.record_failure(endpoint);
            return Err(VenueError::Upstream(format!("HTTP {status}")));
        }
        if status.is_client_error() {
            // Business errors do not trip the breaker (spec §4.1).
            let detail = resp.text().await.unwrap_or_default();
            return Err(VenueError::Business(detail));
        }

        self.breaker.record_success(endpoint);
        resp.json::<T>()
            .await
            .map_err(|e| VenueError::Upstream(format!("malformed response: {e}")))
    }

    #[instrument(skip(self), name = "venue::snapshot")]
    pub async fn snapshot(&self, stock_code: &StockCode) -> Result<StockSnapshot, VenueError> {
        self.post_json(
            "snapshot",
            "/uapi/domestic-stock/v1/quotations/inquire-price",
            serde_json::json!({ "stock_code": stock_code.as_str() }),
        )
        .await
    }

    #[instrument(skip(self), name = "venue::daily_prices")]
    pub async fn daily_prices(
        &self,
        stock_code: &StockCode,
        days: usize,
    ) -> Result<Vec<DailyPrice>, VenueError> {
        self.post_json(
            "daily_prices",
            "/uapi/domestic-stock/v1/quotations/inquire-daily-price",
            serde_json::json!({ "stock_code": stock_code.as_str(), "days": days }),
        )
        .await
    }

    #[instrument(skip(self), name = "venue::minute_prices")]
    pub async fn minute_prices(
        &self,
        stock_code: &StockCode,
        count: usize,
    ) -> Result<Vec<MinutePrice>, VenueError> {
        self.post_json(
            "minute_prices",
            "/uapi/domestic-stock/v1/quotations/inquire-time-itemconclusion",
            serde_json::json!({ "stock_code": stock_code.as_str(), "count": count }),
        )
        .await
    }

    #[instrument(skip(self, order), name = "venue::place_buy")]
    pub async fn place_buy(&self, order: &OrderRequest) -> Result<OrderResult, VenueError> {
        self.post_json(
            "place_buy",
            "/uapi/domestic-stock/v1/trading/order-cash",
            serde_json::json!({ "side": "buy", "order": order }),
        )
        .await
    }

    #[instrument(skip(self, order), name = "venue::place_sell")]
    pub async fn place_sell(&self, order: &OrderRequest) -> Result<OrderResult, VenueError> {
        self.post_json(
            "place_sell",
            "/uapi/domestic-stock/v1/trading/order-cash",
            serde_json::json!({ "side": "sell", "order": order }),
        )
        .await
    }

    #[instrument(skip(self), name = "venue::cancel")]
    pub async fn cancel(&self, order_no: &str) -> Result<bool, VenueError> {
        #[derive(serde::Deserialize)]
        struct CancelResponse {
            success: bool,
        }
        let resp: CancelResponse = self
            .post_json(
                "cancel",
                "/uapi/domestic-stock/v1/trading/order-rvsecncl",
                serde_json::json!({ "order_no": order_no }),
            )
            .await?;
        Ok(resp.success)
    }

    #[instrument(skip(self), name = "venue::order_status")]
    pub async fn order_status(&self, order_no: &str) -> Result<OrderResult, VenueError> {
        if order_no == "DRYRUN" {
            return Ok(OrderResult::filled("DRYRUN", 0, 0.0));
        }
        self.post_json(
            "order_status",
            "/uapi/domestic-stock/v1/trading/inquire-order",
            serde_json::json!({ "order_no": order_no }),
        )
        .await
    }

    #[instrument(skip(self), name = "venue::balance")]
    pub async fn balance(&self) -> Result<domain::portfolio::PortfolioState, VenueError> {
        self.post_json(
            "balance",
            "/uapi/domestic-stock/v1/trading/inquire-balance",
            serde_json::json!({}),
        )
        .await
    }

    #[instrument(skip(self), name = "venue::cash")]
    pub async fn cash(&self) -> Result<f64, VenueError> {
        #[derive(serde::Deserialize)]
        struct CashResponse {
            buying_power: f64,
        }
        let resp: CashResponse = self
            .post_json(
                "cash",
                "/uapi/domestic-stock/v1/trading/inquire-psbl-order",
                serde_json::json!({}),
            )
            .await?;
        Ok(resp.buying_power)
    }

    pub fn warn_unsupported(&self, operation: &str) {
        warn!(operation, "venue operation not implemented by this deployment");
    }
}
