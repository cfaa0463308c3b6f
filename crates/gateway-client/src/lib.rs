// =============================================================================
// gateway-client — thin REST client for the Gateway's local HTTP surface
// (spec §6.3). Every other component reaches the brokerage only through
// this client; none of them hold the venue credential or talk to the venue
// directly. Grounded on the Gateway's own `venue_client.rs` shape
// (instrumented async methods returning a typed error), adapted from a
// signed external client to a plain internal one calling a peer process.
// =============================================================================

use std::time::Duration;

use domain::market_data::{DailyPrice, MinutePrice, StockSnapshot};
use domain::order::{OrderRequest, OrderResult};
use domain::portfolio::PortfolioState;
use domain::stock_code::StockCode;
use serde::Deserialize;
use thiserror::Error;
use tracing::instrument;

/// Mirrors the Gateway's `{error, detail, service, timestamp}` envelope
/// (spec §6.3) plus the handful of transport failures that never reach the
/// Gateway at all (connect refused, timeout).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GatewayError {
    #[error("RATE_LIMITED")]
    RateLimited,
    #[error("CIRCUIT_OPEN")]
    CircuitOpen,
    #[error("UPSTREAM_ERROR: {0}")]
    Upstream(String),
    #[error("business error: {0}")]
    Business(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("transport error: {0}")]
    Transport(String),
}

impl GatewayError {
    /// Transport-level and 5xx/breaker failures are the only ones eligible
    /// for the "do not ACK, let pending-recovery retry" path (spec §7);
    /// business and validation errors are ACKed immediately.
    pub fn is_transport_failure(&self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::CircuitOpen | Self::Upstream(_) | Self::Transport(_)
        )
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
    detail: String,
}

#[derive(Clone)]
pub struct GatewayClient {
    http: reqwest::Client,
    base_url: String,
}

impl GatewayClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to build reqwest client");
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    async fn post<B: serde::Serialize, T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, GatewayError> {
        let resp = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .json(body)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        self.handle_response(resp).await
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, GatewayError> {
        let resp = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        self.handle_response(resp).await
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        resp: reqwest::Response,
    ) -> Result<T, GatewayError> {
        let status = resp.status();
        if status.is_success() {
            return resp
                .json::<T>()
                .await
                .map_err(|e| GatewayError::Transport(format!("malformed response: {e}")));
        }

        let body: Option<ErrorBody> = resp.json().await.ok();
        let (error, detail) = body
            .map(|b| (b.error, b.detail))
            .unwrap_or_else(|| ("UNKNOWN".to_string(), status.to_string()));

        Err(match (status.as_u16(), error.as_str()) {
            (429, _) => GatewayError::RateLimited,
            (503, "CIRCUIT_OPEN") => GatewayError::CircuitOpen,
            (503, _) => GatewayError::Upstream(detail),
            (409, _) => GatewayError::Business(detail),
            (400, _) => GatewayError::Validation(detail),
            _ => GatewayError::Upstream(detail),
        })
    }

    #[instrument(skip(self), name = "gateway_client::snapshot")]
    pub async fn snapshot(&self, stock_code: &StockCode) -> Result<StockSnapshot, GatewayError> {
        self.post(
            "/api/market/snapshot",
            &serde_json::json!({ "stock_code": stock_code.as_str() }),
        )
        .await
    }

    #[instrument(skip(self), name = "gateway_client::daily_prices")]
    pub async fn daily_prices(
        &self,
        stock_code: &StockCode,
        days: usize,
    ) -> Result<Vec<DailyPrice>, GatewayError> {
        self.post(
            "/api/market/daily-prices",
            &serde_json::json!({ "stock_code": stock_code.as_str(), "days": days }),
        )
        .await
    }

    #[instrument(skip(self), name = "gateway_client::minute_prices")]
    pub async fn minute_prices(
        &self,
        stock_code: &StockCode,
        count: usize,
    ) -> Result<Vec<MinutePrice>, GatewayError> {
        self.post(
            "/api/market/minute-prices",
            &serde_json::json!({ "stock_code": stock_code.as_str(), "count": count }),
        )
        .await
    }

    #[instrument(skip(self), name = "gateway_client::is_market_open")]
    pub async fn is_market_open(&self) -> Result<bool, GatewayError> {
        #[derive(Deserialize)]
        struct Resp {
            open: bool,
        }
        let resp: Resp = self.get("/api/market/is-market-open").await?;
        Ok(resp.open)
    }

    #[instrument(skip(self), name = "gateway_client::is_trading_day")]
    pub async fn is_trading_day(&self, date: chrono::NaiveDate) -> Result<bool, GatewayError> {
        #[derive(Deserialize)]
        struct Resp {
            trading: bool,
        }
        let path = format!("/api/market/is-trading-day?date={}", date.format("%Y-%m-%d"));
        let resp: Resp = self.get(&path).await?;
        Ok(resp.trading)
    }

    #[instrument(skip(self, order), name = "gateway_client::place_buy")]
    pub async fn place_buy(&self, order: &OrderRequest) -> Result<OrderResult, GatewayError> {
        self.post("/api/trading/buy", order).await
    }

    #[instrument(skip(self, order), name = "gateway_client::place_sell")]
    pub async fn place_sell(&self, order: &OrderRequest) -> Result<OrderResult, GatewayError> {
        self.post("/api/trading/sell", order).await
    }

    #[instrument(skip(self), name = "gateway_client::cancel")]
    pub async fn cancel(&self, order_no: &str) -> Result<bool, GatewayError> {
        #[derive(Deserialize)]
        struct Resp {
            success: bool,
        }
        let resp: Resp = self
            .post(
                "/api/trading/cancel",
                &serde_json::json!({ "order_no": order_no }),
            )
            .await?;
        Ok(resp.success)
    }

    #[instrument(skip(self), name = "gateway_client::order_status")]
    pub async fn order_status(&self, order_no: &str) -> Result<OrderStatus, GatewayError> {
        self.post(
            "/api/trading/order-status",
            &serde_json::json!({ "order_no": order_no }),
        )
        .await
    }

    #[instrument(skip(self), name = "gateway_client::balance")]
    pub async fn balance(&self) -> Result<PortfolioState, GatewayError> {
        self.post("/api/account/balance", &serde_json::json!({})).await
    }

    #[instrument(skip(self), name = "gateway_client::cash")]
    pub async fn cash(&self) -> Result<f64, GatewayError> {
        #[derive(Deserialize)]
        struct Resp {
            buying_power: f64,
        }
        let resp: Resp = self.post("/api/account/cash", &serde_json::json!({})).await?;
        Ok(resp.buying_power)
    }

    #[instrument(skip(self), name = "gateway_client::subscribe")]
    pub async fn subscribe(&self, codes: &[String]) -> Result<(), GatewayError> {
        let _: serde_json::Value = self
            .post("/api/subscribe", &serde_json::json!({ "codes": codes }))
            .await?;
        Ok(())
    }

    #[instrument(skip(self), name = "gateway_client::unsubscribe")]
    pub async fn unsubscribe(&self, codes: &[String]) -> Result<(), GatewayError> {
        let _: serde_json::Value = self
            .post("/api/unsubscribe", &serde_json::json!({ "codes": codes }))
            .await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderStatus {
    pub filled: bool,
    pub filled_qty: u64,
    pub avg_price: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_failures_are_retry_eligible() {
        assert!(GatewayError::RateLimited.is_transport_failure());
        assert!(GatewayError::CircuitOpen.is_transport_failure());
        assert!(GatewayError::Upstream("x".into()).is_transport_failure());
        assert!(!GatewayError::Business("insufficient funds".into()).is_transport_failure());
        assert!(!GatewayError::Validation("bad code".into()).is_transport_failure());
    }
}
