// =============================================================================
// Local HTTP surface — the only way peer processes reach the Gateway. Every
// route is a thin wrapper over VenueClient; errors are normalized into the
// `{error, detail, service, timestamp}` envelope the spec mandates (§6.3).
// =============================================================================

use std::sync::Arc;

use axum::extract::{Json, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use chrono::Utc;
use domain::order::{OrderRequest, OrderResult};
use domain::stock_code::StockCode;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;

use crate::venue_client::{VenueClient, VenueError};
use crate::ws_streamer::Subscriptions;

pub struct AppState {
    pub venue: VenueClient,
    pub subscriptions: Arc<Subscriptions>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    detail: String,
    service: &'static str,
    timestamp: chrono::DateTime<Utc>,
}

fn error_response(status: StatusCode, error: &str, detail: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: error.to_string(),
            detail: detail.into(),
            service: "gateway",
            timestamp: Utc::now(),
        }),
    )
        .into_response()
}

impl IntoResponse for VenueError {
    fn into_response(self) -> Response {
        match self {
            VenueError::RateLimited => error_response(StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED", "token bucket exhausted"),
            VenueError::CircuitOpen => error_response(StatusCode::SERVICE_UNAVAILABLE, "CIRCUIT_OPEN", "endpoint circuit open"),
            VenueError::Upstream(detail) => error_response(StatusCode::SERVICE_UNAVAILABLE, "UPSTREAM_ERROR", detail),
            VenueError::Business(detail) => error_response(StatusCode::CONFLICT, "BUSINESS_ERROR", detail),
        }
    }
}

fn validation_error(detail: impl Into<String>) -> Response {
    error_response(StatusCode::BAD_REQUEST, "VALIDATION", detail)
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/market/snapshot", post(snapshot))
        .route("/api/market/daily-prices", post(daily_prices))
        .route("/api/market/minute-prices", post(minute_prices))
        .route("/api/market/is-market-open", get(is_market_open))
        .route("/api/market/is-trading-day", get(is_trading_day))
        .route("/api/trading/buy", post(buy))
        .route("/api/trading/sell", post(sell))
        .route("/api/trading/cancel", post(cancel))
        .route("/api/trading/order-status", post(order_status))
        .route("/api/account/balance", post(balance))
        .route("/api/account/cash", post(cash))
        .route("/api/subscribe", post(subscribe))
        .route("/api/unsubscribe", post(unsubscribe))
        .layer(cors)
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok", "timestamp": Utc::now() }))
}

#[derive(Deserialize)]
struct StockCodeRequest {
    stock_code: String,
}

fn parse_code(raw: &str) -> Result<StockCode, Response> {
    StockCode::new(raw).map_err(|e| validation_error(e.to_string()))
}

async fn snapshot(
    State(state): State<Arc<AppState>>,
    Json(req): Json<StockCodeRequest>,
) -> Response {
    let code = match parse_code(&req.stock_code) {
        Ok(c) => c,
        Err(r) => return r,
    };
    match state.venue.snapshot(&code).await {
        Ok(snap) => Json(snap).into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Deserialize)]
struct DailyPricesRequest {
    stock_code: String,
    days: usize,
}

async fn daily_prices(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DailyPricesRequest>,
) -> Response {
    let code = match parse_code(&req.stock_code) {
        Ok(c) => c,
        Err(r) => return r,
    };
    match state.venue.daily_prices(&code, req.days).await {
        Ok(prices) => Json(prices).into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Deserialize)]
struct MinutePricesRequest {
    stock_code: String,
    count: usize,
}

async fn minute_prices(
    State(state): State<Arc<AppState>>,
    Json(req): Json<MinutePricesRequest>,
) -> Response {
    let code = match parse_code(&req.stock_code) {
        Ok(c) => c,
        Err(r) => return r,
    };
    match state.venue.minute_prices(&code, req.count).await {
        Ok(prices) => Json(prices).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn is_market_open() -> impl IntoResponse {
    let now = Utc::now();
    let hour = now.format("%H:%M").to_string();
    let open = hour.as_str() >= "09:00" && hour.as_str() <= "15:30";
    Json(serde_json::json!({ "open": open, "session": if open { "regular" } else { "closed" } }))
}

#[derive(Deserialize)]
struct TradingDayQuery {
    date: Option<String>,
}

async fn is_trading_day(axum::extract::Query(q): axum::extract::Query<TradingDayQuery>) -> impl IntoResponse {
    // Weekend check only; venue holiday calendar is out of scope for this
    // local stub and would be backed by the venue's calendar endpoint.
    let trading = match q.date.as_deref().and_then(|d| chrono::NaiveDate::parse_from_str(d, "%Y-%m-%d").ok()) {
        Some(date) => !matches!(date.format("%a").to_string().as_str(), "Sat" | "Sun"),
        None => true,
    };
    Json(serde_json::json!({ "trading": trading }))
}

async fn buy(State(state): State<Arc<AppState>>, Json(order): Json<OrderRequest>) -> Response {
    match state.venue.place_buy(&order).await {
        Ok(result) => Json(result).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn sell(State(state): State<Arc<AppState>>, Json(order): Json<OrderRequest>) -> Response {
    match state.venue.place_sell(&order).await {
        Ok(result) => Json(result).into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Deserialize)]
struct OrderNoRequest {
    order_no: String,
}

async fn cancel(State(state): State<Arc<AppState>>, Json(req): Json<OrderNoRequest>) -> Response {
    match state.venue.cancel(&req.order_no).await {
        Ok(success) => Json(serde_json::json!({ "success": success })).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn order_status(State(state): State<Arc<AppState>>, Json(req): Json<OrderNoRequest>) -> Response {
    match state.venue.order_status(&req.order_no).await {
        Ok(result) => order_status_response(result).into_response(),
        Err(e) => e.into_response(),
    }
}

fn order_status_response(result: OrderResult) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "filled": result.success,
        "filled_qty": result.filled_quantity,
        "avg_price": result.avg_fill_price,
    }))
}

async fn balance(State(state): State<Arc<AppState>>) -> Response {
    match state.venue.balance().await {
        Ok(portfolio) => Json(portfolio).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn cash(State(state): State<Arc<AppState>>) -> Response {
    match state.venue.cash().await {
        Ok(buying_power) => Json(serde_json::json!({ "buying_power": buying_power })).into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Deserialize)]
struct CodesRequest {
    codes: Vec<String>,
}

async fn subscribe(State(state): State<Arc<AppState>>, Json(req): Json<CodesRequest>) -> Response {
    state.subscriptions.add(&req.codes).await;
    Json(serde_json::json!({ "subscribed": req.codes.len() })).into_response()
}

async fn unsubscribe(State(state): State<Arc<AppState>>, Json(req): Json<CodesRequest>) -> Response {
    state.subscriptions.remove(&req.codes).await;
    warn!(count = req.codes.len(), "unsubscribed codes");
    Json(serde_json::json!({ "unsubscribed": req.codes.len() })).into_response()
}
