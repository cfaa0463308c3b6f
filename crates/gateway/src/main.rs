// =============================================================================
// gateway — sole process-level owner of outbound brokerage traffic.
//
// Runs an HTTP server for peer services, one WebSocket reader into the tick
// stream, and a shared token bucket / circuit breaker guarding the venue
// credential. Must not be restarted while the venue is open (see module
// docs on `venue_client`): a restart during session hours risks exhausting
// the venue's token-issuance rate limit for the remainder of the session.
// =============================================================================

mod breaker;
mod config;
mod http;
mod rate_limit;
mod token_cache;
mod venue_client;
mod ws_streamer;

use std::sync::Arc;

use anyhow::Result;
use risk_fabric::bus::MessageBus;
use tracing::info;
use tracing_subscriber::EnvFilter;

use breaker::CircuitBreaker;
use config::Config;
use http::AppState;
use rate_limit::TokenBucket;
use venue_client::VenueClient;
use ws_streamer::Subscriptions;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .json()
        .init();

    let config = Config::from_env()?;
    info!(service = "gateway", bind_addr = %config.bind_addr, "starting");

    let bucket = Arc::new(TokenBucket::new(config.rate_bucket_tokens_per_sec));
    let breaker = Arc::new(CircuitBreaker::new(
        config.breaker_failure_threshold,
        config.breaker_failure_window,
        config.breaker_open_duration,
    ));

    let venue = VenueClient::new(
        config.venue_base_url.clone(),
        config.venue_api_key.clone(),
        config.venue_secret.clone(),
        config.token_file_path.clone(),
        bucket,
        breaker,
        config.http_timeout,
        config.rate_bucket_acquire_timeout,
    );

    let subscriptions = Arc::new(Subscriptions::new());
    let state = Arc::new(AppState {
        venue,
        subscriptions: subscriptions.clone(),
    });

    let bus = Arc::new(MessageBus::connect(&config.redis_url).await?);
    bus.ensure_group("stream:ticks", "group:scanner").await.ok();
    bus.ensure_group("stream:ticks", "group:monitor").await.ok();

    let ws_subscriptions = subscriptions;
    let ws_bus = bus.clone();
    let ws_url = config.venue_ws_url.clone();
    let maxlen = config.tick_stream_maxlen;
    tokio::spawn(async move {
        ws_streamer::run_with_reconnect(ws_url, ws_subscriptions, ws_bus, maxlen).await;
    });

    let app = http::router(state);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(service = "gateway", addr = %config.bind_addr, "http surface listening");
    axum::serve(listener, app).await?;

    Ok(())
}
