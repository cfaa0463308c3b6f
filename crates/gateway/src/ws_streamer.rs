// =============================================================================
// WebSocket streamer — one persistent connection to the venue, decoding
// inbound execution/quote frames into PriceTick and writing them to the
// tick stream. PINGPONG frames are echoed verbatim; everything else is a
// reconnect-worthy disconnect handled by the caller's while-loop, never by
// recursion (spec §4.1, §9 "Recursive WebSocket reconnect").
// =============================================================================

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use domain::tick::PriceTick;
use futures_util::{SinkExt, StreamExt};
use risk_fabric::bus::MessageBus;
use tokio::sync::RwLock;
use tokio_tungstenite::tungstenite::Message;
use tracing::{error, info, warn};

const TICK_STREAM: &str = "stream:ticks";
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Codes currently subscribed to: the union of portfolio holdings and the
/// active watchlist, re-sent on every reconnect.
pub struct Subscriptions {
    codes: RwLock<HashSet<String>>,
}

impl Subscriptions {
    pub fn new() -> Self {
        Self {
            codes: RwLock::new(HashSet::new()),
        }
    }

    pub async fn add(&self, codes: &[String]) {
        let mut set = self.codes.write().await;
        for code in codes {
            set.insert(code.clone());
        }
    }

    pub async fn remove(&self, codes: &[String]) {
        let mut set = self.codes.write().await;
        for code in codes {
            set.remove(code);
        }
    }

    pub async fn snapshot(&self) -> Vec<String> {
        self.codes.read().await.iter().cloned().collect()
    }
}

impl Default for Subscriptions {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_tick(text: &str) -> Option<PriceTick> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    if value.get("tr_id").and_then(|v| v.as_str()) == Some("PINGPONG") {
        return None;
    }
    let stock_code = value.get("stock_code")?.as_str()?;
    let price = value.get("price")?.as_f64()?;
    let volume = value.get("volume").and_then(|v| v.as_u64()).unwrap_or(0);
    let code = domain::stock_code::StockCode::new(stock_code).ok()?;
    PriceTick::new(code, price, volume, chrono::Utc::now()).ok()
}

/// Runs one connection attempt to completion (or failure). Returns `Ok(())`
/// when the server closed the stream cleanly, `Err` on any I/O failure; the
/// caller's loop decides whether and how long to wait before reconnecting.
pub async fn run_once(
    ws_url: &str,
    subscriptions: &Subscriptions,
    bus: &Arc<MessageBus>,
    maxlen: usize,
) -> anyhow::Result<()> {
    let (ws_stream, _) = tokio_tungstenite::connect_async(ws_url).await?;
    let (mut write, mut read) = ws_stream.split();

    let codes = subscriptions.snapshot().await;
    info!(count = codes.len(), "resubscribing after connect");
    for code in &codes {
        let sub = serde_json::json!({ "op": "subscribe", "stock_code": code }).to_string();
        write.send(Message::Text(sub)).await?;
    }

    while let Some(msg) = read.next().await {
        let msg = msg?;
        match msg {
            Message::Text(text) => {
                let raw: serde_json::Value = match serde_json::from_str(&text) {
                    Ok(v) => v,
                    Err(_) => continue,
                };
                if raw.get("tr_id").and_then(|v| v.as_str()) == Some("PINGPONG") {
                    write.send(Message::Text(text)).await?;
                    continue;
                }
                if let Some(tick) = parse_tick(&text) {
                    if let Err(e) = bus.publish_with_maxlen(TICK_STREAM, &tick, maxlen).await {
                        warn!(error = %e, "failed to publish tick");
                    }
                }
            }
            Message::Ping(payload) => {
                write.send(Message::Pong(payload)).await?;
            }
            Message::Close(_) => break,
            _ => {}
        }
    }
    Ok(())
}

/// Caller-owned reconnect loop: never recurses, backs off exponentially
/// capped at 30 s, and always fetches fresh credentials on the next
/// `run_once` call (the venue connection has no long-lived secret to stale).
pub async fn run_with_reconnect(
    ws_url: String,
    subscriptions: Arc<Subscriptions>,
    bus: Arc<MessageBus>,
    maxlen: usize,
) {
    let mut backoff = INITIAL_BACKOFF;
    loop {
        match run_once(&ws_url, &subscriptions, &bus, maxlen).await {
            Ok(()) => {
                info!("venue websocket stream ended cleanly, reconnecting");
                backoff = INITIAL_BACKOFF;
            }
            Err(e) => {
                error!(error = %e, backoff_secs = backoff.as_secs(), "venue websocket error, reconnecting");
            }
        }
        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(MAX_BACKOFF);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pingpong_frame_is_not_a_tick() {
        let raw = r#"{"tr_id":"PINGPONG"}"#;
        assert!(parse_tick(raw).is_none());
    }

    #[test]
    fn well_formed_tick_parses() {
        let raw = r#"{"stock_code":"005930","price":72100.0,"volume":120}"#;
        let tick = parse_tick(raw).unwrap();
        assert_eq!(tick.stock_code.as_str(), "005930");
        assert!((tick.price - 72_100.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn subscriptions_union_add_and_remove() {
        let subs = Subscriptions::new();
        subs.add(&["005930".to_string(), "000660".to_string()]).await;
        assert_eq!(subs.snapshot().await.len(), 2);
        subs.remove(&["005930".to_string()]).await;
        assert_eq!(subs.snapshot().await, vec!["000660".to_string()]);
    }
}
