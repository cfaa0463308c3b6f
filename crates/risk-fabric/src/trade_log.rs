// =============================================================================
// TradeLog — append-only per-code trade history backing two checks the spec
// names but never assigns a storage key for (§3 "TradeRecord ... used by
// cooldown reconstruction"; §4.4 gate 5 "duplicate-order window"). Decision:
// one Redis list per code, newest first, capped and trimmed on every push so
// it never grows past what either reader actually needs (§4.4's 10-minute
// duplicate window, §4.5's cooldown reconstruction after restart).
// =============================================================================

use std::time::Duration;

use domain::trade_record::TradeRecord;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisResult};

/// Long enough to reconstruct cooldowns after a restart without the list
/// growing unbounded for an actively-traded code.
const MAX_ENTRIES: isize = 200;

fn key(stock_code: &str) -> String {
    format!("log:trades:{stock_code}")
}

#[derive(Clone)]
pub struct TradeLog {
    conn: ConnectionManager,
}

impl TradeLog {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    pub async fn connect(redis_url: &str) -> RedisResult<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self::new(conn))
    }

    /// Appends `record` to the front of the code's history and trims to
    /// `MAX_ENTRIES`.
    pub async fn append(&self, record: &TradeRecord) -> RedisResult<()> {
        let body = serde_json::to_string(record).map_err(|e| {
            redis::RedisError::from((redis::ErrorKind::TypeError, "serialize", e.to_string()))
        })?;
        let mut conn = self.conn.clone();
        let key = key(record.stock_code.as_str());
        let _: () = conn.lpush(&key, body).await?;
        let _: () = conn.ltrim(&key, 0, MAX_ENTRIES - 1).await?;
        Ok(())
    }

    /// All records for `stock_code`, newest first, with no recency filter.
    pub async fn recent(&self, stock_code: &str) -> RedisResult<Vec<TradeRecord>> {
        let mut conn = self.conn.clone();
        let raw: Vec<String> = conn.lrange(key(stock_code), 0, MAX_ENTRIES - 1).await?;
        Ok(raw
            .into_iter()
            .filter_map(|s| serde_json::from_str(&s).ok())
            .collect())
    }

    /// Whether any record for `stock_code` falls within `window` of `now`.
    /// Used by the Buy Executor's duplicate-order window check.
    pub async fn has_entry_within(
        &self,
        stock_code: &str,
        now: chrono::DateTime<chrono::Utc>,
        window: Duration,
    ) -> RedisResult<bool> {
        let records = self.recent(stock_code).await?;
        let cutoff = now - chrono::Duration::from_std(window).unwrap_or_default();
        Ok(records.iter().any(|r| r.timestamp >= cutoff))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_per_code() {
        assert_eq!(key("005930"), "log:trades:005930");
    }
}
