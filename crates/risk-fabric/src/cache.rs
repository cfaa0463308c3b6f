// =============================================================================
// TypedCache — Redis JSON cache wrapper, keyed per the spec's §6.2 table.
// Every key written through here carries an explicit TTL; there is no
// untracked key that could outlive its owning cache entry.
// =============================================================================

use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisResult};
use serde::de::DeserializeOwned;
use serde::Serialize;

#[derive(Clone)]
pub struct TypedCache {
    conn: ConnectionManager,
}

impl TypedCache {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    pub async fn connect(redis_url: &str) -> RedisResult<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self::new(conn))
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> RedisResult<Option<T>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(key).await?;
        Ok(raw.and_then(|s| serde_json::from_str(&s).ok()))
    }

    pub async fn set_json<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> RedisResult<()> {
        let body = serde_json::to_string(value)
            .map_err(|e| redis::RedisError::from((redis::ErrorKind::TypeError, "serialize", e.to_string())))?;
        let mut conn = self.conn.clone();
        let _: () = conn.set_ex(key, body, ttl.as_secs().max(1)).await?;
        Ok(())
    }

    pub async fn delete(&self, key: &str) -> RedisResult<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.del(key).await?;
        Ok(())
    }

    pub async fn exists(&self, key: &str) -> RedisResult<bool> {
        let mut conn = self.conn.clone();
        let n: i64 = conn.exists(key).await?;
        Ok(n > 0)
    }

    /// Atomically increments a plain counter (e.g. the daily buy count),
    /// setting `ttl` only on the key's first write so a counter created mid-
    /// day still expires at the same wall-clock boundary future callers
    /// expect. Returns the post-increment value.
    pub async fn increment(&self, key: &str, ttl: Duration) -> RedisResult<i64> {
        let mut conn = self.conn.clone();
        let value: i64 = conn.incr(key, 1).await?;
        if value == 1 {
            let _: bool = conn.expire(key, ttl.as_secs().max(1) as i64).await?;
        }
        Ok(value)
    }

    pub async fn get_counter(&self, key: &str) -> RedisResult<i64> {
        let mut conn = self.conn.clone();
        let value: Option<i64> = conn.get(key).await?;
        Ok(value.unwrap_or(0))
    }
}

/// Cache key builders, collected in one place so the literal key formats
/// named in the spec's §6.2 table are never typo'd across crates.
pub mod keys {
    pub fn portfolio_state() -> String {
        "cache:portfolio:state".to_string()
    }

    pub fn trading_context() -> String {
        "cache:trading:context".to_string()
    }

    pub fn watchlist() -> String {
        "cache:watchlist:hot".to_string()
    }

    pub fn position(stock_code: &str) -> String {
        format!("cache:position:{stock_code}")
    }

    /// The Monitor's own aggregate publish (spec §6.2 `positions:live`).
    /// Not a source of truth for any other component — `cache:position:{code}`
    /// remains the authoritative per-code entry every executor reads/writes.
    pub fn positions_live() -> String {
        "positions:live".to_string()
    }

    pub fn correlation(code_a: &str, code_b: &str) -> String {
        let (a, b) = if code_a <= code_b {
            (code_a, code_b)
        } else {
            (code_b, code_a)
        };
        format!("cache:corr:{a}:{b}")
    }

    pub fn daily_closes(stock_code: &str) -> String {
        format!("cache:closes:{stock_code}")
    }

    pub fn buy_lock(stock_code: &str) -> String {
        format!("lock:buy:{stock_code}")
    }

    pub fn sell_lock(stock_code: &str) -> String {
        format!("lock:sell:{stock_code}")
    }

    pub fn sell_cooldown(stock_code: &str) -> String {
        format!("cooldown:sell:{stock_code}")
    }

    pub fn stoploss_cooldown(stock_code: &str) -> String {
        format!("cooldown:stoploss:{stock_code}")
    }

    pub fn daily_buy_count(date: &str) -> String {
        format!("cache:daily-buys:{date}")
    }
}

#[cfg(test)]
mod tests {
    use super::keys;

    #[test]
    fn correlation_key_is_symmetric() {
        assert_eq!(
            keys::correlation("005930", "000660"),
            keys::correlation("000660", "005930")
        );
    }

    #[test]
    fn position_key_embeds_code() {
        assert_eq!(keys::position("005930"), "cache:position:005930");
    }
}
