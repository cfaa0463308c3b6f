// =============================================================================
// DistributedLock — SETNX+TTL locks. No renewal, no fencing token: a lock
// that outlives the work it was meant to guard simply expires and lets the
// next owner through. This is a deliberate simplification (spec §4.6
// Non-goals) appropriate for single-digit-second critical sections guarded
// by a lock whose TTL is an order of magnitude larger.
// =============================================================================

use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisResult};

#[derive(Clone)]
pub struct DistributedLock {
    conn: ConnectionManager,
}

impl DistributedLock {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    /// Attempts to acquire `key` for `holder`, expiring after `ttl`.
    /// Returns `true` if this call won the lock.
    pub async fn acquire(&self, key: &str, holder: &str, ttl: Duration) -> RedisResult<bool> {
        let mut conn = self.conn.clone();
        let opts = redis::SetOptions::default()
            .conditional_set(redis::ExistenceCheck::NX)
            .with_expiration(redis::SetExpiry::EX(ttl.as_secs().max(1) as usize));
        let result: Option<String> = conn.set_options(key, holder, opts).await?;
        Ok(result.is_some())
    }

    /// Releases `key` only if `holder` is still the current value, avoiding
    /// releasing a lock some other process already re-acquired after ours
    /// expired.
    pub async fn release(&self, key: &str, holder: &str) -> RedisResult<()> {
        let mut conn = self.conn.clone();
        let current: Option<String> = conn.get(key).await?;
        if current.as_deref() == Some(holder) {
            let _: i64 = conn.del(key).await?;
        }
        Ok(())
    }
}

pub const BUY_LOCK_TTL: Duration = Duration::from_secs(180);
pub const SELL_LOCK_TTL: Duration = Duration::from_secs(30);
