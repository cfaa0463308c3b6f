// =============================================================================
// Cooldowns — plain TTL markers, no value semantics beyond presence. Writing
// one is "this code may not be bought/sold again until the key expires";
// checking one is a simple EXISTS.
// =============================================================================

use std::time::Duration;

use redis::RedisResult;

use crate::cache::{keys, TypedCache};

pub const SELL_COOLDOWN_TTL: Duration = Duration::from_secs(24 * 3600);
pub const STOPLOSS_COOLDOWN_TTL: Duration = Duration::from_secs(3 * 24 * 3600);

#[derive(Clone)]
pub struct Cooldowns {
    cache: TypedCache,
}

impl Cooldowns {
    pub fn new(cache: TypedCache) -> Self {
        Self { cache }
    }

    pub async fn mark_sold(&self, stock_code: &str) -> RedisResult<()> {
        self.cache
            .set_json(&keys::sell_cooldown(stock_code), &true, SELL_COOLDOWN_TTL)
            .await
    }

    pub async fn mark_stoploss(&self, stock_code: &str) -> RedisResult<()> {
        self.cache
            .set_json(
                &keys::stoploss_cooldown(stock_code),
                &true,
                STOPLOSS_COOLDOWN_TTL,
            )
            .await
    }

    pub async fn is_sell_cooling_down(&self, stock_code: &str) -> RedisResult<bool> {
        self.cache.exists(&keys::sell_cooldown(stock_code)).await
    }

    pub async fn is_stoploss_cooling_down(&self, stock_code: &str) -> RedisResult<bool> {
        self.cache
            .exists(&keys::stoploss_cooldown(stock_code))
            .await
    }
}
