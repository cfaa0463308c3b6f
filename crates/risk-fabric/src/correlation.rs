// =============================================================================
// CorrelationCache — Pearson correlation over the last 60 daily closes,
// cached per unordered (code_a, code_b) pair with a 12 h TTL (spec §4.6).
// A cache miss needs daily closes the Buy Executor's Gateway client owns;
// risk-fabric stays HTTP-agnostic by asking the caller to provide one
// through `DailyCloseSource` rather than depending on a REST client here.
// =============================================================================

use std::time::Duration;

use async_trait::async_trait;
use redis::RedisResult;

use crate::cache::{keys, TypedCache};

pub const CORRELATION_CACHE_TTL: Duration = Duration::from_secs(12 * 3600);
pub const CORRELATION_LOOKBACK_DAYS: usize = 60;

#[async_trait]
pub trait DailyCloseSource {
    async fn daily_closes(&self, stock_code: &str, days: usize) -> anyhow::Result<Vec<f64>>;
}

#[derive(Clone)]
pub struct CorrelationCache {
    cache: TypedCache,
}

impl CorrelationCache {
    pub fn new(cache: TypedCache) -> Self {
        Self { cache }
    }

    /// Returns the cached coefficient for `(code_a, code_b)`, or computes and
    /// caches it via `source` on a miss.
    pub async fn get_or_fetch(
        &self,
        code_a: &str,
        code_b: &str,
        source: &dyn DailyCloseSource,
    ) -> anyhow::Result<f64> {
        let key = keys::correlation(code_a, code_b);
        if let Some(cached) = self.get_cached(&key).await? {
            return Ok(cached);
        }

        let closes_a = source.daily_closes(code_a, CORRELATION_LOOKBACK_DAYS).await?;
        let closes_b = source.daily_closes(code_b, CORRELATION_LOOKBACK_DAYS).await?;
        let coefficient = pearson(&closes_a, &closes_b);
        self.cache
            .set_json(&key, &coefficient, CORRELATION_CACHE_TTL)
            .await?;
        Ok(coefficient)
    }

    async fn get_cached(&self, key: &str) -> RedisResult<Option<f64>> {
        self.cache.get_json(key).await
    }
}

/// Pearson correlation coefficient. Returns `0.0` for mismatched or
/// too-short series rather than erroring — the caller treats an
/// unverifiable pair as uncorrelated and lets other guard checks decide.
pub fn pearson(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len().min(b.len());
    if n < 2 {
        return 0.0;
    }
    let a = &a[a.len() - n..];
    let b = &b[b.len() - n..];

    let mean_a = a.iter().sum::<f64>() / n as f64;
    let mean_b = b.iter().sum::<f64>() / n as f64;

    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for i in 0..n {
        let da = a[i] - mean_a;
        let db = b[i] - mean_b;
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
    }

    if var_a <= 0.0 || var_b <= 0.0 {
        return 0.0;
    }
    cov / (var_a.sqrt() * var_b.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfectly_correlated_series_returns_one() {
        let a = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let b = vec![2.0, 4.0, 6.0, 8.0, 10.0];
        assert!((pearson(&a, &b) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn inversely_correlated_series_returns_negative_one() {
        let a = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let b = vec![5.0, 4.0, 3.0, 2.0, 1.0];
        assert!((pearson(&a, &b) + 1.0).abs() < 1e-9);
    }

    #[test]
    fn constant_series_returns_zero() {
        let a = vec![1.0, 1.0, 1.0];
        let b = vec![2.0, 3.0, 4.0];
        assert_eq!(pearson(&a, &b), 0.0);
    }

    #[test]
    fn short_series_returns_zero() {
        assert_eq!(pearson(&[1.0], &[2.0]), 0.0);
    }
}
