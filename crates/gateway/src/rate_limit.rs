// =============================================================================
// Token Bucket — proactive rate limiting for outbound venue REST calls.
//
// Unlike a header-derived tracker that reacts after the fact, every call
// here must acquire a token before it is sent: a single process-wide bucket
// of `capacity` tokens refilled continuously at `capacity` tokens/second.
// A caller that cannot get a token within the acquire timeout is rejected
// with `RATE_LIMITED` rather than queued indefinitely — the venue credential
// is shared by every outbound call in the process and must never be starved
// by a single slow caller.
// =============================================================================

use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::warn;

pub struct TokenBucket {
    capacity: f64,
    refill_per_sec: f64,
    state: Mutex<BucketState>,
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    pub fn new(tokens_per_sec: f64) -> Self {
        Self {
            capacity: tokens_per_sec,
            refill_per_sec: tokens_per_sec,
            state: Mutex::new(BucketState {
                tokens: tokens_per_sec,
                last_refill: Instant::now(),
            }),
        }
    }

    fn try_take(&self) -> bool {
        let mut state = self.state.lock().expect("token bucket mutex poisoned");
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        state.last_refill = now;

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Polls for a token until `timeout` elapses. Returns `false` (caller
    /// must surface `RATE_LIMITED`) if none became available in time.
    pub async fn acquire(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.try_take() {
                return true;
            }
            if Instant::now() >= deadline {
                warn!(timeout_ms = timeout.as_millis(), "rate bucket exhausted, acquire timed out");
                return false;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquires_immediately_when_tokens_available() {
        let bucket = TokenBucket::new(19.0);
        assert!(bucket.acquire(Duration::from_millis(100)).await);
    }

    #[tokio::test]
    async fn exhausted_bucket_times_out() {
        let bucket = TokenBucket::new(1.0);
        assert!(bucket.acquire(Duration::from_millis(50)).await);
        // Second immediate acquire has ~1s of refill to wait for; a 20ms
        // timeout should not be enough.
        assert!(!bucket.acquire(Duration::from_millis(20)).await);
    }

    #[tokio::test]
    async fn refills_over_time() {
        let bucket = TokenBucket::new(20.0);
        assert!(bucket.acquire(Duration::from_millis(10)).await);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(bucket.acquire(Duration::from_millis(10)).await);
    }
}
