// =============================================================================
// Circuit Breaker — per-endpoint CLOSED/OPEN/HALF_OPEN state machine.
// Breaker state is per-process, never shared across components (spec §4.1).
// =============================================================================

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

struct EndpointBreaker {
    state: BreakerState,
    consecutive_failures: u32,
    window_start: Instant,
    opened_at: Option<Instant>,
}

impl EndpointBreaker {
    fn new() -> Self {
        Self {
            state: BreakerState::Closed,
            consecutive_failures: 0,
            window_start: Instant::now(),
            opened_at: None,
        }
    }
}

pub struct CircuitBreaker {
    failure_threshold: u32,
    failure_window: Duration,
    open_duration: Duration,
    endpoints: Mutex<HashMap<String, EndpointBreaker>>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, failure_window: Duration, open_duration: Duration) -> Self {
        Self {
            failure_threshold,
            failure_window,
            open_duration,
            endpoints: Mutex::new(HashMap::new()),
        }
    }

    /// Call before attempting a request. `false` means fast-reject with
    /// `CIRCUIT_OPEN`; the caller must not hit the venue.
    pub fn allow(&self, endpoint: &str) -> bool {
        let mut endpoints = self.endpoints.lock().expect("breaker mutex poisoned");
        let breaker = endpoints
            .entry(endpoint.to_string())
            .or_insert_with(EndpointBreaker::new);

        match breaker.state {
            BreakerState::Closed => true,
            BreakerState::HalfOpen => true,
            BreakerState::Open => {
                let elapsed = breaker.opened_at.map(|t| t.elapsed()).unwrap_or_default();
                if elapsed >= self.open_duration {
                    info!(endpoint, "breaker transitioning OPEN -> HALF_OPEN");
                    breaker.state = BreakerState::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self, endpoint: &str) {
        let mut endpoints = self.endpoints.lock().expect("breaker mutex poisoned");
        let breaker = endpoints
            .entry(endpoint.to_string())
            .or_insert_with(EndpointBreaker::new);
        if breaker.state == BreakerState::HalfOpen {
            info!(endpoint, "breaker probe succeeded, HALF_OPEN -> CLOSED");
        }
        breaker.state = BreakerState::Closed;
        breaker.consecutive_failures = 0;
        breaker.window_start = Instant::now();
        breaker.opened_at = None;
    }

    pub fn record_failure(&self, endpoint: &str) {
        let mut endpoints = self.endpoints.lock().expect("breaker mutex poisoned");
        let breaker = endpoints
            .entry(endpoint.to_string())
            .or_insert_with(EndpointBreaker::new);

        if breaker.state == BreakerState::HalfOpen {
            warn!(endpoint, "breaker probe failed, HALF_OPEN -> OPEN");
            breaker.state = BreakerState::Open;
            breaker.opened_at = Some(Instant::now());
            breaker.consecutive_failures = 0;
            return;
        }

        if breaker.window_start.elapsed() > self.failure_window {
            breaker.window_start = Instant::now();
            breaker.consecutive_failures = 0;
        }
        breaker.consecutive_failures += 1;

        if breaker.consecutive_failures >= self.failure_threshold {
            warn!(
                endpoint,
                failures = breaker.consecutive_failures,
                "breaker CLOSED -> OPEN"
            );
            breaker.state = BreakerState::Open;
            breaker.opened_at = Some(Instant::now());
        }
    }

    pub fn state_of(&self, endpoint: &str) -> BreakerState {
        let endpoints = self.endpoints.lock().expect("breaker mutex poisoned");
        endpoints
            .get(endpoint)
            .map(|b| b.state)
            .unwrap_or(BreakerState::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_threshold_failures() {
        let breaker = CircuitBreaker::new(5, Duration::from_secs(30), Duration::from_secs(60));
        for _ in 0..4 {
            breaker.record_failure("order_status");
            assert!(breaker.allow("order_status"));
        }
        breaker.record_failure("order_status");
        assert!(!breaker.allow("order_status"));
        assert_eq!(breaker.state_of("order_status"), BreakerState::Open);
    }

    #[test]
    fn success_resets_failure_count() {
        let breaker = CircuitBreaker::new(5, Duration::from_secs(30), Duration::from_secs(60));
        for _ in 0..4 {
            breaker.record_failure("place_order");
        }
        breaker.record_success("place_order");
        for _ in 0..4 {
            breaker.record_failure("place_order");
        }
        assert!(breaker.allow("place_order"));
    }

    #[test]
    fn half_open_failure_reopens() {
        let breaker = CircuitBreaker::new(1, Duration::from_secs(30), Duration::from_millis(10));
        breaker.record_failure("snapshot");
        assert_eq!(breaker.state_of("snapshot"), BreakerState::Open);
        std::thread::sleep(Duration::from_millis(20));
        assert!(breaker.allow("snapshot"));
        assert_eq!(breaker.state_of("snapshot"), BreakerState::HalfOpen);
        breaker.record_failure("snapshot");
        assert_eq!(breaker.state_of("snapshot"), BreakerState::Open);
    }

    #[test]
    fn endpoints_are_independent() {
        let breaker = CircuitBreaker::new(1, Duration::from_secs(30), Duration::from_secs(60));
        breaker.record_failure("place_order");
        assert!(!breaker.allow("place_order"));
        assert!(breaker.allow("order_status"));
    }
}
