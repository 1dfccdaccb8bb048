use std::time::{Duration, Instant};

use dashmap::DashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Closed,
    Open,
    HalfOpen,
}

struct HostBreaker {
    state: State,
    failure_count: u32,
    last_failure_time: Option<Instant>,
}

/// Per-host circuit breaker: CLOSED (normal) -> OPEN (stop sending traffic
/// after `failure_threshold` consecutive failures) -> HALF_OPEN (one probe
/// allowed after `recovery_timeout`) -> CLOSED on success or back to OPEN
/// on failure.
pub struct CircuitBreakerRegistry {
    failure_threshold: u32,
    recovery_timeout: Duration,
    hosts: DashMap<String, HostBreaker>,
}

impl CircuitBreakerRegistry {
    pub fn new(failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            failure_threshold,
            recovery_timeout,
            hosts: DashMap::new(),
        }
    }

    /// Whether a request to this host should be allowed right now. Side
    /// effect: transitions OPEN -> HALF_OPEN once the recovery timeout has
    /// elapsed, matching the read-triggers-transition idiom of the
    /// reference implementation.
    pub fn allow(&self, host: &str) -> bool {
        let mut entry = self.hosts.entry(host.to_string()).or_insert_with(|| HostBreaker {
            state: State::Closed,
            failure_count: 0,
            last_failure_time: None,
        });

        match entry.state {
            State::Closed => true,
            State::HalfOpen => true,
            State::Open => {
                let elapsed = entry
                    .last_failure_time
                    .map(|t| t.elapsed())
                    .unwrap_or(Duration::MAX);
                if elapsed > self.recovery_timeout {
                    entry.state = State::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self, host: &str) {
        if let Some(mut entry) = self.hosts.get_mut(host) {
            entry.state = State::Closed;
            entry.failure_count = 0;
            entry.last_failure_time = None;
        }
    }

    pub fn record_failure(&self, host: &str) {
        let mut entry = self.hosts.entry(host.to_string()).or_insert_with(|| HostBreaker {
            state: State::Closed,
            failure_count: 0,
            last_failure_time: None,
        });

        entry.last_failure_time = Some(Instant::now());

        match entry.state {
            State::HalfOpen => {
                entry.state = State::Open;
            }
            State::Closed => {
                entry.failure_count += 1;
                if entry.failure_count >= self.failure_threshold {
                    entry.state = State::Open;
                }
            }
            State::Open => {}
        }
    }

    /// A failure per §4.F: status >= 500, status 429, or status 0
    /// (transport failure never completed).
    pub fn is_failure_status(status: u16) -> bool {
        status == 0 || status == 429 || status >= 500
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_threshold_failures() {
        let registry = CircuitBreakerRegistry::new(3, Duration::from_secs(60));
        assert!(registry.allow("flaky.example"));
        registry.record_failure("flaky.example");
        registry.record_failure("flaky.example");
        assert!(registry.allow("flaky.example"));
        registry.record_failure("flaky.example");
        assert!(!registry.allow("flaky.example"));
    }

    #[test]
    fn half_open_failure_reopens() {
        let registry = CircuitBreakerRegistry::new(1, Duration::from_millis(0));
        registry.record_failure("host");
        assert!(!registry.allow("host"));
        // recovery_timeout is zero, so the next `allow` call transitions to half-open.
        assert!(registry.allow("host"));
        registry.record_failure("host");
        assert!(!registry.allow("host"));
    }

    #[test]
    fn success_resets_counter() {
        let registry = CircuitBreakerRegistry::new(3, Duration::from_secs(60));
        registry.record_failure("host");
        registry.record_failure("host");
        registry.record_success("host");
        registry.record_failure("host");
        registry.record_failure("host");
        assert!(registry.allow("host"));
    }

    #[test]
    fn failure_status_classification() {
        assert!(CircuitBreakerRegistry::is_failure_status(0));
        assert!(CircuitBreakerRegistry::is_failure_status(429));
        assert!(CircuitBreakerRegistry::is_failure_status(503));
        assert!(!CircuitBreakerRegistry::is_failure_status(200));
        assert!(!CircuitBreakerRegistry::is_failure_status(404));
    }
}
