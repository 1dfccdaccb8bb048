use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Per-host state tracked by the pacer.
struct HostState {
    current_delay: Duration,
    last_request_time: Option<Instant>,
}

/// Adaptive per-host delay controller. Widens the delay on server distress
/// signals (429/5xx family) and narrows it back toward the base delay on
/// clean responses, bounded by `[min_delay, max_delay]`.
pub struct Pacer {
    base_delay: Duration,
    min_delay: Duration,
    max_delay: Duration,
    increase_factor: f64,
    decrease_factor: f64,
    adaptive: bool,
    hosts: DashMap<String, HostState>,
}

impl Pacer {
    pub fn new(
        base_delay: Duration,
        min_delay: Duration,
        max_delay: Duration,
        increase_factor: f64,
        decrease_factor: f64,
        adaptive: bool,
    ) -> Self {
        Self {
            base_delay,
            min_delay,
            max_delay,
            increase_factor,
            decrease_factor,
            adaptive,
            hosts: DashMap::new(),
        }
    }

    /// Sleeps until this host's minimum spacing (pacer delay vs. any
    /// robots-advertised crawl-delay, whichever is larger) has elapsed.
    pub async fn wait(&self, host: &str, robots_crawl_delay: Option<Duration>) {
        let required = {
            let mut entry = self.hosts.entry(host.to_string()).or_insert_with(|| HostState {
                current_delay: self.base_delay,
                last_request_time: None,
            });
            let floor = robots_crawl_delay.unwrap_or(Duration::ZERO).max(entry.current_delay);
            let required_at = entry.last_request_time.map(|t| t + floor);
            entry.last_request_time = Some(Instant::now());
            required_at
        };

        if let Some(required_at) = required {
            let now = Instant::now();
            if required_at > now {
                tokio::time::sleep(required_at - now).await;
            }
        }
    }

    pub fn record_response(&self, host: &str, status: u16) {
        if !self.adaptive {
            return;
        }
        let mut entry = self.hosts.entry(host.to_string()).or_insert_with(|| HostState {
            current_delay: self.base_delay,
            last_request_time: None,
        });

        match status {
            429 | 502 | 503 | 504 => {
                let widened = entry.current_delay.mul_f64(self.increase_factor * 2.0);
                entry.current_delay = widened.min(self.max_delay);
            }
            408 | 420 | 423 | 451 => {
                let widened = entry.current_delay.mul_f64(self.increase_factor);
                entry.current_delay = widened.min(self.max_delay);
            }
            200 | 304 if entry.current_delay > self.base_delay => {
                let narrowed = entry.current_delay.mul_f64(self.decrease_factor);
                entry.current_delay = narrowed.max(self.base_delay).max(self.min_delay);
            }
            _ => {}
        }
    }

    pub fn current_delay(&self, host: &str) -> Duration {
        self.hosts
            .get(host)
            .map(|e| e.current_delay)
            .unwrap_or(self.base_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widens_on_429_and_narrows_on_200() {
        let pacer = Pacer::new(
            Duration::from_millis(100),
            Duration::from_millis(50),
            Duration::from_secs(5),
            1.5,
            0.9,
            true,
        );
        pacer.record_response("example.com", 429);
        let widened = pacer.current_delay("example.com");
        assert!(widened > Duration::from_millis(100));

        // Repeated clean responses narrow it back down.
        for _ in 0..20 {
            pacer.record_response("example.com", 200);
        }
        let narrowed = pacer.current_delay("example.com");
        assert!(narrowed <= widened);
        assert!(narrowed >= Duration::from_millis(100));
    }

    #[test]
    fn never_exceeds_max_delay() {
        let pacer = Pacer::new(
            Duration::from_millis(100),
            Duration::from_millis(50),
            Duration::from_millis(500),
            2.0,
            0.9,
            true,
        );
        for _ in 0..10 {
            pacer.record_response("slow.example", 503);
        }
        assert!(pacer.current_delay("slow.example") <= Duration::from_millis(500));
    }
}
