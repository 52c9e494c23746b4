//! Per-model call and rate-limit counters over a resetting window

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use insight_core::UsageSnapshot;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::clock::Clock;

#[derive(Debug)]
struct UsageWindow {
    per_model_calls: HashMap<String, u64>,
    per_model_rate_limits: HashMap<String, u64>,
    window_start: Instant,
}

#[derive(Debug)]
pub struct UsageTracker {
    reset_interval: Duration,
    clock: Arc<dyn Clock>,
    window: Mutex<UsageWindow>,
}

impl UsageTracker {
    pub fn new(reset_interval: Duration, clock: Arc<dyn Clock>) -> Self {
        let window_start = clock.now();
        Self {
            reset_interval,
            clock,
            window: Mutex::new(UsageWindow {
                per_model_calls: HashMap::new(),
                per_model_rate_limits: HashMap::new(),
                window_start,
            }),
        }
    }

    /// Clear all counters if the window has elapsed; returns whether it did
    pub fn reset_if_due(&self) -> bool {
        let now = self.clock.now();
        let mut window = self.window.lock();
        if now.saturating_duration_since(window.window_start) < self.reset_interval {
            return false;
        }

        window.per_model_calls.clear();
        window.per_model_rate_limits.clear();
        window.window_start = now;
        info!("API usage statistics reset");
        true
    }

    pub fn record_call(&self, model: &str) {
        let mut window = self.window.lock();
        let count = window.per_model_calls.entry(model.to_string()).or_insert(0);
        *count += 1;
        debug!("Model {} called {} times this window", model, count);
    }

    pub fn record_rate_limit(&self, model: &str) {
        let mut window = self.window.lock();
        *window
            .per_model_rate_limits
            .entry(model.to_string())
            .or_insert(0) += 1;
    }

    pub fn snapshot(&self) -> UsageSnapshot {
        let now = self.clock.now();
        let window = self.window.lock();
        let elapsed = now.saturating_duration_since(window.window_start);

        UsageSnapshot {
            total_calls: window.per_model_calls.values().sum(),
            rate_limit_count: window.per_model_rate_limits.values().sum(),
            per_model_calls: window.per_model_calls.clone(),
            per_model_rate_limits: window.per_model_rate_limits.clone(),
            next_reset_in_ms: self.reset_interval.saturating_sub(elapsed).as_millis() as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[test]
    fn test_counts_and_reset() {
        let clock = ManualClock::new();
        let tracker = UsageTracker::new(Duration::from_secs(3600), clock.clone());

        tracker.record_call("a");
        tracker.record_call("a");
        tracker.record_call("b");
        tracker.record_rate_limit("a");

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.total_calls, 3);
        assert_eq!(snapshot.rate_limit_count, 1);
        assert_eq!(snapshot.per_model_calls["a"], 2);
        assert_eq!(snapshot.next_reset_in_ms, 3_600_000);

        clock.advance(Duration::from_secs(1800));
        assert!(!tracker.reset_if_due());
        assert_eq!(tracker.snapshot().next_reset_in_ms, 1_800_000);

        clock.advance(Duration::from_secs(1800));
        assert!(tracker.reset_if_due());
        let snapshot = tracker.snapshot();
        assert_eq!(snapshot, UsageSnapshot {
            next_reset_in_ms: 3_600_000,
            ..Default::default()
        });
    }
}
