//! Per-model cooldown registry
//!
//! A model that fails is excluded from candidate lists until its window
//! passes. Expired entries are evicted when read.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::clock::Clock;

#[derive(Debug)]
pub struct CooldownRegistry {
    window: Duration,
    clock: Arc<dyn Clock>,
    failures: Mutex<HashMap<String, Instant>>,
}

impl CooldownRegistry {
    pub fn new(window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            window,
            clock,
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Record a failure now, restarting the model's window
    pub fn mark(&self, model: &str) {
        let now = self.clock.now();
        self.failures.lock().insert(model.to_string(), now);
    }

    pub fn is_cooling_down(&self, model: &str) -> bool {
        self.remaining(model).is_some()
    }

    /// Time left in the model's window, `None` when eligible
    pub fn remaining(&self, model: &str) -> Option<Duration> {
        let now = self.clock.now();
        let mut failures = self.failures.lock();

        let failed_at = *failures.get(model)?;
        let elapsed = now.saturating_duration_since(failed_at);
        if elapsed >= self.window {
            failures.remove(model);
            return None;
        }
        Some(self.window - elapsed)
    }
}
