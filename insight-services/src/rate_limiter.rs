//! Global throttle for outbound model calls
//!
//! Enforces a minimum spacing between calls that is shared by every caller
//! of one invoker, whatever their concurrency.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;
use tracing::debug;

use crate::clock::Clock;

/// Rate limiter that spaces requests at least `min_interval` apart
///
/// ## Reservation-Based Scheduling
///
/// Each caller reserves the next free slot while holding the lock and only
/// then sleeps, so concurrent callers always get distinct slots.
#[derive(Debug)]
pub struct RateLimiter {
    /// Earliest instant the next request may start
    next_available: Mutex<Option<Instant>>,
    min_interval: Duration,
    name: String,
    clock: Arc<dyn Clock>,
    total_requests: AtomicU64,
    waited_requests: AtomicU64,
}

impl RateLimiter {
    pub fn new(min_interval: Duration, name: &str, clock: Arc<dyn Clock>) -> Self {
        Self {
            next_available: Mutex::new(None),
            min_interval,
            name: name.to_string(),
            clock,
            total_requests: AtomicU64::new(0),
            waited_requests: AtomicU64::new(0),
        }
    }

    /// Reserve a slot and wait for it
    pub async fn acquire(&self) {
        let request_num = self.total_requests.fetch_add(1, Ordering::Relaxed) + 1;

        let wait = {
            let now = self.clock.now();
            let mut next_available = self.next_available.lock();

            let slot = match *next_available {
                Some(next) if next > now => next,
                _ => now,
            };
            *next_available = Some(slot + self.min_interval);
            slot.saturating_duration_since(now)
        };

        if wait.is_zero() {
            debug!("[THROTTLE:{}] #{} immediate", self.name, request_num);
            return;
        }

        self.waited_requests.fetch_add(1, Ordering::Relaxed);
        debug!(
            "[THROTTLE:{}] #{} queued, waiting {:?}",
            self.name, request_num, wait
        );
        self.clock.sleep(wait).await;
    }

    /// Whether a request issued now would proceed without waiting
    pub fn can_acquire_immediately(&self) -> bool {
        match *self.next_available.lock() {
            Some(next) => self.clock.now() >= next,
            None => true,
        }
    }

    pub fn stats(&self) -> RateLimiterStats {
        RateLimiterStats {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            waited_requests: self.waited_requests.load(Ordering::Relaxed),
            min_interval_ms: self.min_interval.as_millis() as u64,
            ready: self.can_acquire_immediately(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimiterStats {
    pub total_requests: u64,
    pub waited_requests: u64,
    pub min_interval_ms: u64,
    /// Whether a call issued now would go out without waiting
    pub ready: bool,
}
