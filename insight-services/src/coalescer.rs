//! Best-effort coalescing of identical in-flight requests
//!
//! The first caller for a hash registers it; later callers wait (bounded)
//! for the registration to clear, then run anyway. Registrations are released
//! by dropping the returned guard, so every exit path clears them.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tokio::sync::watch;
use tracing::debug;

use crate::clock::Clock;

#[derive(Debug)]
struct Pending {
    /// Dropped on release, which wakes every subscribed waiter
    release: watch::Sender<()>,
    /// Callers currently executing under this hash
    holders: usize,
}

impl Pending {
    fn new() -> Self {
        let (release, _) = watch::channel(());
        Self { release, holders: 1 }
    }
}

#[derive(Debug)]
pub struct RequestCoalescer {
    wait: Duration,
    clock: Arc<dyn Clock>,
    pending: Mutex<HashMap<String, Pending>>,
}

/// Hash identifying a request for coalescing
pub fn request_hash(prompt: &str, preferred_model: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    hasher.update(preferred_model.unwrap_or("").as_bytes());
    hex::encode(hasher.finalize())
}

impl RequestCoalescer {
    pub fn new(wait: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            wait,
            clock,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Register `hash`, waiting up to the configured bound for an in-flight
    /// request with the same hash to finish first
    pub async fn acquire(&self, hash: &str) -> CoalesceGuard<'_> {
        let deadline = self.clock.now() + self.wait;

        loop {
            let now = self.clock.now();
            let expired = now >= deadline;
            let mut waiter = {
                let mut pending = self.pending.lock();
                match pending.get_mut(hash) {
                    None => {
                        pending.insert(hash.to_string(), Pending::new());
                        break;
                    }
                    Some(entry) if expired => {
                        entry.holders += 1;
                        debug!("Coalescing wait expired for {}, proceeding", short(hash));
                        break;
                    }
                    Some(entry) => entry.release.subscribe(),
                }
            };

            debug!("Identical request in flight for {}, waiting", short(hash));
            // Release drops the sender, so `changed` resolves with Err
            tokio::select! {
                _ = waiter.changed() => {}
                _ = self.clock.sleep(deadline.saturating_duration_since(now)) => {}
            }
        }

        CoalesceGuard {
            coalescer: self,
            hash: hash.to_string(),
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    fn release(&self, hash: &str) {
        let mut pending = self.pending.lock();
        if let Some(entry) = pending.get_mut(hash) {
            entry.holders = entry.holders.saturating_sub(1);
            if entry.holders == 0 {
                pending.remove(hash);
            }
        }
    }
}

/// Holds a coalescing registration until dropped
#[derive(Debug)]
pub struct CoalesceGuard<'a> {
    coalescer: &'a RequestCoalescer,
    hash: String,
}

impl Drop for CoalesceGuard<'_> {
    fn drop(&mut self) {
        self.coalescer.release(&self.hash);
    }
}

fn short(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}

#[cfg(test)]
mod tests {
    use tokio::time::Instant;

    use super::*;
    use crate::clock::{ManualClock, TokioClock};

    fn coalescer() -> RequestCoalescer {
        RequestCoalescer::new(Duration::from_secs(5), TokioClock::shared())
    }

    #[test]
    fn test_request_hash_includes_model() {
        let a = request_hash("prompt", Some("gemini-2.5-flash"));
        let b = request_hash("prompt", None);
        assert_ne!(a, b);
        assert_eq!(a, request_hash("prompt", Some("gemini-2.5-flash")));
        assert_eq!(a.len(), 64);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiter_released_on_drop() {
        let coalescer = Arc::new(coalescer());
        let guard = coalescer.acquire("h").await;
        assert_eq!(coalescer.pending_count(), 1);

        let waiter = {
            let coalescer = Arc::clone(&coalescer);
            tokio::spawn(async move {
                let start = Instant::now();
                let _guard = coalescer.acquire("h").await;
                start.elapsed()
            })
        };

        tokio::time::sleep(Duration::from_secs(1)).await;
        drop(guard);

        let waited = waiter.await.unwrap();
        assert!(waited >= Duration::from_secs(1));
        assert!(waited < Duration::from_secs(5));
        assert_eq!(coalescer.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_wait_then_proceeds() {
        let coalescer = coalescer();
        let first = coalescer.acquire("h").await;

        let start = Instant::now();
        let second = coalescer.acquire("h").await;
        assert_eq!(start.elapsed(), Duration::from_secs(5));

        // Both holders must release before the entry clears
        drop(first);
        assert_eq!(coalescer.pending_count(), 1);
        drop(second);
        assert_eq!(coalescer.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_distinct_hashes_do_not_wait() {
        let coalescer = coalescer();
        let _a = coalescer.acquire("a").await;
        let _b = coalescer.acquire("b").await;
        assert_eq!(coalescer.pending_count(), 2);
    }

    #[tokio::test]
    async fn test_wait_is_measured_on_injected_clock() {
        let clock = ManualClock::new();
        let coalescer = RequestCoalescer::new(Duration::from_secs(5), clock.clone());
        let _first = coalescer.acquire("h").await;

        let _second = coalescer.acquire("h").await;
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(5)]);
        assert_eq!(coalescer.pending_count(), 1);
    }
}
