//! Refresh-if-stale cache cell
//!
//! Holds a value together with the instant it was fetched. Staleness is
//! only acted on when a caller explicitly asks via [`CacheCell::refresh_if_stale`]
//! or [`CacheCell::store`]; there is no background task and no implicit
//! module-level state.

use parking_lot::RwLock;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

struct Slot<T> {
    value: Arc<T>,
    fetched_at: Instant,
}

/// A value plus its fetch timestamp, refreshed on demand
pub struct CacheCell<T> {
    slot: RwLock<Slot<T>>,
    ttl: Duration,
}

impl<T> CacheCell<T> {
    pub fn new(initial: T, ttl: Duration) -> Self {
        Self {
            slot: RwLock::new(Slot {
                value: Arc::new(initial),
                fetched_at: Instant::now(),
            }),
            ttl,
        }
    }

    /// Current value, regardless of age
    pub fn get(&self) -> Arc<T> {
        self.slot.read().value.clone()
    }

    /// Age of the cached value
    pub fn age(&self) -> Duration {
        self.slot.read().fetched_at.elapsed()
    }

    pub fn is_stale(&self) -> bool {
        self.age() >= self.ttl
    }

    /// Replace the value and reset the fetch timestamp
    pub fn store(&self, value: T) {
        let mut slot = self.slot.write();
        slot.value = Arc::new(value);
        slot.fetched_at = Instant::now();
    }

    /// Run `fetch` and store its result only when the value has expired.
    ///
    /// Returns whether a refresh happened. On fetch failure the stale value
    /// stays in place and the error is returned to the caller. Two callers
    /// racing past the staleness check may both fetch; last write wins.
    pub async fn refresh_if_stale<F, Fut, E>(&self, fetch: F) -> Result<bool, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.is_stale() {
            return Ok(false);
        }
        let value = fetch().await?;
        self.store(value);
        tracing::debug!(ttl_secs = self.ttl.as_secs(), "cache cell refreshed");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fresh_value_not_refetched() {
        let cell = CacheCell::new(1u32, Duration::from_secs(60));
        let refreshed = cell
            .refresh_if_stale(|| async { Ok::<_, ()>(2) })
            .await
            .unwrap();
        assert!(!refreshed);
        assert_eq!(*cell.get(), 1);
    }

    #[tokio::test]
    async fn test_stale_value_refetched() {
        let cell = CacheCell::new(1u32, Duration::from_millis(0));
        let refreshed = cell
            .refresh_if_stale(|| async { Ok::<_, ()>(2) })
            .await
            .unwrap();
        assert!(refreshed);
        assert_eq!(*cell.get(), 2);
    }

    #[tokio::test]
    async fn test_failed_fetch_keeps_stale_value() {
        let cell = CacheCell::new(1u32, Duration::from_millis(0));
        let result = cell.refresh_if_stale(|| async { Err::<u32, _>("down") }).await;
        assert_eq!(result, Err("down"));
        assert_eq!(*cell.get(), 1);
    }

    #[test]
    fn test_store_resets_age() {
        let cell = CacheCell::new(1u32, Duration::from_secs(60));
        cell.store(5);
        assert!(!cell.is_stale());
        assert_eq!(*cell.get(), 5);
    }
}
