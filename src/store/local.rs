//! In-process counter store.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, trace};

use super::CounterStore;
use crate::error::Result;

/// A single counter entry: the count within the active window and the
/// instant after which the entry is considered stale.
#[derive(Debug, Clone)]
struct CounterEntry {
    count: u64,
    /// `None` until an expiry is set. An entry without an expiry never
    /// times out; the legacy protocol relies on the caller's `expire`
    /// landing after the first increment.
    expires_at: Option<Instant>,
}

impl CounterEntry {
    fn fresh() -> Self {
        Self {
            count: 0,
            expires_at: None,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(deadline) if deadline <= now)
    }
}

/// An in-process counter store.
///
/// Counts are visible only within this process. Per-key atomicity comes
/// from the map's shard locking: the expiry check, reset, and increment
/// for a key happen under one exclusive entry guard, so two tasks can
/// never interleave in a way that loses an increment.
pub struct LocalCounterStore {
    entries: DashMap<String, CounterEntry>,
}

impl LocalCounterStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Get the live count for a key, if a non-expired entry exists.
    pub fn peek(&self, key: &str) -> Option<u64> {
        let entry = self.entries.get(key)?;
        if entry.is_expired(Instant::now()) {
            None
        } else {
            Some(entry.count)
        }
    }

    /// Number of entries currently held, expired or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove entries whose expiry has passed.
    ///
    /// Entries that never received an expiry are left in place: deleting
    /// them would silently reset a live counter. Returns the number of
    /// entries evicted.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        let evicted = before - self.entries.len();
        if evicted > 0 {
            debug!(evicted = evicted, "Swept expired counter entries");
        }
        evicted
    }

    /// Spawn a background task that sweeps expired entries on a fixed
    /// interval. Not required for correctness, only for bounded memory
    /// under high caller cardinality.
    pub fn spawn_sweeper(self: Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let store = self;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                store.sweep();
            }
        })
    }
}

impl Default for LocalCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CounterStore for LocalCounterStore {
    async fn increment(&self, key: &str) -> Result<u64> {
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(CounterEntry::fresh);

        if entry.is_expired(Instant::now()) {
            *entry = CounterEntry::fresh();
        }
        entry.count += 1;

        trace!(key = %key, count = entry.count, "Incremented counter");
        Ok(entry.count)
    }

    async fn expire(&self, key: &str, window: Duration) -> Result<()> {
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.expires_at = Some(Instant::now() + window);
            trace!(key = %key, window = ?window, "Set counter expiry");
        }
        Ok(())
    }

    async fn increment_with_ttl(&self, key: &str, window: Duration) -> Result<u64> {
        let now = Instant::now();
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(CounterEntry::fresh);

        if entry.is_expired(now) {
            *entry = CounterEntry::fresh();
        }
        entry.count += 1;
        if entry.count == 1 {
            entry.expires_at = Some(now + window);
        }

        trace!(key = %key, count = entry.count, "Incremented counter with TTL");
        Ok(entry.count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_increment_starts_at_one() {
        let store = LocalCounterStore::new();

        assert_eq!(store.increment("key").await.unwrap(), 1);
        assert_eq!(store.increment("key").await.unwrap(), 2);
        assert_eq!(store.increment("key").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let store = LocalCounterStore::new();

        store.increment("a").await.unwrap();
        store.increment("a").await.unwrap();
        store.increment("b").await.unwrap();

        assert_eq!(store.peek("a"), Some(2));
        assert_eq!(store.peek("b"), Some(1));
    }

    #[tokio::test]
    async fn test_expire_on_missing_key_is_noop() {
        let store = LocalCounterStore::new();

        store.expire("missing", Duration::from_secs(1)).await.unwrap();

        assert!(store.is_empty());
        assert_eq!(store.increment("missing").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_expired_entry_restarts_at_one() {
        let store = LocalCounterStore::new();

        store.increment("key").await.unwrap();
        store.increment("key").await.unwrap();
        store.expire("key", Duration::from_millis(50)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(store.peek("key"), None);
        assert_eq!(store.increment("key").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_entry_without_expiry_never_resets() {
        let store = LocalCounterStore::new();

        store.increment("key").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(store.increment("key").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_increment_with_ttl_sets_expiry_only_on_creation() {
        let store = LocalCounterStore::new();
        let window = Duration::from_millis(250);

        assert_eq!(store.increment_with_ttl("key", window).await.unwrap(), 1);
        tokio::time::sleep(Duration::from_millis(100)).await;

        // Second increment must not push the deadline out.
        assert_eq!(store.increment_with_ttl("key", window).await.unwrap(), 2);
        tokio::time::sleep(Duration::from_millis(300)).await;

        // Past the original deadline the window restarts.
        assert_eq!(store.increment_with_ttl("key", window).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_increments_yield_distinct_counts() {
        const TASKS: u64 = 64;

        let store = Arc::new(LocalCounterStore::new());

        let handles: Vec<_> = (0..TASKS)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.increment("shared").await.unwrap() })
            })
            .collect();

        let mut counts: Vec<u64> = futures::future::join_all(handles)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();
        counts.sort_unstable();

        let expected: Vec<u64> = (1..=TASKS).collect();
        assert_eq!(counts, expected);
    }

    #[tokio::test]
    async fn test_sweep_evicts_only_expired_entries() {
        let store = LocalCounterStore::new();

        store.increment("stale").await.unwrap();
        store.expire("stale", Duration::from_millis(20)).await.unwrap();
        store.increment("live").await.unwrap();
        store.expire("live", Duration::from_secs(60)).await.unwrap();
        store.increment("no_expiry").await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(store.sweep(), 1);
        assert_eq!(store.len(), 2);
        assert_eq!(store.peek("live"), Some(1));
        assert_eq!(store.peek("no_expiry"), Some(1));
    }

    #[tokio::test]
    async fn test_sweeper_task_evicts_in_background() {
        let store = Arc::new(LocalCounterStore::new());

        store.increment("stale").await.unwrap();
        store.expire("stale", Duration::from_millis(20)).await.unwrap();

        let handle = store.clone().spawn_sweeper(Duration::from_millis(30));
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(store.is_empty());
        handle.abort();
    }
}
