//! Counter store backed by a shared atomic key-value service.
//!
//! The backing service is opaque to this crate: anything exposing an
//! atomic increment and a TTL can enforce one global rate across many
//! process instances. The `AtomicKv` trait is that boundary; deployments
//! supply a client for their store, tests use the in-process `MemoryKv`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::trace;

use super::CounterStore;
use crate::error::{Result, TurnstileError};

/// Client boundary for the external atomic key-value counter service.
///
/// Implementations must guarantee that `incr` is atomic with respect to
/// concurrent callers on the same key across every process sharing the
/// service. `incr_with_ttl` must additionally bind the TTL to entry
/// creation in the same indivisible step (a server-side scripted
/// transaction in most stores).
#[async_trait]
pub trait AtomicKv: Send + Sync {
    /// Atomically increment `key` by one, creating it at 1 if absent or
    /// expired, and return the new value.
    async fn incr(&self, key: &str) -> Result<u64>;

    /// Set the time-to-live for `key`. Implementations may create a
    /// zero-count placeholder for a missing key.
    async fn pexpire(&self, key: &str, ttl: Duration) -> Result<()>;

    /// Atomically increment `key`, setting `ttl` only when the entry is
    /// created, as one server-side step.
    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> Result<u64>;
}

/// A counter store that delegates to a shared [`AtomicKv`] service.
///
/// Every round-trip is bounded by `op_timeout` so a slow or partitioned
/// backend cannot stall request admission; callers convert the resulting
/// error into an allow decision at the rule boundary.
pub struct RemoteCounterStore {
    kv: Arc<dyn AtomicKv>,
    op_timeout: Duration,
}

/// Default bound on a single backend round-trip.
const DEFAULT_OP_TIMEOUT: Duration = Duration::from_millis(250);

impl RemoteCounterStore {
    /// Create a store over the given client with the default timeout.
    pub fn new(kv: Arc<dyn AtomicKv>) -> Self {
        Self::with_timeout(kv, DEFAULT_OP_TIMEOUT)
    }

    /// Create a store over the given client with an explicit per-call
    /// timeout.
    pub fn with_timeout(kv: Arc<dyn AtomicKv>, op_timeout: Duration) -> Self {
        Self { kv, op_timeout }
    }

    async fn bounded<T>(
        &self,
        op: &'static str,
        fut: impl std::future::Future<Output = Result<T>> + Send,
    ) -> Result<T> {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(TurnstileError::Store(format!(
                "{} timed out after {:?}",
                op, self.op_timeout
            ))),
        }
    }
}

#[async_trait]
impl CounterStore for RemoteCounterStore {
    async fn increment(&self, key: &str) -> Result<u64> {
        let count = self.bounded("incr", self.kv.incr(key)).await?;
        trace!(key = %key, count = count, "Incremented remote counter");
        Ok(count)
    }

    async fn expire(&self, key: &str, window: Duration) -> Result<()> {
        self.bounded("pexpire", self.kv.pexpire(key, window)).await
    }

    async fn increment_with_ttl(&self, key: &str, window: Duration) -> Result<u64> {
        let count = self
            .bounded("incr_with_ttl", self.kv.incr_with_ttl(key, window))
            .await?;
        trace!(key = %key, count = count, "Incremented remote counter with TTL");
        Ok(count)
    }
}

/// Entry state held by [`MemoryKv`].
#[derive(Debug, Clone)]
struct KvEntry {
    count: u64,
    deadline: Option<Instant>,
}

impl KvEntry {
    fn is_expired(&self, now: Instant) -> bool {
        matches!(self.deadline, Some(deadline) if deadline <= now)
    }
}

/// In-process [`AtomicKv`] implementation.
///
/// Backs tests and single-node deployments that want the remote wire
/// semantics without an external service. All operations on the map run
/// under one async mutex, which stands in for the backing service's
/// server-side atomicity.
pub struct MemoryKv {
    entries: Mutex<HashMap<String, KvEntry>>,
}

impl MemoryKv {
    /// Create an empty service.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Get the live count for a key, if a non-expired entry exists.
    pub async fn get(&self, key: &str) -> Option<u64> {
        let entries = self.entries.lock().await;
        let entry = entries.get(key)?;
        if entry.is_expired(Instant::now()) {
            None
        } else {
            Some(entry.count)
        }
    }
}

impl Default for MemoryKv {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AtomicKv for MemoryKv {
    async fn incr(&self, key: &str) -> Result<u64> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let entry = entries.entry(key.to_string()).or_insert(KvEntry {
            count: 0,
            deadline: None,
        });

        if entry.is_expired(now) {
            entry.count = 0;
            entry.deadline = None;
        }
        entry.count += 1;
        Ok(entry.count)
    }

    async fn pexpire(&self, key: &str, ttl: Duration) -> Result<()> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let entry = entries.entry(key.to_string()).or_insert(KvEntry {
            count: 0,
            deadline: None,
        });
        entry.deadline = Some(now + ttl);
        Ok(())
    }

    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> Result<u64> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let entry = entries.entry(key.to_string()).or_insert(KvEntry {
            count: 0,
            deadline: None,
        });

        if entry.is_expired(now) {
            entry.count = 0;
            entry.deadline = None;
        }
        entry.count += 1;
        if entry.count == 1 {
            entry.deadline = Some(now + ttl);
        }
        Ok(entry.count)
    }
}
