//! Counter stores: per-key call counts with expiring windows.

mod local;
mod remote;

pub use local::LocalCounterStore;
pub use remote::{AtomicKv, MemoryKv, RemoteCounterStore};

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// Trait for counter store implementations.
///
/// This trait abstracts over the local `LocalCounterStore` and the
/// `RemoteCounterStore` so rules can count against either. Counts are
/// monotonic within a window; an entry whose expiry has passed restarts
/// at 1 on the next increment.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically increase the count for `key` by one and return the new
    /// value. A fresh or expired entry restarts at 1; concurrent callers
    /// on the same key must observe distinct counts.
    async fn increment(&self, key: &str) -> Result<u64>;

    /// Set the expiry for `key` to now + `window`. Calling this on a key
    /// that does not exist is a no-op from the caller's perspective.
    async fn expire(&self, key: &str, window: Duration) -> Result<()>;

    /// Atomically increment `key`, establishing the window expiry only
    /// when the entry is created (or recreated after expiry), as one
    /// indivisible step.
    ///
    /// This is the preferred counting operation. The two-step
    /// `increment` + `expire` sequence is kept for compatibility with
    /// deployments whose other clients still use it, but it leaves a gap
    /// between the first increment and the expiry landing.
    async fn increment_with_ttl(&self, key: &str, window: Duration) -> Result<u64>;
}
