//! Rate limit rules: matcher, limit, window, and the check sequence.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{error, trace, warn};

use super::extract::KeyExtractor;
use super::pattern::PathPattern;
use crate::admission::request::{HttpMethod, InboundRequest};
use crate::store::CounterStore;

/// Namespace prefix for counter keys. Preserved on the wire so multiple
/// deployments sharing one backing store count against the same entries.
pub const CALL_LIMITER_PREFIX: &str = "CALL_LIMITER_";

/// How a rule drives the counter store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountingProtocol {
    /// One atomic increment that binds the window TTL to entry creation.
    AtomicTtl,
    /// Increment, then set the expiry when the count comes back 1.
    /// Compatible with existing clients of a shared store, but the expiry
    /// is a separate step and can be lost on a remote backend.
    Legacy,
}

impl Default for CountingProtocol {
    fn default() -> Self {
        CountingProtocol::AtomicTtl
    }
}

/// Outcome of a rule's call-limit check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Within limit, whitelisted, or fail-open.
    Allowed,
    /// Over limit; carries the composite counter key for observability.
    Rejected { key: String },
}

/// A rate limit rule: a request matcher bound to a counter store, a key
/// extractor, a limit, and a fixed window.
pub struct RateLimitRule {
    pattern: PathPattern,
    method: HttpMethod,
    store: Arc<dyn CounterStore>,
    extractor: Arc<dyn KeyExtractor>,
    limit: u64,
    window: Duration,
    protocol: CountingProtocol,
    /// Keys exempt from counting. Read on every check, written only by
    /// administrative overrides.
    whitelist: RwLock<HashSet<String>>,
}

impl RateLimitRule {
    /// Create a rule with the atomic counting protocol and an empty
    /// whitelist.
    pub fn new(
        pattern: PathPattern,
        method: HttpMethod,
        store: Arc<dyn CounterStore>,
        extractor: Arc<dyn KeyExtractor>,
        limit: u64,
        window: Duration,
    ) -> Self {
        Self {
            pattern,
            method,
            store,
            extractor,
            limit,
            window,
            protocol: CountingProtocol::default(),
            whitelist: RwLock::new(HashSet::new()),
        }
    }

    /// Select the counting protocol.
    pub fn with_protocol(mut self, protocol: CountingProtocol) -> Self {
        self.protocol = protocol;
        self
    }

    /// Seed the whitelist.
    pub fn with_whitelist<I, S>(self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        {
            let mut whitelist = self.whitelist.write();
            whitelist.extend(keys.into_iter().map(Into::into));
        }
        self
    }

    /// The path pattern.
    pub fn pattern(&self) -> &PathPattern {
        &self.pattern
    }

    /// The HTTP method this rule applies to.
    pub fn method(&self) -> HttpMethod {
        self.method
    }

    /// Maximum permitted calls per window.
    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// The fixed-window length.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Whether a key is currently exempt from counting.
    pub fn is_whitelisted(&self, key: &str) -> bool {
        self.whitelist.read().contains(key)
    }

    /// Exempt a key from counting at runtime.
    pub fn allow_key(&self, key: impl Into<String>) {
        self.whitelist.write().insert(key.into());
    }

    /// Remove a runtime exemption.
    pub fn revoke_key(&self, key: &str) {
        self.whitelist.write().remove(key);
    }

    /// Whether the request's method and path satisfy this rule's matcher.
    pub fn matches(&self, request: &dyn InboundRequest) -> bool {
        self.method == request.method() && self.pattern.matches(request.path())
    }

    /// Run the call-limit check for a matching request.
    ///
    /// Fail-open by policy: an unidentifiable caller and a store fault
    /// both allow the request, since admission control must never become
    /// a point of total outage.
    pub async fn check_call_limit(&self, request: &dyn InboundRequest) -> Decision {
        let Some(key) = self.extractor.extract(request) else {
            warn!(
                pattern = %self.pattern,
                path = %request.path(),
                "No rate limit key for request, allowing"
            );
            return Decision::Allowed;
        };

        if self.is_whitelisted(&key) {
            trace!(key = %key, pattern = %self.pattern, "Key is whitelisted");
            return Decision::Allowed;
        }

        let composite = self.composite_key(&key);
        let count = match self.count(&composite).await {
            Ok(count) => count,
            Err(e) => {
                error!(
                    key = %composite,
                    error = %e,
                    "Counter store unavailable, allowing request"
                );
                return Decision::Allowed;
            }
        };

        if count > self.limit {
            warn!(
                key = %composite,
                count = count,
                limit = self.limit,
                "Call limit exceeded"
            );
            Decision::Rejected { key: composite }
        } else {
            trace!(key = %composite, count = count, limit = self.limit, "Call within limit");
            Decision::Allowed
        }
    }

    /// Build the composite store key for an extracted caller key.
    pub fn composite_key(&self, key: &str) -> String {
        format!("{}{}@{}", CALL_LIMITER_PREFIX, key, self.pattern.id())
    }

    async fn count(&self, composite: &str) -> crate::error::Result<u64> {
        match self.protocol {
            CountingProtocol::AtomicTtl => {
                self.store.increment_with_ttl(composite, self.window).await
            }
            CountingProtocol::Legacy => {
                let count = self.store.increment(composite).await?;
                if count == 1 {
                    self.store.expire(composite, self.window).await?;
                }
                Ok(count)
            }
        }
    }
}
