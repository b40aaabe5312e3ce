//! Rate limit rules: matching, key extraction, and limit checks.

mod extract;
mod pattern;
mod rule;

pub use extract::{HeaderKeyExtractor, KeyExtractor};
pub use pattern::PathPattern;
pub use rule::{CountingProtocol, Decision, RateLimitRule, CALL_LIMITER_PREFIX};
