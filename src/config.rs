//! Configuration loading and startup wiring.
//!
//! Rule definitions are loaded once at process startup from a YAML file
//! and validated eagerly, so a bad limit or a malformed pattern fails the
//! process before it serves a single request. Wiring is explicit: the
//! embedding application passes concrete store and extractor instances,
//! no injection framework involved.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::admission::request::HttpMethod;
use crate::admission::AdmissionFilter;
use crate::error::{Result, TurnstileError};
use crate::rules::{CountingProtocol, HeaderKeyExtractor, PathPattern, RateLimitRule};
use crate::store::CounterStore;

/// Time unit for rule windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Second,
    Minute,
    Hour,
    Day,
}

impl TimeUnit {
    /// The duration of `amount` of this unit.
    pub fn duration(&self, amount: u64) -> Duration {
        let secs = match self {
            TimeUnit::Second => 1,
            TimeUnit::Minute => 60,
            TimeUnit::Hour => 3600,
            TimeUnit::Day => 86400,
        };
        Duration::from_secs(secs * amount)
    }
}

/// A complete filter configuration: an ordered list of rule definitions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterConfig {
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

/// Configuration for a single rate limit rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Ant-style URL pattern this rule applies to.
    pub pattern: String,
    /// HTTP method this rule applies to.
    pub method: HttpMethod,
    /// Maximum permitted calls per window. Must be positive.
    pub limit: u64,
    /// Window magnitude.
    pub window: u64,
    /// Window unit.
    pub unit: TimeUnit,
    /// Header the caller key is extracted from.
    pub key_header: String,
    /// Keys exempt from counting.
    #[serde(default)]
    pub whitelist: Vec<String>,
    /// Counting protocol; defaults to the atomic one.
    #[serde(default)]
    pub protocol: CountingProtocol,
}

impl FilterConfig {
    /// Create an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading admission filter configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: FilterConfig = serde_yaml::from_str(yaml)
            .map_err(|e| TurnstileError::Config(format!("Failed to parse rules config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every rule definition, failing on the first problem.
    pub fn validate(&self) -> Result<()> {
        for rule in &self.rules {
            PathPattern::parse(&rule.pattern)?;
            if rule.limit == 0 {
                return Err(TurnstileError::Config(format!(
                    "Rule {} has a non-positive limit",
                    rule.pattern
                )));
            }
            if rule.window == 0 {
                return Err(TurnstileError::Config(format!(
                    "Rule {} has a zero-length window",
                    rule.pattern
                )));
            }
            if rule.key_header.trim().is_empty() {
                return Err(TurnstileError::Config(format!(
                    "Rule {} has an empty key header",
                    rule.pattern
                )));
            }
        }
        Ok(())
    }
}

/// Build an admission filter from configuration, binding every rule to
/// the given counter store.
pub fn build_filter(
    config: &FilterConfig,
    store: Arc<dyn CounterStore>,
) -> Result<AdmissionFilter> {
    config.validate()?;

    let mut rules = Vec::with_capacity(config.rules.len());
    for rule_config in &config.rules {
        let pattern = PathPattern::parse(&rule_config.pattern)?;
        let window = rule_config.unit.duration(rule_config.window);
        let extractor = Arc::new(HeaderKeyExtractor::new(rule_config.key_header.clone()));

        let rule = RateLimitRule::new(
            pattern,
            rule_config.method,
            store.clone(),
            extractor,
            rule_config.limit,
            window,
        )
        .with_protocol(rule_config.protocol)
        .with_whitelist(rule_config.whitelist.iter().cloned());

        info!(
            pattern = %rule_config.pattern,
            method = %rule_config.method,
            limit = rule_config.limit,
            window = ?window,
            "Configured rate limit rule"
        );
        rules.push(Arc::new(rule));
    }

    Ok(AdmissionFilter::new(rules))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::request::RequestParts;
    use crate::admission::AdmissionOutcome;
    use crate::store::LocalCounterStore;

    const SAMPLE: &str = r#"
rules:
  - pattern: /api/sms/*
    method: POST
    limit: 3
    window: 10
    unit: second
    key_header: X-Client-Id
    whitelist:
      - internal
  - pattern: /api/**
    method: GET
    limit: 100
    window: 1
    unit: minute
    key_header: X-Client-Id
    protocol: legacy
"#;

    #[test]
    fn test_parse_sample_config() {
        let config = FilterConfig::from_yaml(SAMPLE).unwrap();

        assert_eq!(config.rules.len(), 2);
        assert_eq!(config.rules[0].method, HttpMethod::Post);
        assert_eq!(config.rules[0].whitelist, vec!["internal".to_string()]);
        assert_eq!(config.rules[0].protocol, CountingProtocol::AtomicTtl);
        assert_eq!(config.rules[1].protocol, CountingProtocol::Legacy);
        assert_eq!(config.rules[1].unit, TimeUnit::Minute);
    }

    #[test]
    fn test_time_unit_durations() {
        assert_eq!(TimeUnit::Second.duration(10), Duration::from_secs(10));
        assert_eq!(TimeUnit::Minute.duration(2), Duration::from_secs(120));
        assert_eq!(TimeUnit::Hour.duration(1), Duration::from_secs(3600));
        assert_eq!(TimeUnit::Day.duration(1), Duration::from_secs(86400));
    }

    #[test]
    fn test_zero_limit_fails_validation() {
        let yaml = r#"
rules:
  - pattern: /api/*
    method: GET
    limit: 0
    window: 10
    unit: second
    key_header: X-Client-Id
"#;
        assert!(matches!(
            FilterConfig::from_yaml(yaml),
            Err(TurnstileError::Config(_))
        ));
    }

    #[test]
    fn test_malformed_pattern_fails_validation() {
        let yaml = r#"
rules:
  - pattern: api/no-leading-slash
    method: GET
    limit: 5
    window: 10
    unit: second
    key_header: X-Client-Id
"#;
        assert!(matches!(
            FilterConfig::from_yaml(yaml),
            Err(TurnstileError::Config(_))
        ));
    }

    #[test]
    fn test_unknown_method_fails_parse() {
        let yaml = r#"
rules:
  - pattern: /api/*
    method: FETCH
    limit: 5
    window: 10
    unit: second
    key_header: X-Client-Id
"#;
        assert!(FilterConfig::from_yaml(yaml).is_err());
    }

    #[tokio::test]
    async fn test_build_filter_wires_rules() {
        let config = FilterConfig::from_yaml(SAMPLE).unwrap();
        let store = Arc::new(LocalCounterStore::new());
        let filter = build_filter(&config, store).unwrap();

        assert_eq!(filter.rules().len(), 2);

        // The configured whitelist is live.
        let req = RequestParts::new(HttpMethod::Post, "/api/sms/send")
            .with_header("X-Client-Id", "internal");
        for _ in 0..10 {
            assert_eq!(filter.admit(&req).await, AdmissionOutcome::Forwarded);
        }

        // A counted caller trips the limit of 3.
        let req = RequestParts::new(HttpMethod::Post, "/api/sms/send")
            .with_header("X-Client-Id", "abc");
        for _ in 0..3 {
            assert_eq!(filter.admit(&req).await, AdmissionOutcome::Forwarded);
        }
        assert!(matches!(
            filter.admit(&req).await,
            AdmissionOutcome::Rejected { .. }
        ));
    }
}
