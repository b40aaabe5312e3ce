//! The admission filter: the request-processing entry point.

use std::sync::Arc;

use tracing::debug;

use super::request::{InboundRequest, InboundResponse};
use crate::rules::{Decision, RateLimitRule};

/// Status code signaled to the transport layer on rejection.
pub const STATUS_TOO_MANY_REQUESTS: u16 = 429;

/// Outcome of admitting one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionOutcome {
    /// No matching rule rejected the request; forward it unchanged.
    Forwarded,
    /// A rule rejected the request; carries the composite counter key.
    Rejected { key: String },
}

/// Evaluates an ordered list of rules against each inbound request and
/// short-circuits on the first violation.
///
/// Order matters only for efficiency: rules are logically independent,
/// so the set of requests rejected does not depend on it.
pub struct AdmissionFilter {
    rules: Vec<Arc<RateLimitRule>>,
}

impl AdmissionFilter {
    /// Create a filter over an ordered rule list.
    pub fn new(rules: Vec<Arc<RateLimitRule>>) -> Self {
        Self { rules }
    }

    /// The configured rules, in evaluation order.
    pub fn rules(&self) -> &[Arc<RateLimitRule>] {
        &self.rules
    }

    /// Evaluate every matching rule in order; the first rejection wins
    /// and no further rules are checked for this request.
    pub async fn admit(&self, request: &dyn InboundRequest) -> AdmissionOutcome {
        for rule in &self.rules {
            if !rule.matches(request) {
                continue;
            }
            if let Decision::Rejected { key } = rule.check_call_limit(request).await {
                debug!(
                    method = %request.method(),
                    path = %request.path(),
                    key = %key,
                    "Request rejected by admission filter"
                );
                return AdmissionOutcome::Rejected { key };
            }
        }
        AdmissionOutcome::Forwarded
    }

    /// Admit the request and, on rejection, set 429 on the response.
    pub async fn handle(
        &self,
        request: &dyn InboundRequest,
        response: &mut dyn InboundResponse,
    ) -> AdmissionOutcome {
        let outcome = self.admit(request).await;
        if matches!(outcome, AdmissionOutcome::Rejected { .. }) {
            response.set_status(STATUS_TOO_MANY_REQUESTS);
        }
        outcome
    }
}
