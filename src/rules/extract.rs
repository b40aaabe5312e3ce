//! Caller identity extraction.

use crate::admission::request::InboundRequest;

/// Derives a stable string key identifying the caller of a request.
///
/// Supplied by the embedding application; the only obligation is
/// determinism for the same logical caller. Returning `None` signals an
/// unidentifiable caller, which rules treat as fail-open.
pub trait KeyExtractor: Send + Sync {
    /// Extract the caller key, if one can be determined.
    fn extract(&self, request: &dyn InboundRequest) -> Option<String>;
}

/// Extracts the caller key from a request header.
pub struct HeaderKeyExtractor {
    header: String,
}

impl HeaderKeyExtractor {
    /// Create an extractor reading the named header.
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
        }
    }
}

impl KeyExtractor for HeaderKeyExtractor {
    fn extract(&self, request: &dyn InboundRequest) -> Option<String> {
        request
            .header(&self.header)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::request::{HttpMethod, RequestParts};

    #[test]
    fn test_extracts_header_value() {
        let extractor = HeaderKeyExtractor::new("X-Api-Key");
        let req = RequestParts::new(HttpMethod::Get, "/api/users")
            .with_header("X-Api-Key", " abc123 ");

        assert_eq!(extractor.extract(&req), Some("abc123".to_string()));
    }

    #[test]
    fn test_missing_or_blank_header_yields_none() {
        let extractor = HeaderKeyExtractor::new("X-Api-Key");

        let req = RequestParts::new(HttpMethod::Get, "/api/users");
        assert_eq!(extractor.extract(&req), None);

        let req = RequestParts::new(HttpMethod::Get, "/api/users").with_header("X-Api-Key", "  ");
        assert_eq!(extractor.extract(&req), None);
    }
}
