//! Request and response boundary types.
//!
//! The filter never binds an HTTP stack. It consumes an abstract view of
//! the inbound request (method, path, headers) and signals rejection
//! through an abstract status setter, so any transport can embed it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TurnstileError;

/// HTTP request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Options,
    Patch,
}

impl FromStr for HttpMethod {
    type Err = TurnstileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "HEAD" => Ok(HttpMethod::Head),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "DELETE" => Ok(HttpMethod::Delete),
            "OPTIONS" => Ok(HttpMethod::Options),
            "PATCH" => Ok(HttpMethod::Patch),
            other => Err(TurnstileError::Config(format!(
                "Unknown HTTP method: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HttpMethod::Get => "GET",
            HttpMethod::Head => "HEAD",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Patch => "PATCH",
        };
        f.write_str(name)
    }
}

/// Abstract view of an inbound request. Bodies are never read.
pub trait InboundRequest: Send + Sync {
    /// The request method.
    fn method(&self) -> HttpMethod;

    /// The request path, excluding query string.
    fn path(&self) -> &str;

    /// A header value by case-insensitive name.
    fn header(&self, name: &str) -> Option<&str>;
}

/// Abstract response the filter signals rejection through.
pub trait InboundResponse {
    /// Set the response status code.
    fn set_status(&mut self, status: u16);
}

/// A plain request value for embedding and tests.
#[derive(Debug, Clone)]
pub struct RequestParts {
    method: HttpMethod,
    path: String,
    headers: Vec<(String, String)>,
}

impl RequestParts {
    /// Create a request with no headers.
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: Vec::new(),
        }
    }

    /// Add a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

impl InboundRequest for RequestParts {
    fn method(&self) -> HttpMethod {
        self.method
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A plain response value for embedding and tests.
#[derive(Debug, Clone, Default)]
pub struct ResponseParts {
    status: Option<u16>,
}

impl ResponseParts {
    /// Create a response with no status set.
    pub fn new() -> Self {
        Self::default()
    }

    /// The status code, if one has been set.
    pub fn status(&self) -> Option<u16> {
        self.status
    }
}

impl InboundResponse for ResponseParts {
    fn set_status(&mut self, status: u16) {
        self.status = Some(status);
    }
}
