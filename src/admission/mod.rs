//! Request admission: boundary types and the filter entry point.

mod filter;
pub mod request;

pub use filter::{AdmissionFilter, AdmissionOutcome, STATUS_TOO_MANY_REQUESTS};
pub use request::{HttpMethod, InboundRequest, InboundResponse, RequestParts, ResponseParts};
