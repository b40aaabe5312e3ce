//! Turnstile - Request-Rate Admission Control
//!
//! This crate implements the admission-control layer of an HTTP service:
//! each inbound request is matched against configured rules, counted per
//! caller in a fixed expiring window, and rejected with a 429 outcome
//! once it exceeds its rate. Counters live in a pluggable store, either
//! in-process or backed by a shared atomic key-value service, so one
//! global rate can be enforced across many replicas.

pub mod admission;
pub mod config;
pub mod error;
pub mod rules;
pub mod store;
