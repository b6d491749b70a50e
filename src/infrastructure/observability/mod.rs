//! Push-based observability for meterd
//!
//! Metrics are collected in-process and surfaced through outbound data
//! only (structured logs and the final status snapshot) - no HTTP
//! server, no incoming requests.

pub mod metrics;

pub use metrics::Metrics;
