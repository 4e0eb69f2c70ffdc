//! HTTP surface of hourbook: configuration, the axum router for report
//! routes and operational endpoints, and Prometheus metrics.

pub mod config;
pub mod http;
pub mod metrics;
