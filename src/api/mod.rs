//! API layer
//!
//! Operational HTTP handlers:
//! - Metrics (Prometheus)

pub mod metrics;

pub use metrics::metrics_router;
