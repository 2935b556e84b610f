//! Prometheus metrics registry and instruments.
//!
//! This module is framework-agnostic and can be used from any layer.

use lazy_static::lazy_static;
use prometheus::{HistogramOpts, IntCounterVec, IntGauge, Opts, Registry};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // OAuth Metrics
    pub static ref OAUTH_TOKEN_EXCHANGES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("ghlogin_oauth_token_exchanges_total", "Total number of authorization code exchanges"),
        &["outcome"]
    ).expect("metric can be created");
    pub static ref PROFILE_FETCHES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("ghlogin_profile_fetches_total", "Total number of user profile fetches"),
        &["outcome"]
    ).expect("metric can be created");
    pub static ref UPSTREAM_REQUEST_DURATION_SECONDS: prometheus::HistogramVec = prometheus::HistogramVec::new(
        HistogramOpts::new(
            "ghlogin_upstream_request_duration_seconds",
            "Duration of requests to the identity provider in seconds"
        ).buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        &["endpoint"]
    ).expect("metric can be created");

    // Session Metrics
    pub static ref SESSIONS_ACTIVE: IntGauge = IntGauge::new(
        "ghlogin_sessions_active",
        "Current number of stored login sessions"
    ).expect("metric can be created");

    // Error Metrics
    pub static ref ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("ghlogin_errors_total", "Total number of errors"),
        &["error_type"]
    ).expect("metric can be created");
}

/// Initialize metrics registry.
///
/// Safe to call more than once; collectors that are already registered are skipped.
pub fn init_metrics() {
    let collectors: [(&str, Box<dyn prometheus::core::Collector>); 5] = [
        (
            "OAUTH_TOKEN_EXCHANGES_TOTAL",
            Box::new(OAUTH_TOKEN_EXCHANGES_TOTAL.clone()),
        ),
        (
            "PROFILE_FETCHES_TOTAL",
            Box::new(PROFILE_FETCHES_TOTAL.clone()),
        ),
        (
            "UPSTREAM_REQUEST_DURATION_SECONDS",
            Box::new(UPSTREAM_REQUEST_DURATION_SECONDS.clone()),
        ),
        ("SESSIONS_ACTIVE", Box::new(SESSIONS_ACTIVE.clone())),
        ("ERRORS_TOTAL", Box::new(ERRORS_TOTAL.clone())),
    ];

    for (name, collector) in collectors {
        match REGISTRY.register(collector) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(error) => tracing::error!(metric = name, %error, "Failed to register metric"),
        }
    }

    tracing::info!("Metrics registry initialized");
}
