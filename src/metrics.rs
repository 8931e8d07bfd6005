//! Prometheus metrics registry and instruments.
//!
//! This module is framework-agnostic and can be used from any layer.

use lazy_static::lazy_static;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // Auth Metrics
    pub static ref LOGINS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("repodeck_logins_total", "Total number of login attempts"),
        &["provider", "outcome"]
    ).expect("metric can be created");
    pub static ref LOGOUTS_TOTAL: prometheus::IntCounter = prometheus::IntCounter::new(
        "repodeck_logouts_total",
        "Total number of logouts"
    ).expect("metric can be created");

    // GitHub Metrics
    pub static ref GITHUB_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("repodeck_github_requests_total", "Total number of GitHub API requests"),
        &["operation", "status"]
    ).expect("metric can be created");
    pub static ref GITHUB_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "repodeck_github_request_duration_seconds",
            "GitHub API request duration in seconds"
        ).buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["operation"]
    ).expect("metric can be created");

    // Repository Cache Metrics
    pub static ref REPOSITORY_MUTATIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("repodeck_repository_mutations_total", "Total number of repository mutations"),
        &["kind", "outcome"]
    ).expect("metric can be created");
    pub static ref CACHE_ROLLBACKS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("repodeck_cache_rollbacks_total", "Total number of optimistic updates rolled back"),
        &["kind"]
    ).expect("metric can be created");
    pub static ref REPOSITORY_SESSIONS: IntGauge = IntGauge::new(
        "repodeck_repository_sessions",
        "Current number of sessions holding a repository cache"
    ).expect("metric can be created");

    // Error Metrics
    pub static ref ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("repodeck_errors_total", "Total number of errors"),
        &["error_type"]
    ).expect("metric can be created");
}

/// Initialize metrics registry.
///
/// Safe to call more than once; later registrations are ignored.
pub fn init_metrics() {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(LOGINS_TOTAL.clone()),
        Box::new(LOGOUTS_TOTAL.clone()),
        Box::new(GITHUB_REQUESTS_TOTAL.clone()),
        Box::new(GITHUB_REQUEST_DURATION_SECONDS.clone()),
        Box::new(REPOSITORY_MUTATIONS_TOTAL.clone()),
        Box::new(CACHE_ROLLBACKS_TOTAL.clone()),
        Box::new(REPOSITORY_SESSIONS.clone()),
        Box::new(ERRORS_TOTAL.clone()),
    ];

    for collector in collectors {
        if let Err(error) = REGISTRY.register(collector) {
            tracing::debug!(%error, "Metric already registered");
        }
    }

    tracing::info!("Metrics registry initialized");
}
