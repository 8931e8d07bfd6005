//! API layer
//!
//! HTTP handlers for:
//! - Repository dashboard (GitHub sessions)
//! - Public client configuration
//! - Metrics (Prometheus)

mod app_config;
pub mod metrics;
mod repositories;

pub use app_config::app_config_router;
pub use metrics::metrics_router;
pub use repositories::repositories_router;
