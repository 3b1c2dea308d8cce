//! Metrics and Monitoring Adapters
//!
//! Provides the Prometheus metric store served on `/metrics` and
//! health check endpoints (/live, /ready) via axum 0.7.

pub mod health;
pub mod prometheus;

pub use health::{HealthServer, HealthState};
pub use prometheus::MetricStore;
