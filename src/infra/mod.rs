//! Infrastructure - configuration and metrics
//!
//! - `config` - Application configuration (TOML loading, defaults)
//! - `metrics` - Lock-free scan metrics

pub mod config;
pub mod metrics;

pub use config::{Config, LookupFailurePolicy};
pub use metrics::{MetricsSummary, ScanMetrics};
