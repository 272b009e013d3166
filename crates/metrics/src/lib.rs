//! Metrics for the relay and dashboard.
//!
//! Everything records through the `metrics` facade. Without a recorder
//! installed the macros are no-ops. With the `prometheus` feature,
//! [`init_metrics`] installs a Prometheus recorder whose handle renders the
//! text exposition format for a `/metrics` endpoint.
//!
//! ```rust,ignore
//! use ferry_metrics::{counter, labels, relay};
//!
//! counter!(relay::MESSAGES_RELAYED_TOTAL, labels::CHANNEL => "42").increment(1);
//! ```

mod definitions;
pub mod error;
mod recorder;

pub use {
    definitions::*,
    error::{Error, Result},
    recorder::{MetricsHandle, MetricsRecorderConfig, init_metrics},
};

// Re-export metrics macros for convenience
pub use metrics::{counter, gauge, histogram};
