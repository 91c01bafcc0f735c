//! Metrics for strongbox.
//!
//! This crate provides the metric names used across the workspace and a
//! recorder setup on top of the `metrics` crate facade. When the `prometheus`
//! feature is enabled, recorded metrics can be rendered in Prometheus text
//! format.
//!
//! # Usage
//!
//! ```rust,ignore
//! use strongbox_metrics::{counter, histogram, vault};
//!
//! counter!(vault::COMMITS_TOTAL).increment(1);
//! histogram!(vault::COMMIT_DURATION_SECONDS).record(0.004);
//! ```
//!
//! # Features
//!
//! - `prometheus`: Install a Prometheus recorder and render its output

mod definitions;
mod recorder;

pub use {
    definitions::*,
    recorder::{MetricsHandle, MetricsRecorderConfig, init_metrics},
};

// Re-export metrics macros for convenience
pub use metrics::{counter, gauge, histogram};
