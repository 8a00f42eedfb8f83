//! # chainpin-observability
//!
//! Logging and metrics for ChainPin hosts.
//!
//! ## Submission metrics
//! - `chainpin.blockchain_transactions`: counter, tagged with location + method
//! - `chainpin.blockchain_queries`: counter, tagged with location + method
//!
//! ## Structured logging
//! Text or JSON logs through `tracing-subscriber`, with levels
//! configurable per component.

pub mod metrics;
pub mod tracing_setup;

pub use metrics::OtelMetrics;
pub use tracing_setup::{init_tracing, LogConfig};
