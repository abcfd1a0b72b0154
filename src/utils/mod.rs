//! # Utility Modules
//!
//! Supporting utilities shared by every link of a node.
//!
//! ## Components
//! - **Logging**: `tracing-subscriber` setup from [`LoggingConfig`](crate::config::LoggingConfig)
//! - **Metrics**: thread-safe link counters

pub mod logging;
pub mod metrics;

pub use metrics::{Metrics, MetricsSnapshot};
