//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Forwarding engine and middleware produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters, histograms; Prometheus scrape when enabled)
//!     → stats.rs (in-memory usage statistics read by the admin API)
//! ```

pub mod logging;
pub mod metrics;
pub mod stats;

pub use stats::{StatsSnapshot, UsageStats};
