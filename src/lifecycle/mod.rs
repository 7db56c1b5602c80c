//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! SIGINT/SIGTERM (shutdown.rs)
//!     → Shutdown::trigger()
//!     → HTTP server drains and stops
//!     → maintenance task and config-update loop exit
//!
//! Every maintenance interval (maintenance.rs):
//!     → trim usage stats, purge expired rate-limit windows
//! ```

pub mod maintenance;
pub mod shutdown;

pub use maintenance::MaintenanceTask;
pub use shutdown::{wait_for_signal, Shutdown};
