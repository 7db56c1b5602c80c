//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → rate_limit.rs (per-IP fixed window, `/` and `/health` exempt)
//!     → origins.rs (Origin allow-list)
//!     → auth.rs (API key on /proxy)
//!     → blocklist.rs (admission check inside the forwarding engine)
//! Outgoing response:
//!     → headers.rs (hardening headers, CORS origin)
//! ```

pub mod auth;
pub mod blocklist;
pub mod headers;
pub mod origins;
pub mod rate_limit;

pub use blocklist::{BlocklistError, DomainBlockList};
pub use rate_limit::RateLimiter;
