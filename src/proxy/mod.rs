//! Forwarding subsystem.
//!
//! # Data Flow
//! ```text
//! /proxy request
//!     → engine.rs (resolve target, read body within the size limit)
//!     → validator.rs (absolute http/https only)
//!     → security::blocklist (admission check)
//!     → headers.rs + codec.rs (outbound headers and body)
//!     → reqwest client (one call, bounded by the request timeout)
//!     → headers.rs (filter upstream headers, apply CORS)
//!     → streamed response body
//!
//! Any failure → error.rs (status mapping, JSON body, CORS headers)
//! ```

pub mod codec;
pub mod engine;
pub mod error;
pub mod headers;
pub mod validator;

pub use engine::{ForwardRequest, ForwardingEngine};
pub use error::ProxyError;
