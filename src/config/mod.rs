//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse, overlay environment variables)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → ArcSwap<ProxyConfig>; each request loads one snapshot
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → server swaps the snapshot
//! ```
//!
//! The domain block-list is seeded from the first snapshot only; reloads never
//! overwrite runtime additions or removals.

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, load_from_env, ConfigError};
pub use schema::{
    AuthConfig, ForwardConfig, ListenerConfig, ObservabilityConfig, OriginsConfig, ProxyConfig,
    RateLimitConfig, SecurityConfig, StatsConfig,
};
