//! Configuration validation.
//!
//! Serde handles syntax; this module checks value ranges and addresses.
//! All problems are collected so one run reports every mistake.

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::ProxyConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a configuration, returning every error found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    if config.proxy.request_timeout_ms == 0 {
        errors.push(ValidationError::new("proxy.request_timeout_ms", "must be greater than 0"));
    }
    if config.proxy.connect_timeout_ms == 0 {
        errors.push(ValidationError::new("proxy.connect_timeout_ms", "must be greater than 0"));
    }
    if config.proxy.max_body_size == 0 {
        errors.push(ValidationError::new("proxy.max_body_size", "must be greater than 0"));
    }

    if config.rate_limit.enabled {
        if config.rate_limit.window_ms == 0 {
            errors.push(ValidationError::new("rate_limit.window_ms", "must be greater than 0"));
        }
        if config.rate_limit.max_requests == 0 {
            errors.push(ValidationError::new("rate_limit.max_requests", "must be greater than 0"));
        }
    }

    let stats = &config.stats;
    if stats.recent_error_capacity == 0 {
        errors.push(ValidationError::new("stats.recent_error_capacity", "must be greater than 0"));
    }
    if stats.domain_retain > stats.domain_soft_cap {
        errors.push(ValidationError::new(
            "stats.domain_retain",
            format!("must not exceed domain_soft_cap ({})", stats.domain_soft_cap),
        ));
    }
    if stats.maintenance_interval_secs == 0 {
        errors.push(ValidationError::new("stats.maintenance_interval_secs", "must be greater than 0"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if config.origins.allowed.is_empty() {
        errors.push(ValidationError::new(
            "origins.allowed",
            "must list at least one origin (use \"*\" for any)",
        ));
    }

    for key in [&config.auth.proxy_api_key, &config.auth.admin_api_key].into_iter().flatten() {
        if key.trim().is_empty() {
            errors.push(ValidationError::new("auth", "API keys must not be blank when set"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
