//! Configuration validation.
//!
//! Semantic checks that serde cannot express. Every problem is reported,
//! not just the first.

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::{CacheKind, ProxyConfig};

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self { field, message: message.into() }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("{:?} is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::new("listener.max_connections", "must be greater than 0"));
    }

    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::new("timeouts.connect_secs", "must be greater than 0"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }

    let cache = &config.cache;
    if !(100..=999).contains(&cache.version_not_found_status) {
        errors.push(ValidationError::new(
            "cache.version_not_found_status",
            format!("{} is not a valid HTTP status code", cache.version_not_found_status),
        ));
    }
    if cache.default_within_secs < 0 {
        errors.push(ValidationError::new("cache.default_within_secs", "must not be negative"));
    }
    if matches!(cache.kind, CacheKind::File | CacheKind::Wayback) && cache.root.trim().is_empty() {
        errors.push(ValidationError::new("cache.root", "required for file-backed caches"));
    }
    if cache.kind == CacheKind::Wayback && cache.index_file.trim().is_empty() {
        errors.push(ValidationError::new("cache.index_file", "required for the wayback cache"));
    }

    if config.limits.max_body_bytes == 0 {
        errors.push(ValidationError::new("limits.max_body_bytes", "must be greater than 0"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("{:?} is not a socket address", config.observability.metrics_address),
        ));
    }

    if config.admin.enabled {
        if config.admin.bind_address.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::new(
                "admin.bind_address",
                format!("{:?} is not a socket address", config.admin.bind_address),
            ));
        }
        if cache.kind == CacheKind::None {
            errors.push(ValidationError::new("admin.enabled", "the admin API needs a cache"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
