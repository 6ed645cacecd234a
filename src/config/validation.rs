//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, ports valid)
//! - Check collaborator settings only when the collaborator is enabled
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use thiserror::Error;

use crate::config::schema::AppConfig;

/// A single semantic violation in a configuration snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
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

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
const MODES: &[&str] = &["debug", "release"];

/// Validate a configuration snapshot.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.name.trim().is_empty() {
        errors.push(ValidationError::new("name", "must not be empty"));
    }
    if !MODES.contains(&config.mode.as_str()) {
        errors.push(ValidationError::new(
            "mode",
            format!("unknown mode '{}', expected one of {:?}", config.mode, MODES),
        ));
    }
    if config.server.bind_address.trim().is_empty() {
        errors.push(ValidationError::new("server.bind_address", "must not be empty"));
    }
    if config.server.max_body_bytes == 0 {
        errors.push(ValidationError::new("server.max_body_bytes", "must be > 0"));
    }
    if config.server.drain_timeout_secs == 0 {
        errors.push(ValidationError::new("server.drain_timeout_secs", "must be > 0"));
    }
    if !LOG_LEVELS.contains(&config.log.level.to_ascii_lowercase().as_str()) {
        errors.push(ValidationError::new(
            "log.level",
            format!("unknown level '{}'", config.log.level),
        ));
    }
    if config.storage.root.trim().is_empty() {
        errors.push(ValidationError::new("storage.root", "must not be empty"));
    }

    if config.relational.enabled {
        if config.relational.host.is_empty() {
            errors.push(ValidationError::new("relational.host", "must not be empty"));
        }
        if config.relational.port == 0 {
            errors.push(ValidationError::new("relational.port", "must be > 0"));
        }
        if config.relational.max_idle_conns > config.relational.max_open_conns {
            errors.push(ValidationError::new(
                "relational.max_idle_conns",
                "must not exceed max_open_conns",
            ));
        }
    }
    if config.cache.enabled {
        if config.cache.host.is_empty() {
            errors.push(ValidationError::new("cache.host", "must not be empty"));
        }
        if config.cache.port == 0 {
            errors.push(ValidationError::new("cache.port", "must be > 0"));
        }
    }

    for origin in &config.cors.allow_origins {
        if origin == "*" {
            if config.cors.allow_credentials {
                errors.push(ValidationError::new(
                    "cors.allow_origins",
                    "'*' cannot be combined with allow_credentials",
                ));
            }
        } else if axum::http::HeaderValue::from_str(origin).is_err() {
            errors.push(ValidationError::new(
                "cors.allow_origins",
                format!("'{}' is not a valid origin", origin),
            ));
        }
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<std::net::SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
