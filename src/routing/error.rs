//! Route registration and dispatch errors.

use axum::http::Method;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    /// A structurally identical pattern is already registered for the method.
    #[error("duplicate route {method} {pattern} (conflicts with {existing})")]
    DuplicateRoute {
        method: Method,
        pattern: String,
        existing: String,
    },

    /// The pattern text cannot be parsed.
    #[error("invalid route pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// No pattern matches the path under any method.
    #[error("no route for {path}")]
    NotFound { path: String },

    /// The path matches, but only under other methods.
    #[error("method {method} not allowed for {path}")]
    MethodNotAllowed {
        method: Method,
        path: String,
        allowed: Vec<Method>,
    },
}

impl RouteError {
    pub(crate) fn invalid(pattern: &str, reason: impl Into<String>) -> Self {
        RouteError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: reason.into(),
        }
    }
}
