//! Binding failures.

use thiserror::Error;

use crate::binding::target::{BodyEncoding, Source};

/// Why a single target could not be bound.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FieldError {
    #[error("{field}: required {location} value is missing")]
    Missing { field: String, location: Source },

    #[error("{field}: expected {expected}, got {got}")]
    TypeMismatch {
        field: String,
        expected: &'static str,
        got: String,
    },
}

impl FieldError {
    pub fn field(&self) -> &str {
        match self {
            FieldError::Missing { field, .. } | FieldError::TypeMismatch { field, .. } => field,
        }
    }

    /// Machine-readable reason.
    pub fn code(&self) -> &'static str {
        match self {
            FieldError::Missing { .. } => "missing_field",
            FieldError::TypeMismatch { .. } => "type_mismatch",
        }
    }
}

#[derive(Debug, Error)]
pub enum BindingError {
    /// The body could not be decoded as the declared encoding.
    #[error("malformed {encoding} body: {detail}")]
    MalformedBody {
        encoding: BodyEncoding,
        detail: String,
    },

    /// One or more targets failed; every failure is listed.
    #[error("{}", join(.0))]
    Invalid(Vec<FieldError>),

    /// The body stream itself failed (client abort).
    #[error("failed to read request body: {0}")]
    Body(String),

    /// A buffered body went past `server.max_body_bytes`.
    #[error("request body exceeds {limit} bytes")]
    TooLarge { limit: usize },
}

impl BindingError {
    pub(crate) fn malformed(encoding: BodyEncoding, detail: impl ToString) -> Self {
        BindingError::MalformedBody {
            encoding,
            detail: detail.to_string(),
        }
    }

    /// Field-level failures, empty for body-level errors.
    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            BindingError::Invalid(errors) => errors,
            _ => &[],
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            BindingError::MalformedBody { .. } => "malformed_body",
            BindingError::Invalid(_) => "binding_failed",
            BindingError::Body(_) => "body_read_failed",
            BindingError::TooLarge { .. } => "body_too_large",
        }
    }
}

fn join(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
