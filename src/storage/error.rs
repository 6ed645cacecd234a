use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    /// Nothing usable remains after stripping directory components.
    #[error("file name '{name}' does not resolve inside the storage root")]
    PathEscape { name: String },

    #[error("no file name supplied")]
    MissingFilename,

    #[error("file '{name}' not found")]
    NotFound { name: String },

    #[error("failed to write '{name}': {source}")]
    WriteFailure {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to read '{name}': {source}")]
    ReadFailure {
        name: String,
        #[source]
        source: io::Error,
    },
}

impl StorageError {
    pub fn code(&self) -> &'static str {
        match self {
            StorageError::PathEscape { .. } => "invalid_filename",
            StorageError::MissingFilename => "missing_filename",
            StorageError::NotFound { .. } => "file_not_found",
            StorageError::WriteFailure { .. } => "write_failed",
            StorageError::ReadFailure { .. } => "read_failed",
        }
    }

    /// Caller mistakes, as opposed to server-side failures.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            StorageError::PathEscape { .. } | StorageError::MissingFilename
        )
    }
}
