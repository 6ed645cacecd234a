//! File transfer subsystem.
//!
//! # Data Flow
//! ```text
//! Upload (multipart part | raw body + Content-Disposition)
//!     → sanitize name (basename only)
//!     → <root>/<name>, written chunk by chunk
//!     → StoredArtifact | StorageError (partial file removed)
//!
//! Download (name)
//!     → sanitize name → existence check → ReaderStream
//! ```
//!
//! # Design Decisions
//! - The resolved path is always a direct child of the storage root
//! - Bodies are never buffered whole in memory
//! - Multi-file uploads record failures and continue

pub mod error;
pub mod files;

pub use error::StorageError;
pub use files::{
    attachment_disposition, filename_from_disposition, FileStore, ServedFile, StoredArtifact,
    UploadBatch, UploadFailure,
};
