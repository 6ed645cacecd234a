//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (YAML/TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → AppConfig (validated, immutable)
//!     → snapshot.rs ConfigStore, read through ConfigHandle
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → orchestrator swaps the whole Arc<AppConfig>
//!     → handlers observe new snapshot on next load()
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Exactly one writer (the orchestrator) owns the ConfigStore

pub mod loader;
pub mod schema;
pub mod snapshot;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, load_with_overrides, ConfigError, ConfigOverrides};
pub use schema::{
    AppConfig, CacheConfig, CorsConfig, LogConfig, LogFormat, ObservabilityConfig,
    RelationalConfig, ServerConfig, StorageConfig,
};
pub use snapshot::{ConfigHandle, ConfigStore};
