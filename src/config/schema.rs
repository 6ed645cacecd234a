//! Configuration schema definitions.
//!
//! This module defines the complete configuration snapshot for the service.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration snapshot.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    /// Application name, reported by the `/config` endpoint.
    pub name: String,

    /// Run mode (`debug` or `release`).
    pub mode: String,

    /// Application version string.
    pub version: String,

    /// Listener configuration.
    pub server: ServerConfig,

    /// Logging sink configuration.
    pub log: LogConfig,

    /// Relational store collaborator.
    pub relational: RelationalConfig,

    /// Cache store collaborator.
    pub cache: CacheConfig,

    /// Upload/download storage.
    pub storage: StorageConfig,

    /// Cross-origin policy.
    pub cors: CorsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "web-scaffold".to_string(),
            mode: "debug".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            server: ServerConfig::default(),
            log: LogConfig::default(),
            relational: RelationalConfig::default(),
            cache: CacheConfig::default(),
            storage: StorageConfig::default(),
            cors: CorsConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl AppConfig {
    /// `host:port` the listener binds to.
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.server.bind_address, self.server.port)
    }
}

/// Listener configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind host (e.g., "0.0.0.0").
    pub bind_address: String,

    /// Bind port.
    pub port: u16,

    /// Maximum accepted request body size in bytes.
    pub max_body_bytes: usize,

    /// Bounded wait for in-flight requests on shutdown, in seconds.
    pub drain_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8080,
            max_body_bytes: 32 * 1024 * 1024,
            drain_timeout_secs: 5,
        }
    }
}

/// Output format of the log sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    /// Level filter (trace, debug, info, warn, error).
    pub level: String,

    /// Output format.
    pub format: LogFormat,

    /// Optional log file; when unset logs go to stdout only.
    pub filename: Option<String>,

    /// Rotated log files kept on disk.
    pub max_backups: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
            filename: None,
            max_backups: 7,
        }
    }
}

/// Relational store collaborator configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RelationalConfig {
    pub enabled: bool,

    /// Abort startup if the store cannot be reached.
    pub required: bool,

    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub dbname: String,
    pub max_idle_conns: u32,
    pub max_open_conns: u32,
    pub connect_timeout_ms: u64,
}

impl Default for RelationalConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            required: false,
            host: "127.0.0.1".to_string(),
            port: 3306,
            user: "root".to_string(),
            password: String::new(),
            dbname: "web_app".to_string(),
            max_idle_conns: 10,
            max_open_conns: 100,
            connect_timeout_ms: 2000,
        }
    }
}

/// Cache store collaborator configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,

    /// Abort startup if the cache cannot be reached.
    pub required: bool,

    pub host: String,
    pub port: u16,
    pub password: String,
    pub db: u32,
    pub pool_size: u32,
    pub connect_timeout_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            required: false,
            host: "127.0.0.1".to_string(),
            port: 6379,
            password: String::new(),
            db: 0,
            pool_size: 100,
            connect_timeout_ms: 2000,
        }
    }
}

/// File transfer storage configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding uploaded artifacts.
    pub root: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: "uploads".to_string(),
        }
    }
}

/// CORS configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Allowed origins; empty disables the CORS layer.
    pub allow_origins: Vec<String>,

    pub allow_credentials: bool,

    /// Preflight cache lifetime in seconds.
    pub max_age_secs: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allow_origins: vec!["http://localhost:5173".to_string()],
            allow_credentials: true,
            max_age_secs: 12 * 60 * 60,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Enable the Prometheus endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
