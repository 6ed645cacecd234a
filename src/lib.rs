//! HTTP application scaffold: route dispatch, request binding, streaming
//! responses, file transfer and a lifecycle orchestrator with graceful
//! drain and hot config reload.

// Core subsystems
pub mod binding;
pub mod config;
pub mod http;
pub mod net;
pub mod routing;
pub mod storage;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::{AppConfig, ConfigHandle, ConfigStore};
pub use http::HttpServer;
pub use lifecycle::{Orchestrator, Shutdown, ShutdownReport};
