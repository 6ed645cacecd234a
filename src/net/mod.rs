//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! ServerConfig
//!     → listener.rs (resolve + bind TcpListener)
//!     → axum::serve (accept loop, owned by the orchestrator)
//!     → connection.rs (in-flight guard per request)
//!     → Hand off to HTTP layer
//! ```
//!
//! # Design Decisions
//! - Binding happens during startup, before Serving
//! - In-flight count is observable for drain reporting

pub mod connection;
pub mod listener;

pub use connection::{InFlightTracker, RequestGuard};
pub use listener::ListenerError;
