//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Config loaded → collaborators initialized in order → listener bound
//!
//! Serving (orchestrator.rs):
//!     axum::serve on its own task; reloads swap the config snapshot
//!
//! Shutdown (shutdown.rs, signals.rs):
//!     SIGTERM/SIGINT → token cancelled → drain (bounded) → close collaborators
//! ```
//!
//! # Design Decisions
//! - States only move forward (state.rs)
//! - Config failure is fatal; optional collaborator failure is not
//! - Drain has a deadline: the orchestrator never hangs on a stuck request

pub mod collaborators;
pub mod error;
pub mod orchestrator;
pub mod shutdown;
pub mod signals;
pub mod startup;
pub mod state;

pub use collaborators::{CacheStore, Collaborator, CollaboratorError, RelationalStore};
pub use error::LifecycleError;
pub use orchestrator::{Orchestrator, ShutdownReport};
pub use shutdown::Shutdown;
pub use state::{LifecycleState, StateMachine};
