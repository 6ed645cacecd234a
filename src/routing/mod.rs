//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (method, path)
//!     → router.rs (per-method lookup)
//!     → matcher.rs (segment-wise match, capture params)
//!     → Return: Matched { handler, params } | NotFound | MethodNotAllowed
//!
//! Route Compilation (at startup):
//!     register(method, pattern, handler)
//!     → matcher.rs parses the pattern (InvalidPattern on error)
//!     → shape check against the method bucket (DuplicateRoute)
//!     → Freeze as immutable registry behind Arc
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - No regex in hot path
//! - Deterministic: same input always matches same route
//! - Most specific pattern wins (longest literal prefix)

pub mod error;
pub mod matcher;
pub mod router;

pub use error::RouteError;
pub use matcher::{PathParams, Pattern, Segment};
pub use router::{Matched, RouteGroup, RouteRegistry};
