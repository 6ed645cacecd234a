//! HTTP subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (axum app, middleware, fallback dispatch)
//!     → routing (pattern match → handler + path params)
//!     → request.rs (RequestContext: params, query, cookies, lazy body)
//!     → handlers.rs (binding, storage, streaming)
//!     → response.rs (JSON errors, attachments) / stream.rs (chunked, SSE)
//!     → Send to client
//! ```

pub mod cookies;
pub mod handlers;
pub mod request;
pub mod response;
pub mod server;
pub mod stream;

pub use request::{RequestContext, Services, X_REQUEST_ID};
pub use response::ApiError;
pub use server::{handler, Handler, HttpServer, Routes};
