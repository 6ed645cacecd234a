//! In-flight request tracking.
//!
//! # Responsibilities
//! - Count requests currently being handled
//! - Let the orchestrator report how much work a drain is waiting on
//!
//! # Design Decisions
//! - Guard-based: the count drops even if the handler panics

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;

#[derive(Debug, Clone, Default)]
pub struct InFlightTracker {
    active: Arc<AtomicU64>,
}

impl InFlightTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&self) -> RequestGuard {
        self.active.fetch_add(1, Ordering::SeqCst);
        RequestGuard {
            active: Arc::clone(&self.active),
        }
    }

    pub fn in_flight(&self) -> u64 {
        self.active.load(Ordering::SeqCst)
    }
}

/// Decrements the in-flight count when dropped.
#[derive(Debug)]
pub struct RequestGuard {
    active: Arc<AtomicU64>,
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Middleware holding a guard for the duration of the handler.
pub async fn track_in_flight(
    State(tracker): State<InFlightTracker>,
    request: Request,
    next: Next,
) -> Response {
    let guard = tracker.track();
    tracing::trace!(in_flight = tracker.in_flight(), "request started");
    let response = next.run(request).await;
    drop(guard);
    response
}
