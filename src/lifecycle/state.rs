//! Process lifecycle state machine.
//!
//! `Initializing -> Serving -> Draining -> Terminated`, forward only.
//! Observers subscribe through a `watch` channel.

use std::fmt;

use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LifecycleState {
    Initializing,
    Serving,
    Draining,
    Terminated,
}

impl LifecycleState {
    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleState::Initializing => "initializing",
            LifecycleState::Serving => "serving",
            LifecycleState::Draining => "draining",
            LifecycleState::Terminated => "terminated",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current state plus its subscribers.
#[derive(Debug)]
pub struct StateMachine {
    tx: watch::Sender<LifecycleState>,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(LifecycleState::Initializing);
        Self { tx }
    }

    pub fn current(&self) -> LifecycleState {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.tx.subscribe()
    }

    /// Move to `next`. Returns false (and changes nothing) unless `next`
    /// is strictly later than the current state.
    pub fn advance(&self, next: LifecycleState) -> bool {
        let mut from = next;
        let moved = self.tx.send_if_modified(|state| {
            from = *state;
            if next > *state {
                *state = next;
                true
            } else {
                false
            }
        });
        if moved {
            tracing::info!(from = %from, to = %next, "lifecycle state changed");
        } else {
            tracing::warn!(current = %from, requested = %next, "ignored backward lifecycle transition");
        }
        moved
    }
}
