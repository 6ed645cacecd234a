//! Serve, drain, terminate.
//!
//! # Responsibilities
//! - Own the config store (the only writer) and the collaborators
//! - Run the listener on its own task while watching for shutdown and reloads
//! - Bound the drain, then close collaborators in reverse order
//!
//! # Data Flow
//! ```text
//! initialize()  Initializing: collaborators up, in order
//! run()         Serving: axum::serve on a spawned task
//!                 ├─ reload  → ConfigStore::replace
//!                 └─ shutdown token cancelled
//!               Draining: stop accepting, wait ≤ drain timeout
//!               Terminated: close collaborators (reverse), report
//! ```

use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinError;

use crate::config::{AppConfig, ConfigHandle, ConfigStore};
use crate::lifecycle::collaborators::Collaborator;
use crate::lifecycle::error::LifecycleError;
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::startup;
use crate::lifecycle::state::{LifecycleState, StateMachine};
use crate::net::InFlightTracker;

/// How the process came down.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Every in-flight request finished inside the drain window.
    pub drained: bool,
    /// The server task ended with an error instead of a requested shutdown.
    pub server_failed: bool,
    /// Collaborators closed cleanly, in close order.
    pub closed: Vec<&'static str>,
    pub close_failures: Vec<&'static str>,
}

impl ShutdownReport {
    pub fn exit_code(&self) -> i32 {
        if self.drained && !self.server_failed {
            0
        } else {
            1
        }
    }
}

pub struct Orchestrator {
    store: ConfigStore,
    state: StateMachine,
    shutdown: Shutdown,
    tracker: InFlightTracker,
    collaborators: Vec<Box<dyn Collaborator>>,
    drain_timeout: Option<Duration>,
}

impl Orchestrator {
    pub fn new(store: ConfigStore, tracker: InFlightTracker, shutdown: Shutdown) -> Self {
        Self {
            store,
            state: StateMachine::new(),
            shutdown,
            tracker,
            collaborators: Vec::new(),
            drain_timeout: None,
        }
    }

    /// Use a fixed drain window instead of `server.drain_timeout_secs`.
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = Some(timeout);
        self
    }

    pub fn config(&self) -> ConfigHandle {
        self.store.handle()
    }

    pub fn shutdown(&self) -> Shutdown {
        self.shutdown.clone()
    }

    pub fn state(&self) -> LifecycleState {
        self.state.current()
    }

    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// Bring collaborators up in order. A required one failing is fatal.
    pub async fn initialize(
        &mut self,
        candidates: Vec<Box<dyn Collaborator>>,
    ) -> Result<(), LifecycleError> {
        match startup::initialize(candidates).await {
            Ok(acquired) => {
                self.collaborators = acquired;
                Ok(())
            }
            Err(e) => {
                self.state.advance(LifecycleState::Terminated);
                Err(e)
            }
        }
    }

    /// Give up before serving: close whatever `initialize` acquired and terminate.
    pub async fn abort(mut self, reason: &LifecycleError) -> ShutdownReport {
        tracing::error!(error = %reason, "startup aborted");
        let (closed, failed) = startup::release(std::mem::take(&mut self.collaborators)).await;
        self.state.advance(LifecycleState::Terminated);
        ShutdownReport {
            drained: false,
            server_failed: false,
            closed,
            close_failures: failed,
        }
    }

    /// Serve until shutdown, then drain and terminate.
    pub async fn run(
        mut self,
        listener: TcpListener,
        router: Router,
        mut reloads: mpsc::UnboundedReceiver<AppConfig>,
    ) -> ShutdownReport {
        let token = self.shutdown.token();
        let mut server = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await
        });
        self.state.advance(LifecycleState::Serving);

        let mut reloads_open = true;
        let early_exit = loop {
            tokio::select! {
                _ = self.shutdown.wait() => break None,
                result = &mut server => break Some(result),
                next = reloads.recv(), if reloads_open => match next {
                    Some(config) => self.apply_reload(config),
                    None => reloads_open = false,
                },
            }
        };

        self.state.advance(LifecycleState::Draining);
        let mut report = ShutdownReport::default();

        match early_exit {
            Some(result) => {
                report.drained = true;
                report.server_failed = serve_failed(result);
                self.shutdown.trigger();
            }
            None => {
                let timeout = self.drain_timeout.unwrap_or_else(|| {
                    Duration::from_secs(self.store.load().server.drain_timeout_secs)
                });
                tracing::info!(
                    in_flight = self.tracker.in_flight(),
                    timeout = ?timeout,
                    "draining"
                );
                match tokio::time::timeout(timeout, &mut server).await {
                    Ok(result) => {
                        report.drained = true;
                        report.server_failed = serve_failed(result);
                    }
                    Err(_) => {
                        let err = LifecycleError::DrainTimeout {
                            in_flight: self.tracker.in_flight(),
                            timeout,
                        };
                        tracing::error!(fatal = true, error = %err, "abandoning in-flight requests");
                        server.abort();
                    }
                }
            }
        }

        let (closed, failed) = startup::release(std::mem::take(&mut self.collaborators)).await;
        report.closed = closed;
        report.close_failures = failed;

        self.state.advance(LifecycleState::Terminated);
        tracing::info!(
            drained = report.drained,
            exit_code = report.exit_code(),
            "shutdown complete"
        );
        report
    }

    fn apply_reload(&self, next: AppConfig) {
        let current = self.store.load();
        if current.server.bind_address != next.server.bind_address
            || current.server.port != next.server.port
        {
            tracing::warn!(
                current = %current.listen_address(),
                requested = %next.listen_address(),
                "listener address changes need a restart; keeping the bound listener"
            );
        }
        let version = next.version.clone();
        self.store.replace(next);
        tracing::info!(version = %version, "configuration snapshot swapped");
    }
}

fn serve_failed(result: Result<std::io::Result<()>, JoinError>) -> bool {
    match result {
        Ok(Ok(())) => false,
        Ok(Err(e)) => {
            tracing::error!(error = %e, "server stopped with an error");
            true
        }
        Err(e) => {
            tracing::error!(error = %e, "server task failed");
            true
        }
    }
}
