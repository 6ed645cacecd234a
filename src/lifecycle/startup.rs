//! Startup sequence.
//!
//! # Responsibilities
//! - Load the startup snapshot with command-line overrides applied
//! - Build the enabled collaborators from the snapshot, in acquisition order
//! - Initialize them one at a time
//! - Bind the listener before Serving
//!
//! # Design Decisions
//! - Sequential, not concurrent: order is the close order reversed
//! - Non-critical failures are logged and the collaborator is dropped
//! - A critical failure releases whatever was already acquired, then aborts

use std::path::Path;

use tokio::net::TcpListener;

use crate::config::{load_with_overrides, AppConfig, ConfigOverrides, ServerConfig};
use crate::lifecycle::collaborators::{CacheStore, Collaborator, RelationalStore};
use crate::lifecycle::error::LifecycleError;
use crate::net;

/// Startup snapshot. Any failure here is fatal.
pub fn load_snapshot(path: &Path, overrides: &ConfigOverrides) -> Result<AppConfig, LifecycleError> {
    Ok(load_with_overrides(path, overrides)?)
}

pub async fn bind_listener(config: &ServerConfig) -> Result<TcpListener, LifecycleError> {
    Ok(net::listener::bind(config).await?)
}

/// Enabled collaborators, relational store first.
pub fn collaborators(config: &AppConfig) -> Vec<Box<dyn Collaborator>> {
    let mut list: Vec<Box<dyn Collaborator>> = Vec::new();
    if config.relational.enabled {
        list.push(Box::new(RelationalStore::new(config.relational.clone())));
    }
    if config.cache.enabled {
        list.push(Box::new(CacheStore::new(config.cache.clone())));
    }
    list
}

/// Initialize `candidates` in order. Returns the ones that came up.
pub async fn initialize(
    candidates: Vec<Box<dyn Collaborator>>,
) -> Result<Vec<Box<dyn Collaborator>>, LifecycleError> {
    let mut acquired: Vec<Box<dyn Collaborator>> = Vec::with_capacity(candidates.len());

    for collaborator in candidates {
        let name = collaborator.name();
        match collaborator.init().await {
            Ok(()) => {
                tracing::info!(collaborator = name, "collaborator initialized");
                acquired.push(collaborator);
            }
            Err(source) if collaborator.critical() => {
                tracing::error!(collaborator = name, error = %source, "required collaborator failed");
                release(acquired).await;
                return Err(LifecycleError::CollaboratorFailed { name, source });
            }
            Err(e) => {
                tracing::warn!(collaborator = name, error = %e, "collaborator unavailable, continuing without it");
            }
        }
    }
    Ok(acquired)
}

/// Close in reverse acquisition order. Returns (closed, failed) names.
pub async fn release(
    mut acquired: Vec<Box<dyn Collaborator>>,
) -> (Vec<&'static str>, Vec<&'static str>) {
    let mut closed = Vec::new();
    let mut failed = Vec::new();
    while let Some(collaborator) = acquired.pop() {
        let name = collaborator.name();
        match collaborator.close().await {
            Ok(()) => {
                tracing::info!(collaborator = name, "collaborator closed");
                closed.push(name);
            }
            Err(e) => {
                tracing::warn!(collaborator = name, error = %e, "collaborator close failed");
                failed.push(name);
            }
        }
    }
    (closed, failed)
}
