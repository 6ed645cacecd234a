//! TCP listener binding.
//!
//! # Responsibilities
//! - Resolve the configured `bind_address:port`
//! - Bind before the orchestrator enters Serving, so bind errors stay startup errors

use std::net::SocketAddr;

use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::ServerConfig;

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("invalid listen address '{address}': {source}")]
    Address {
        address: String,
        #[source]
        source: std::net::AddrParseError,
    },

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

pub fn listen_address(config: &ServerConfig) -> Result<SocketAddr, ListenerError> {
    let address = format!("{}:{}", config.bind_address, config.port);
    address
        .parse()
        .map_err(|source| ListenerError::Address { address, source })
}

pub async fn bind(config: &ServerConfig) -> Result<TcpListener, ListenerError> {
    let address = listen_address(config)?;
    let listener = TcpListener::bind(address)
        .await
        .map_err(|source| ListenerError::Bind { address, source })?;

    let local = listener.local_addr().unwrap_or(address);
    tracing::info!(address = %local, "listener bound");
    Ok(listener)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn binds_ephemeral_port() {
        let config = ServerConfig {
            bind_address: "127.0.0.1".into(),
            port: 0,
            ..ServerConfig::default()
        };
        let listener = bind(&config).await.unwrap();
        assert_ne!(listener.local_addr().unwrap().port(), 0);
    }

    #[test]
    fn rejects_garbage_address() {
        let config = ServerConfig {
            bind_address: "not an ip".into(),
            ..ServerConfig::default()
        };
        assert!(matches!(listen_address(&config), Err(ListenerError::Address { .. })));
    }
}
