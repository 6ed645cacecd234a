//! External store collaborators.
//!
//! # Responsibilities
//! - Define the init/close contract the orchestrator drives
//! - Relational store: TCP reachability of the configured host/port
//! - Cache store: TCP plus a RESP `AUTH` / `SELECT` / `PING` handshake
//!
//! # Design Decisions
//! - Object safe (boxed futures) so the orchestrator holds a `Vec<Box<dyn Collaborator>>`
//! - Each collaborator owns at most one connection, held until `close`

use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use crate::config::{CacheConfig, RelationalConfig};

#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("{name}: connect to {address} failed: {source}")]
    Connect {
        name: &'static str,
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{name}: connect to {address} timed out after {timeout:?}")]
    Timeout {
        name: &'static str,
        address: String,
        timeout: Duration,
    },

    #[error("{name}: handshake rejected: {reply}")]
    Handshake { name: &'static str, reply: String },

    #[error("{name}: {source}")]
    Io {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },
}

pub trait Collaborator: Send + Sync {
    fn name(&self) -> &'static str;

    /// A critical collaborator that fails to initialize aborts startup.
    fn critical(&self) -> bool;

    fn init(&self) -> BoxFuture<'_, Result<(), CollaboratorError>>;

    fn close(&self) -> BoxFuture<'_, Result<(), CollaboratorError>>;
}

async fn connect(
    name: &'static str,
    host: &str,
    port: u16,
    timeout: Duration,
) -> Result<TcpStream, CollaboratorError> {
    let address = format!("{host}:{port}");
    match tokio::time::timeout(timeout, TcpStream::connect(&address)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(source)) => Err(CollaboratorError::Connect { name, address, source }),
        Err(_) => Err(CollaboratorError::Timeout { name, address, timeout }),
    }
}

async fn release(name: &'static str, slot: &Mutex<Option<TcpStream>>) -> Result<(), CollaboratorError> {
    match slot.lock().await.take() {
        Some(mut stream) => stream
            .shutdown()
            .await
            .map_err(|source| CollaboratorError::Io { name, source }),
        None => Ok(()),
    }
}

/// Relational database handle.
#[derive(Debug)]
pub struct RelationalStore {
    config: RelationalConfig,
    conn: Mutex<Option<TcpStream>>,
}

impl RelationalStore {
    pub const NAME: &'static str = "relational";

    pub fn new(config: RelationalConfig) -> Self {
        Self {
            config,
            conn: Mutex::new(None),
        }
    }
}

impl Collaborator for RelationalStore {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn critical(&self) -> bool {
        self.config.required
    }

    fn init(&self) -> BoxFuture<'_, Result<(), CollaboratorError>> {
        async move {
            let timeout = Duration::from_millis(self.config.connect_timeout_ms);
            let stream = connect(Self::NAME, &self.config.host, self.config.port, timeout).await?;
            tracing::info!(
                host = %self.config.host,
                port = self.config.port,
                dbname = %self.config.dbname,
                max_open_conns = self.config.max_open_conns,
                "relational store reachable"
            );
            *self.conn.lock().await = Some(stream);
            Ok(())
        }
        .boxed()
    }

    fn close(&self) -> BoxFuture<'_, Result<(), CollaboratorError>> {
        release(Self::NAME, &self.conn).boxed()
    }
}

/// Key-value cache handle speaking RESP.
#[derive(Debug)]
pub struct CacheStore {
    config: CacheConfig,
    conn: Mutex<Option<TcpStream>>,
}

impl CacheStore {
    pub const NAME: &'static str = "cache";

    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            conn: Mutex::new(None),
        }
    }

    async fn handshake(&self, stream: &mut TcpStream) -> Result<(), CollaboratorError> {
        let mut commands: Vec<Vec<String>> = Vec::new();
        if !self.config.password.is_empty() {
            commands.push(vec!["AUTH".into(), self.config.password.clone()]);
        }
        if self.config.db != 0 {
            commands.push(vec!["SELECT".into(), self.config.db.to_string()]);
        }
        commands.push(vec!["PING".into()]);

        let (read, mut write) = stream.split();
        let mut reader = BufReader::new(read);
        let io = |source| CollaboratorError::Io { name: Self::NAME, source };

        for command in &commands {
            write.write_all(&encode_command(command)).await.map_err(io)?;
            let mut reply = String::new();
            reader.read_line(&mut reply).await.map_err(io)?;
            let reply = reply.trim_end();
            if !reply.starts_with('+') {
                return Err(CollaboratorError::Handshake {
                    name: Self::NAME,
                    reply: if reply.is_empty() {
                        "connection closed".to_string()
                    } else {
                        reply.to_string()
                    },
                });
            }
        }
        Ok(())
    }
}

/// RESP array of bulk strings.
fn encode_command(args: &[String]) -> Vec<u8> {
    let mut out = format!("*{}\r\n", args.len()).into_bytes();
    for arg in args {
        out.extend_from_slice(format!("${}\r\n", arg.len()).as_bytes());
        out.extend_from_slice(arg.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out
}

impl Collaborator for CacheStore {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn critical(&self) -> bool {
        self.config.required
    }

    fn init(&self) -> BoxFuture<'_, Result<(), CollaboratorError>> {
        async move {
            let timeout = Duration::from_millis(self.config.connect_timeout_ms);
            let mut stream = connect(Self::NAME, &self.config.host, self.config.port, timeout).await?;
            self.handshake(&mut stream).await?;
            tracing::info!(
                host = %self.config.host,
                port = self.config.port,
                db = self.config.db,
                "cache store answered PING"
            );
            *self.conn.lock().await = Some(stream);
            Ok(())
        }
        .boxed()
    }

    fn close(&self) -> BoxFuture<'_, Result<(), CollaboratorError>> {
        release(Self::NAME, &self.conn).boxed()
    }
}
