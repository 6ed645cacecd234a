//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::time::Duration;

use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use web_scaffold::config::{AppConfig, ConfigStore};
use web_scaffold::http::{handlers, HttpServer, Services};
use web_scaffold::lifecycle::{Orchestrator, Shutdown, ShutdownReport};
use web_scaffold::net::InFlightTracker;
use web_scaffold::storage::FileStore;

/// A full server (routes, middleware, orchestrator) on an ephemeral port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub client: reqwest::Client,
    pub storage: TempDir,
    shutdown: Shutdown,
    run: JoinHandle<ShutdownReport>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn stop(self) -> ShutdownReport {
        self.shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(5), self.run)
            .await
            .expect("orchestrator did not stop")
            .unwrap()
    }
}

pub async fn start_server() -> TestServer {
    start_server_with(|_| {}).await
}

/// Like [`start_server`], with a chance to adjust the snapshot first.
pub async fn start_server_with(tweak: impl FnOnce(&mut AppConfig)) -> TestServer {
    let storage = tempfile::tempdir().unwrap();
    let mut config = AppConfig::default();
    config.server.bind_address = "127.0.0.1".into();
    config.server.port = 0;
    config.storage.root = storage.path().to_string_lossy().into_owned();
    tweak(&mut config);

    let tracker = InFlightTracker::new();
    let shutdown = Shutdown::new();
    let mut orchestrator = Orchestrator::new(
        ConfigStore::new(config.clone()),
        tracker.clone(),
        shutdown.clone(),
    )
    .with_drain_timeout(Duration::from_secs(2));
    orchestrator.initialize(Vec::new()).await.unwrap();

    let services = Services {
        files: FileStore::new(storage.path()),
        config: orchestrator.config(),
    };
    let router = HttpServer::new(handlers::routes().unwrap(), services, &config, tracker)
        .into_router();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (_reload_tx, reloads) = tokio::sync::mpsc::unbounded_channel();
    let run = tokio::spawn(orchestrator.run(listener, router, reloads));

    TestServer {
        addr,
        client: reqwest::Client::new(),
        storage,
        shutdown,
        run,
    }
}
