//! web-scaffold server binary.
//!
//! # Architecture Overview
//!
//! ```text
//!   client ──▶ net::listener ──▶ http::server ──▶ routing ──▶ http::handlers
//!                                   │                            │
//!                                   │                 binding / storage / stream
//!                                   ▼
//!                          lifecycle::orchestrator
//!                 (serve, reload snapshot, drain, close stores)
//! ```
//!
//! Exit codes: 0 clean drain, 1 drain timeout or startup failure,
//! 2 configuration could not be loaded.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use web_scaffold::config::watcher::ConfigWatcher;
use web_scaffold::config::{ConfigOverrides, ConfigStore};
use web_scaffold::http::{handlers, HttpServer, Services};
use web_scaffold::lifecycle::{signals, startup, LifecycleError, Orchestrator, Shutdown};
use web_scaffold::net::InFlightTracker;
use web_scaffold::observability::{logging, metrics};
use web_scaffold::storage::FileStore;

#[derive(Debug, Parser)]
#[command(name = "web-scaffold", version, about = "HTTP application scaffold")]
struct Cli {
    /// Configuration file (.yaml/.yml or .toml)
    #[arg(short, long, default_value = "settings/config.yaml")]
    config: PathBuf,

    /// Override `server.port`
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let overrides = ConfigOverrides { port: cli.port };
    let config = match startup::load_snapshot(&cli.config, &overrides) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load {}: {e}", cli.config.display());
            return ExitCode::from(e.exit_code());
        }
    };

    // logging is optional: stderr is still there if the sink can't be set up
    let _log_guard = match logging::init(&config.log) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("logging disabled: {e}");
            None
        }
    };

    tracing::info!(
        name = %config.name,
        version = %config.version,
        mode = %config.mode,
        config = %cli.config.display(),
        "starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "metrics exporter not installed");
                }
            }
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "failed to parse metrics address"
            ),
        }
    }

    let tracker = InFlightTracker::new();
    let shutdown = Shutdown::new();
    let mut orchestrator = Orchestrator::new(
        ConfigStore::new(config.clone()),
        tracker.clone(),
        shutdown.clone(),
    );

    if let Err(e) = orchestrator
        .initialize(startup::collaborators(&config))
        .await
    {
        tracing::error!(error = %e, "startup aborted");
        return ExitCode::from(e.exit_code());
    }

    let routes = match handlers::routes() {
        Ok(routes) => routes,
        Err(e) => {
            let err = LifecycleError::from(e);
            orchestrator.abort(&err).await;
            return ExitCode::from(err.exit_code());
        }
    };
    let services = Services {
        files: FileStore::new(&config.storage.root),
        config: orchestrator.config(),
    };
    let router = HttpServer::new(routes, services, &config, tracker).into_router();

    let listener = match startup::bind_listener(&config.server).await {
        Ok(listener) => listener,
        Err(e) => {
            let code = e.exit_code();
            orchestrator.abort(&e).await;
            return ExitCode::from(code);
        }
    };

    let (watcher, reloads) = ConfigWatcher::new(&cli.config);
    let _watcher = match watcher.with_overrides(overrides).run() {
        Ok(watcher) => Some(watcher),
        Err(e) => {
            tracing::warn!(error = %e, "config hot reload disabled");
            None
        }
    };

    signals::spawn_signal_listener(shutdown);

    let report = orchestrator.run(listener, router, reloads).await;
    ExitCode::from(u8::try_from(report.exit_code()).unwrap_or(1))
}
