//! Agent binary: configuration, wiring, and graceful shutdown.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use execd::config::Config;
use execd::executor::Executor;
use execd::logging;
use execd::server::{self, AppState};
use execd::store::{JobStore, MemoryStore};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(30);

/// execd - command-execution agent
#[derive(Parser, Debug)]
#[command(name = "execd", version, about)]
struct Cli {
    /// Path to the configuration file
    #[arg(long, default_value = "configs/agent.yaml")]
    config: PathBuf,

    /// Path to a log file (defaults to stdout)
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(&cli.config)
        .with_context(|| format!("failed to load configuration from {}", cli.config.display()))?;

    logging::init(&config.logging.level, cli.log_file.as_deref());

    info!(version = VERSION, "starting execd");
    info!(host = %config.server.host, port = config.server.port, "server configuration");
    info!(
        max_concurrent_jobs = config.executor.max_concurrent_jobs,
        default_timeout_seconds = config.executor.default_timeout_seconds,
        "executor configuration"
    );

    let store: Arc<dyn JobStore> = Arc::new(MemoryStore::new());
    info!(kind = %config.storage.kind, "storage initialized");

    let executor = Executor::new(
        config.executor.max_concurrent_jobs,
        config.executor.default_timeout_seconds,
        store.clone(),
    );

    // Periodically drop terminal records; the cleanup interval doubles as
    // the retention age.
    let cleanup_store = store.clone();
    let cleanup_every = Duration::from_secs(config.storage.cleanup_interval_hours * 3600);
    let max_age = chrono::Duration::hours(config.storage.cleanup_interval_hours as i64);
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(cleanup_every).await;
            let removed = cleanup_store.cleanup(max_age);
            if removed > 0 {
                info!(removed, "cleaned up old job records");
            }
        }
    });

    let state = Arc::new(AppState::new(
        executor.clone(),
        config.security.api_keys.clone(),
        VERSION,
    ));
    let app = server::router(state);

    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "execd listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("shutting down execd");
    if let Err(err) = executor.shutdown(SHUTDOWN_DEADLINE).await {
        warn!(error = %err, "executor shutdown incomplete");
    }
    info!("execd stopped");

    Ok(())
}

/// Resolve on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to install SIGINT handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
