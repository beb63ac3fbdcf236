use std::process::ExitCode;
use std::sync::Arc;

use rexagon_market::Orchestrator;
use rexagon_market::api::{self, AppState};
use rexagon_market::config::{Config, ConfigError};
use rexagon_market::csv::{SnapshotError, SnapshotRow, import, read_items, read_users};
use rexagon_market::store::MemoryStore;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Error)]
enum StartupError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("snapshot: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("server: {0}")]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() -> ExitCode {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), StartupError> {
    let config = Config::from_env()?;

    let store = Arc::new(MemoryStore::new());
    load_snapshots(&config, &store).await?;

    let orchestrator = Orchestrator::new(store, config.retry_policy());
    let state = Arc::new(AppState::new(orchestrator, config.jwt_secret.clone()));

    let listener = TcpListener::bind(config.bind_addr()).await?;
    info!(addr = %config.bind_addr(), "marketplace listening");
    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("marketplace stopped");
    Ok(())
}

/// Stream the configured csv snapshots into the store. A missing file fails
/// startup; bad rows are logged and skipped.
async fn load_snapshots(config: &Config, store: &MemoryStore) -> Result<(), StartupError> {
    let users = config.users_csv.clone().map(|path| read_users(path)).transpose()?;
    let items = config.items_csv.clone().map(|path| read_items(path)).transpose()?;
    if users.is_none() && items.is_none() {
        return Ok(());
    }

    let (row_sender, row_receiver) = tokio::sync::mpsc::channel(64);

    tokio::spawn(async move {
        let users = users.into_iter().flatten().map(|r| r.map(SnapshotRow::User));
        let items = items.into_iter().flatten().map(|r| r.map(SnapshotRow::Item));
        for result in users.chain(items) {
            match result {
                Ok(row) => {
                    if row_sender.send(row).await.is_err() {
                        return;
                    }
                }
                Err(e) => {
                    warn!("{e}");
                }
            }
        }
    });

    import(store, ReceiverStream::new(row_receiver)).await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
