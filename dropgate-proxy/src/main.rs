//! Dropgate Proxy Engine
//!
//! Loads the configuration, connects to the coordination service, keeps the
//! whitelist fresh in the background and answers routing decisions over HTTP.

#![deny(missing_docs)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use dropgate_core::{
    spawn_refresher, LockClient, RefreshScheduler, SelectionFilter, SystemClock, WhitelistRefresher,
    WhitelistStore,
};
use tokio::sync::watch;
use tracing::{info, warn};

mod backends;
mod config;
mod logging;
mod server;

use backends::BackendPool;
use config::ProxyConfig;
use server::AppState;

/// Whitelist-gated load balancer front end.
#[derive(Debug, Parser)]
#[command(name = "dropgate-proxy", version)]
struct Args {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "dropgate.yaml")]
    config: PathBuf,

    /// Override the listen address from the configuration file.
    #[arg(short, long)]
    listen: Option<SocketAddr>,
}

/// The primary entrypoint for the Dropgate proxy.
///
/// The coordination service must be reachable at start-up; without it the
/// whitelist can never be loaded, so the process refuses to serve.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut config = ProxyConfig::load(&args.config)?;
    if let Some(listen) = args.listen {
        config.listen = listen;
    }

    logging::init_logging(&config.log_filter)?;
    info!(
        config = %args.config.display(),
        backends = config.backends.len(),
        "Starting Dropgate proxy"
    );

    let store = Arc::new(
        WhitelistStore::new(&config.gate.whitelist)
            .with_path_aliases(config.gate.selection.path_aliases.clone()),
    );
    let scheduler = Arc::new(RefreshScheduler::new(
        &config.gate.refresh,
        Arc::new(SystemClock),
    ));
    let filter = Arc::new(SelectionFilter::new(
        store.clone(),
        scheduler.clone(),
        &config.gate.selection,
    ));

    let lock = LockClient::connect(&config.gate.lock)
        .await
        .context("coordination service unreachable at startup")?;
    let mut refresher = WhitelistRefresher::new(store, lock, &config.gate.whitelist.path);
    if let Err(err) = refresher.refresh_once().await {
        warn!(%err, "Initial whitelist load failed, requests are unrestricted until the next refresh");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let refresher_task = spawn_refresher(refresher, scheduler, shutdown_rx.clone());

    let state = AppState {
        filter,
        pool: Arc::new(BackendPool::from_config(&config.backends)),
    };
    let mut server = tokio::spawn(server::start_server(config.listen, state, shutdown_rx));

    let finished = tokio::select! {
        result = &mut server => Some(result),
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for shutdown signal")?;
            None
        }
    };

    info!("Shutting down");
    let _ = shutdown_tx.send(true);

    let server_result = match finished {
        Some(result) => result,
        None => server.await,
    };
    server_result.context("server task failed")??;

    let refresher = refresher_task.await.context("refresher task failed")?;
    info!(stats = ?refresher.stats(), "Shut down gracefully");
    Ok(())
}
