//! # hermod-brokerd
//!
//! The broker daemon: loads configuration, opens the document store,
//! starts the dispatch engine, serves the HTTP/WebSocket surface, and runs
//! the shutdown/restart protocol on signals or control commands.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use hermod_broker::{
    BrokerHandler, Monitor, PeerRegistry, ProcessStateCache, ShutdownCoordinator, ShutdownKind,
};
use hermod_core::{factory, ProcessId, SchemaRegistry};
use hermod_server::{build_router, AppState, AuthService};
use hermod_store::{
    connection::ConnectionConfig, migrations, new_in_memory, new_with_path, Collection,
    DocumentStore,
};

/// Hermod broker daemon.
#[derive(Parser, Debug)]
#[command(name = "hermod-brokerd", about = "Hermod message broker")]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(long, default_value = "hermod.json")]
    config: PathBuf,

    /// Host to bind (overrides configuration).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides configuration).
    #[arg(long)]
    port: Option<u16>,

    /// The broker's own peer address (overrides configuration).
    #[arg(long)]
    address: Option<String>,

    /// Path to the `SQLite` database (overrides configuration).
    #[arg(long)]
    db_path: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let mut config = hermod_server::config::load_config(&cli.config)
        .with_context(|| format!("failed to load config from {}", cli.config.display()))?;
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(address) = cli.address {
        config.address = address;
    }
    if let Some(db_path) = cli.db_path {
        config.db_path = Some(db_path);
    }
    if config.address.is_empty() {
        anyhow::bail!("broker cannot start, missing address");
    }

    let process_id = ProcessId::new();
    info!(%process_id, address = %config.address, "starting broker");

    let pool = match &config.db_path {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            new_with_path(path, &ConnectionConfig::default())?
        }
        None => new_in_memory(&ConnectionConfig::default())?,
    };
    let conn = pool.get()?;
    migrations::run_migrations(&conn)?;
    let store = Arc::new(DocumentStore::new(pool));

    // Record this broker instance in the process collection.
    let instance_doc =
        factory::process_system_document(&process_id, &format!("Broker instance({})", config.address));
    let _ = store
        .persist(Collection::Process, &instance_doc.to_document(), None)
        .context("failed to record broker process document")?;

    let registry = Arc::new(PeerRegistry::new());
    let handler = Arc::new(BrokerHandler::new(
        process_id.clone(),
        config.address.clone(),
        registry.clone(),
        Arc::new(SchemaRegistry::builtin()),
        store.clone(),
        Arc::new(ProcessStateCache::new()),
    ));
    let (monitor, inbound) = Monitor::new(handler.clone());
    monitor
        .start()
        .map_err(|err| anyhow::anyhow!("failed to start the dispatch engine: {err}"))?;
    let monitor = Arc::new(monitor);

    let shutdown = Arc::new(ShutdownCoordinator::new());
    let state = AppState {
        registry,
        monitor: monitor.clone(),
        handler: handler.clone(),
        store: store.clone(),
        shutdown: shutdown.clone(),
        auth: Arc::new(AuthService::new(config.users.clone())),
        inbound,
        config: Arc::new(config.clone()),
        process_id: process_id.clone(),
        start_time: Instant::now(),
    };

    spawn_signal_handler(state.clone());

    let bind_addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    info!(addr = %listener.local_addr()?, "broker listening");

    let token = shutdown.listener_token();
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async move { token.cancelled().await })
        .await
        .context("server error")?;

    let exit_status = shutdown.exit_status();
    if shutdown.requested_kind() == Some(ShutdownKind::Restart) {
        respawn()?;
    }
    info!(exit_status, "broker exiting");
    std::process::exit(exit_status);
}

/// Trigger the shutdown sequence on ctrl-c or SIGTERM.
fn spawn_signal_handler(state: AppState) {
    let _ = tokio::spawn(async move {
        wait_for_termination_signal().await;
        info!("termination signal received");
        let _ = state
            .shutdown
            .execute(
                &state.monitor,
                &state.handler,
                &state.store,
                &state.process_id,
                ShutdownKind::Stop,
                "terminated by signal",
                "system",
            )
            .await;
    });
}

#[cfg(unix)]
async fn wait_for_termination_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(err) => {
            error!(error = %err, "failed to install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_termination_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

/// Spawn a replacement broker process and wait for it before exiting.
fn respawn() -> Result<()> {
    let exe = std::env::current_exe().context("failed to resolve current executable")?;
    info!(exe = %exe.display(), "restart requested, spawning new broker instance");
    let status = std::process::Command::new(exe)
        .args(std::env::args().skip(1))
        .spawn()
        .context("failed to spawn replacement broker")?
        .wait()
        .context("failed to wait on replacement broker")?;
    info!(code = ?status.code(), "replacement broker exited");
    Ok(())
}
