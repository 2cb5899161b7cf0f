//! bidaudit-server - Bid document audit backend
//!
//! REST + SSE service under `/api/app`: projects, extracted fields, supporting
//! files, audit rules (synced from the data hub), audit sessions and risks.
//! Document parsing, extraction and audits are delegated to the agent platform.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use bidaudit_common::config::AppConfig;
use bidaudit_common::db::init_database;
use bidaudit_common::kv_store::JsonFileStore;
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bidaudit_server::services::{AgentGateway, TaskCenter};
use bidaudit_server::AppState;

/// Command-line arguments for bidaudit-server
#[derive(Parser, Debug)]
#[command(name = "bidaudit-server")]
#[command(about = "Bid document audit backend")]
#[command(version)]
struct Args {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides PORT and the config file)
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,bidaudit_server=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    info!(
        "Starting bidaudit-server v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let mut config = AppConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let db_pool = init_database(&config.database)
        .await
        .context("Failed to initialize database")?;
    info!("Database ready at {}:{}/{}", config.database.host, config.database.port, config.database.name);

    let task_store = JsonFileStore::open(config.storage.data_dir.join("tasks.json"))
        .context("Failed to open task store")?;
    info!("Task store: {}", task_store.path().display());
    let tasks = TaskCenter::open(Arc::new(task_store)).context("Failed to load tasks")?;

    let agent = AgentGateway::new(config.agent.clone()).context("Failed to build agent client")?;
    if config.data_hub.host.is_none() || config.data_hub.token.is_none() {
        tracing::warn!("Data hub not configured; rule sync will be unavailable");
    }

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid listen address")?;

    let state = AppState::new(db_pool, config, Arc::new(agent), tasks);
    let app = bidaudit_server::build_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/api/app/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
