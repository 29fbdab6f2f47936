//! fouracc-srv - FourAcc web service
//!
//! Startup: configuration, scratch root, session store, sweeper, listener.
//! Shutdown: listener drained, sweeper stopped and joined, scratch root
//! deleted.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use fouracc_common::config::{Config, ConfigOverrides};
use fouracc_common::dispatch::Dispatcher;
use fouracc_common::session::{create_scratch_root, SessionConfig, SessionStore};
use fouracc_srv::{build_router, AppState};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "fouracc-srv")]
#[command(about = "Chunked FFT analysis of acceleration recordings over HTTP")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "FOURACC_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Directory under which the scratch root is created
    #[arg(long)]
    scratch_parent: Option<PathBuf>,

    /// Identity lifetime in hours
    #[arg(long)]
    session_ttl_hours: Option<u64>,

    /// Seconds between two sweeps of expired identities
    #[arg(long)]
    sweep_interval_secs: Option<u64>,

    /// Upload size limit in bytes
    #[arg(long)]
    max_upload_bytes: Option<usize>,

    /// Log level when RUST_LOG is not set
    #[arg(long)]
    log_level: Option<String>,
}

impl From<Args> for ConfigOverrides {
    fn from(args: Args) -> Self {
        ConfigOverrides {
            config_file: args.config,
            listen: args.listen,
            scratch_parent: args.scratch_parent,
            session_ttl_hours: args.session_ttl_hours,
            sweep_interval_secs: args.sweep_interval_secs,
            max_upload_bytes: args.max_upload_bytes,
            log_level: args.log_level,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::resolve(args.into()).context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting FourAcc server (fouracc-srv) v{}", env!("CARGO_PKG_VERSION"));

    let root = create_scratch_root(&config.scratch_parent)
        .await
        .with_context(|| format!("Failed to create scratch root under {:?}", config.scratch_parent))?;
    info!("Scratch root: {}", root.display());

    let store = SessionStore::open(
        root,
        SessionConfig {
            ttl: config.session_ttl,
            sweep_interval: config.sweep_interval,
        },
    )
    .await
    .context("Failed to open session store")?;

    let sweeper = store.spawn_sweeper();
    let state = AppState::new(store.clone(), Dispatcher::default(), config.max_upload_bytes);
    let app = build_router(state);

    let served = serve(app, config.listen).await;

    if let Err(err) = sweeper.shutdown().await {
        error!("Session sweeper did not stop cleanly: {}", err);
    }
    if let Err(err) = store.purge_root().await {
        warn!("Could not remove scratch root {}: {}", store.root().display(), err);
    }

    served?;
    info!("Server shutdown complete");
    Ok(())
}

async fn serve(app: axum::Router, addr: SocketAddr) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("fouracc-srv listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                error!("Failed to install terminate handler: {}", err);
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
