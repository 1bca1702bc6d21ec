//! mmc-api - Media metadata catalog HTTP service
//!
//! Serves the authenticated `/v2/` API over the catalog database, the
//! `/_info` probe, and forwards catalog events to the configured notifier.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use mmc_common::api::parse_client_keys;
use mmc_common::config::{Config, ConfigLayer};
use mmc_common::events::{EventBus, Notifier};
use mmc_common::rdf::RdfContext;
use mmc_common::Store;
use mmc_api::{build_router, AppState, SYSTEM_NAME};
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Capacity of the catalog event bus
const EVENT_BUS_CAPACITY: usize = 256;

/// Command-line arguments for mmc-api
#[derive(Parser, Debug)]
#[command(name = "mmc-api")]
#[command(about = "Media metadata catalog HTTP service")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,

    /// SQLite database file
    #[arg(long, env = "MMC_DB_PATH")]
    db_path: Option<PathBuf>,

    /// Client keys, `system:env=key[;system:env=key]*`
    #[arg(long, env = "CLIENT_KEYS", hide_env_values = true)]
    client_keys: Option<String>,

    /// Canonical origin of the media manager (event URLs, RDF URIs)
    #[arg(long, env = "MEDIA_MANAGER")]
    media_manager: Option<String>,

    /// Endpoint catalog events are POSTed to
    #[arg(long, env = "NOTIFIER_ENDPOINT")]
    notifier_endpoint: Option<String>,

    /// How long a write waits for the database before failing
    #[arg(long, env = "MMC_BUSY_TIMEOUT_MS")]
    busy_timeout_ms: Option<u64>,

    /// RDF export file served at /v2/export
    #[arg(long, env = "MMC_EXPORT_PATH")]
    export_path: Option<PathBuf>,

    /// TOML config file
    #[arg(short, long, env = "MMC_CONFIG")]
    config: Option<PathBuf>,
}

impl Args {
    fn layer(&self) -> ConfigLayer {
        ConfigLayer {
            port: self.port,
            db_path: self.db_path.clone(),
            client_keys: self.client_keys.clone(),
            media_manager: self.media_manager.clone(),
            notifier_endpoint: self.notifier_endpoint.clone(),
            busy_timeout_ms: self.busy_timeout_ms,
            export_path: self.export_path.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mmc_api=info,mmc_common=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting {} v{}", SYSTEM_NAME, env!("CARGO_PKG_VERSION"));

    let args = Args::parse();
    let config = Config::resolve(args.layer(), args.config.as_deref())
        .context("Failed to load configuration")?;

    let client_keys =
        parse_client_keys(&config.client_keys).context("Failed to parse CLIENT_KEYS")?;
    if client_keys.is_empty() {
        warn!("No client keys configured; every authenticated endpoint will answer 401");
    } else {
        info!("Loaded {} client keys", client_keys.len());
    }

    let events = EventBus::new(EVENT_BUS_CAPACITY);
    let store = Store::open(&config.db_path, config.busy_timeout, events.clone())
        .await
        .with_context(|| format!("Failed to open database {}", config.db_path.display()))?;
    info!("✓ Database ready: {}", config.db_path.display());

    let notifier = Notifier::new(
        config.notifier_endpoint.clone(),
        SYSTEM_NAME,
        config.media_manager.clone(),
    )?;
    let _notifier_task = notifier.spawn(&events);

    let rdf = RdfContext::new(&config.media_manager)?;
    let state = AppState::new(store, client_keys, rdf, config.export_path.clone());
    let app = build_router(state).layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("{} listening on http://{}", SYSTEM_NAME, addr);

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
            warn!("Failed to listen for Ctrl+C: {}", e);
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
                warn!("Failed to install SIGTERM handler: {}", e);
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
