//! Upload admission gateway.
//!
//! Gates every inbound upload request (blacklist, credential
//! classification, rate limiting, concurrency slots) before the costly
//! work (decoding, conversion, moderation, persistence) starts on the
//! backend it forwards to.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌────────────────────────────────────────────────┐
//!                     │                  UPLOAD GATE                    │
//!                     │                                                 │
//!   Upload request    │  ┌───────────┐   ┌───────────┐   ┌──────────┐  │
//!   ──────────────────┼─▶│ blacklist │──▶│ classify  │──▶│   rate   │  │
//!                     │  │   gate    │   │ (public/  │   │  window  │  │
//!                     │  └───────────┘   │  private) │   └────┬─────┘  │
//!                     │                  └───────────┘        │        │
//!                     │                                       ▼        │
//!                     │  ┌───────────┐                 ┌──────────┐    │
//!   Response          │  │ upstream  │◀────────────────│   slot   │    │
//!   ◀─────────────────┼──│ forwarder │   permit held   │ acquire  │    │
//!                     │  └───────────┘                 └──────────┘    │
//!                     │                                                 │
//!                     │  settings store (policies, secret) · blacklist  │
//!                     │  store · config · lifecycle · observability     │
//!                     └────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use upload_gate::admission::{self, AdmissionService, Blacklist};
use upload_gate::auth::{secret, CredentialVerifier};
use upload_gate::config::{loader, watcher, GateConfig};
use upload_gate::http::GateServer;
use upload_gate::lifecycle::{shutdown, Shutdown};
use upload_gate::observability::metrics;
use upload_gate::store::SettingStore;

#[derive(Parser)]
#[command(name = "upload-gate")]
#[command(about = "Admission gateway for image upload services", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "gate.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing subscriber
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "upload_gate=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("upload-gate v{} starting", env!("CARGO_PKG_VERSION"));

    let config = if cli.config.exists() {
        loader::load_config(&cli.config)?
    } else {
        tracing::warn!(path = ?cli.config, "Config file not found, using defaults");
        GateConfig::default()
    };

    tracing::info!(
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.address,
        environment = ?config.environment,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    // Stores
    let data_dir = Path::new(&config.storage.data_dir);
    std::fs::create_dir_all(data_dir)?;
    let settings = Arc::new(SettingStore::open(&data_dir.join("settings.json"))?);
    admission::seed_default_policies(&settings)?;
    let blacklist = Arc::new(Blacklist::open(&data_dir.join("blacklist.json")));

    // Credentials
    let signing_secret = secret::init_secret(&settings, config.environment)?;
    let verifier = Arc::new(CredentialVerifier::new(&signing_secret));

    // Admission state and background sweep
    let admission_service = Arc::new(AdmissionService::new(settings, blacklist, verifier));
    let coordinator = Shutdown::new();
    let sweeper = admission_service.spawn_sweeper(coordinator.subscribe());

    // Config hot reload
    let (config_tx, config_updates) = mpsc::unbounded_channel();
    let _watcher = if cli.config.exists() {
        match watcher::watch_config(cli.config.clone(), config_tx) {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                tracing::error!(error = %e, "Config watcher failed to start");
                None
            }
        }
    } else {
        None
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let server = GateServer::new(config, Arc::clone(&admission_service));

    let server_shutdown = coordinator.subscribe();
    let server_task =
        tokio::spawn(async move { server.run(listener, config_updates, server_shutdown).await });

    shutdown::trigger_on_ctrl_c(&coordinator).await;

    server_task.await??;
    let _ = sweeper.await;

    tracing::info!("Shutdown complete");
    Ok(())
}
