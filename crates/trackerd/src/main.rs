//! trackerd - GT06 tracker server daemon
//!
//! Accepts GT06 device connections and serves a small HTTP surface for
//! relay commands and live events.
//!
//! # Usage
//!
//! ```bash
//! trackerd --config config/trackerd.toml
//! trackerd --bind 0.0.0.0:5023 --http 127.0.0.1:8080
//! ```

use std::future::IntoFuture;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use fleet_core::memory::{InMemoryDeviceRegistry, InMemoryRecordStore};
use gt06_server::publisher::log_events;
use gt06_server::{
    AlertGate, BroadcastPublisher, Collaborators, ConnectionRegistry, ControlClient, DeviceListener, LogAlertSink,
    ServerConfig, SessionManager, TimeoutMonitor,
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod http;

const DEFAULT_LOG_FILTER: &str = "trackerd=info,gt06_server=info,gt06_codec=info,fleet_core=info";

#[derive(Parser, Debug)]
#[command(name = "trackerd")]
#[command(about = "GT06 GPS tracker server")]
struct Args {
    /// Configuration file path (TOML format)
    #[arg(short, long, env = "TRACKERD_CONFIG")]
    config: Option<PathBuf>,

    /// Device listen address, overrides [server].bind
    #[arg(long)]
    bind: Option<String>,

    /// HTTP listen address
    #[arg(long, default_value = "127.0.0.1:8080")]
    http: String,

    /// Log as JSON lines
    #[arg(long)]
    log_json: bool,
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    let mut config = match &args.config {
        Some(path) => {
            info!(path = %path.display(), "Loading config");
            ServerConfig::load(path).with_context(|| format!("Failed to load config {}", path.display()))?
        }
        None => {
            info!("No config file provided, using defaults");
            ServerConfig::default()
        }
    };
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if config.devices.is_empty() {
        warn!("No devices configured, every login will be rejected");
    }
    if config.pipeline.bounds.is_global() {
        warn!("pipeline.bounds covers the whole globe, the bounding-box filter rejects nothing");
    }

    // Collaborators
    let devices = Arc::new(InMemoryDeviceRegistry::with_vehicles(config.vehicles()));
    let records = Arc::new(InMemoryRecordStore::default());
    let publisher = BroadcastPublisher::default();
    let alerts = Arc::new(AlertGate::new(
        devices.clone(),
        records.clone(),
        Arc::new(LogAlertSink),
        &config.alerts,
    ));

    // Core
    let registry = Arc::new(ConnectionRegistry::new());
    let sessions = Arc::new(SessionManager::new(
        config.session.clone(),
        config.pipeline.clone(),
        Collaborators {
            devices: devices.clone(),
            records: records.clone(),
            gate: alerts.clone(),
            publisher: Arc::new(publisher.clone()),
        },
        registry.clone(),
    ));
    let control = Arc::new(ControlClient::new(registry.clone(), &config.control));
    let monitor = Arc::new(TimeoutMonitor::new(
        devices,
        records,
        Arc::new(publisher.clone()),
        config.monitor.clone(),
    ));

    // Background tasks
    let _monitor_task = monitor.spawn();
    let _cleanup_task = alerts.spawn_cleanup(Duration::from_secs(config.alerts.cleanup_interval_secs));
    let _logger_task = tokio::spawn(log_events(publisher.subscribe()));

    let device_listener = DeviceListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind device listener on {}", config.server.bind))?;

    let app = http::create_router(http::AppState::new(control, registry, publisher));
    let http_listener = tokio::net::TcpListener::bind(&args.http)
        .await
        .with_context(|| format!("Failed to bind HTTP listener on {}", args.http))?;
    info!("Listening on http://{}", http_listener.local_addr()?);

    tokio::select! {
        _ = device_listener.run(sessions) => {}
        result = axum::serve(http_listener, app).into_future() => result.context("HTTP server failed")?,
        _ = tokio::signal::ctrl_c() => info!("Shutting down"),
    }

    Ok(())
}
