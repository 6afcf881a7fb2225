use anyhow::Result;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use watchpost_store::CredentialStore;

mod app;
mod config;
mod dbus_interface;
mod engine;
mod session;
mod telemetry;

use app::App;
use config::Config;
use dbus_interface::StationService;
use engine::{spawn_engine, EngineConfig};
use telemetry::{TelemetryClient, TelemetryPoller};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("watchpostd starting");

    let cfg = Config::from_env();
    std::fs::create_dir_all(&cfg.data_dir)?;
    let store = CredentialStore::open(cfg.users_path());

    let engine = spawn_engine(EngineConfig {
        camera_device: cfg.camera_device.clone(),
        detector_model: cfg.detector_model_path(),
        face_locator_model: cfg.face_locator_model_path(),
        face_encoder_model: cfg.face_encoder_model_path(),
    });

    let client = TelemetryClient::new(
        &cfg.telemetry_base,
        &cfg.telemetry_user,
        &cfg.telemetry_password,
        Duration::from_secs(cfg.telemetry_timeout_secs),
    );
    let poller = TelemetryPoller::spawn(
        client,
        cfg.telemetry_device.clone(),
        Duration::from_secs(cfg.telemetry_poll_secs),
    );

    let app = App::new(store, engine, cfg.page_size, cfg.match_threshold);
    let service = StationService::new(app, poller);

    let _connection = zbus::connection::Builder::session()?
        .name("org.watchpost.Station1")?
        .serve_at("/org/watchpost/Station1", service)?
        .build()
        .await?;

    tracing::info!("watchpostd ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("watchpostd shutting down");
    // Dropping the connection releases the service; the poller task is
    // aborted by its Drop and the engine thread winds down with its queue.
    Ok(())
}
