//! Warden Daemon - Main entry point
//!
//! Loads configuration, opens the stores, starts the engine and serves IPC.

use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use warden_core::SystemClock;
use warden_daemon::{
    engine, ConfiguredInspector, DaemonConfig, EngineDeps, EngineSettings, IpcServer,
    JsonEntryStore, ReportedDeviceState, SecretVault,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warden_daemon=info,warden_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Warden daemon v{}", env!("CARGO_PKG_VERSION"));

    // Load or create config
    let config_path = DaemonConfig::default_path();
    let existed = config_path.exists();
    let config = DaemonConfig::load_or_create(&config_path)?;
    if !existed {
        info!("Created default config at {:?}", config_path);
    }

    // Ensure directories exist
    config.ensure_directories()?;

    // Initialize components
    let deps = EngineDeps {
        store: Arc::new(JsonEntryStore::open(config.entry_store_path.clone())?),
        inspector: Arc::new(ConfiguredInspector::from_config(&config)),
        device: Arc::new(ReportedDeviceState::default()),
        vault: SecretVault::new(config.secret_path.clone()),
        clock: Arc::new(SystemClock),
    };
    let (engine, engine_task) = engine::spawn(EngineSettings::from_config(&config), deps)?;

    let ipc_server = IpcServer::new(config.ipc_socket_path.clone(), engine)
        .with_config_file(config_path, config);

    // Start IPC server
    let ipc_handle = tokio::spawn(async move {
        if let Err(e) = ipc_server.run().await {
            error!("IPC server error: {}", e);
        }
    });

    info!("Daemon started successfully");

    // Wait for shutdown signal
    let outcome = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
            Ok(())
        }
        result = engine_task => {
            match result {
                Ok(Ok(())) => Err(anyhow::anyhow!("Engine exited unexpectedly")),
                Ok(Err(e)) => Err(anyhow::Error::new(e).context("Engine stopped")),
                Err(e) => Err(anyhow::Error::new(e).context("Engine task failed")),
            }
        }
        _ = ipc_handle => Err(anyhow::anyhow!("IPC server exited unexpectedly")),
    };

    if let Err(e) = &outcome {
        error!("{:#}", e);
    }
    info!("Daemon shutting down");

    outcome
}
