//! devlink - device-link protocol agent
//!
//! Listens for a controller connection and drives the tick loop: frame
//! parsing, command dispatch, keep-alive and the sensor sweep.

use devlink_core::{CommandTable, Device, DeviceRegistry};
use devlink_protocol::FrameCodec;
use devlink_runtime::{Config, Dispatcher, TcpTransport};
use devlink_storage::FileStore;
use std::io::ErrorKind;
use std::net::TcpListener;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

/// Exit code for a controller-requested reset; the supervisor restarts us.
const RESET_EXIT_CODE: i32 = 3;

/// Idle pause between scheduler ticks.
const TICK_INTERVAL: Duration = Duration::from_millis(5);

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration (from file if DEVLINK_CONFIG is set, then env overrides)
    let config = match Config::load() {
        Ok(c) => {
            if let Ok(path) = std::env::var("DEVLINK_CONFIG") {
                tracing::info!("Loaded config from {path}");
            }
            c
        }
        Err(e) => {
            // If a config file was explicitly specified, fail on error
            if std::env::var("DEVLINK_CONFIG").is_ok() {
                tracing::error!("Failed to load config: {e}");
                return Err(e.into());
            }
            tracing::info!("Using default configuration");
            Config::default()
        }
    };

    tracing::info!("Starting devlink agent");
    tracing::info!("  Listen address: {}", config.network.listen_addr);
    tracing::info!("  Data directory: {}", config.storage.data_dir.display());
    if config.keep_alive.enabled {
        tracing::info!(
            "  Keep-alive: enabled ({}ms interval)",
            config.keep_alive.interval_ms
        );
    } else {
        tracing::info!("  Keep-alive: disabled (controller owns the heartbeat)");
    }

    std::fs::create_dir_all(&config.storage.data_dir)?;

    let listener = TcpListener::bind(config.network.listen_addr)?;
    listener.set_nonblocking(true)?;

    let started = Instant::now();
    loop {
        match listener.accept() {
            Ok((stream, _peer)) => {
                let transport = TcpTransport::from_stream(stream)?;
                let reset = serve(transport, &config, started)?;
                if reset {
                    tracing::info!("Restarting on controller request");
                    std::process::exit(RESET_EXIT_CODE);
                }
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Drives one controller connection until it drops or requests a reset.
/// Returns whether a reset was requested.
fn serve(
    transport: TcpTransport,
    config: &Config,
    started: Instant,
) -> Result<bool, Box<dyn std::error::Error>> {
    let codec = FrameCodec::new(transport).with_read_timeout(config.protocol.read_timeout());
    let store = FileStore::open(config.storage.record_path())?;

    let mut registry = DeviceRegistry::new();
    registry.add(Device::custom_sensor(
        "uptime",
        Box::new(move || started.elapsed().as_secs() as i64),
    ))?;

    let mut dispatcher = Dispatcher::new(codec, registry, CommandTable::new(), store)
        .with_keep_alive(&config.keep_alive)
        .with_sensor_settings(&config.sensors);
    dispatcher
        .commands_mut()
        .register("hello", Box::new(|| tracing::info!("controller said hello")))?;
    dispatcher.load_saved_ids()?;

    loop {
        let outcome = dispatcher.tick(Instant::now())?;
        if outcome.reset {
            return Ok(true);
        }
        if !dispatcher.is_connected() {
            tracing::info!("Controller connection closed");
            return Ok(false);
        }
        if !outcome.handled {
            std::thread::sleep(TICK_INTERVAL);
        }
    }
}
