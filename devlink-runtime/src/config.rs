//! Runtime configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via DEVLINK_CONFIG)
//! 3. Environment variables

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Agent configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Network configuration.
    pub network: NetworkConfig,
    /// Protocol timing.
    pub protocol: ProtocolConfig,
    /// Keep-alive configuration.
    pub keep_alive: KeepAliveConfig,
    /// Sensor sweep configuration.
    pub sensors: SensorConfig,
    /// Storage configuration.
    pub storage: StorageConfig,
}

impl Config {
    /// Loads configuration from file, then applies environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("DEVLINK_CONFIG") {
            config = Self::from_file(&path)?;
        }

        config.apply_env_overrides();
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        self.network.apply_env_overrides();
        self.protocol.apply_env_overrides();
        self.keep_alive.apply_env_overrides();
        self.sensors.apply_env_overrides();
        self.storage.apply_env_overrides();
    }
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address the agent listens on for a controller connection.
    pub listen_addr: SocketAddr,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_addr: ([0, 0, 0, 0], devlink_protocol::DEFAULT_PORT).into(),
        }
    }
}

impl NetworkConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(addr) = std::env::var("DEVLINK_LISTEN") {
            if let Ok(parsed) = addr.parse() {
                self.listen_addr = parsed;
            }
        }
    }
}

/// Protocol timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Per-byte wait inside a frame parse, in milliseconds. Keep short:
    /// the wait busy-polls and stalls the whole tick.
    pub read_timeout_ms: u64,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            read_timeout_ms: devlink_protocol::DEFAULT_READ_TIMEOUT_MS,
        }
    }
}

impl ProtocolConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(ms) = std::env::var("DEVLINK_READ_TIMEOUT_MS") {
            if let Ok(parsed) = ms.parse() {
                self.read_timeout_ms = parsed;
            }
        }
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// Keep-alive configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeepAliveConfig {
    /// Whether the agent originates PING_REQUEST heartbeats. Leave off
    /// when the controller side owns the heartbeat.
    pub enabled: bool,
    /// Silence interval before a heartbeat is sent, in milliseconds.
    pub interval_ms: u64,
    /// Consecutive misses before the link counts as down.
    pub miss_threshold: u32,
}

impl Default for KeepAliveConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_ms: 15_000,
            miss_threshold: 3,
        }
    }
}

impl KeepAliveConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(enabled) = std::env::var("DEVLINK_KEEPALIVE") {
            if let Ok(parsed) = enabled.parse() {
                self.enabled = parsed;
            }
        }
        if let Ok(ms) = std::env::var("DEVLINK_KEEPALIVE_INTERVAL_MS") {
            if let Ok(parsed) = ms.parse() {
                self.interval_ms = parsed;
            }
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Sensor sweep configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// Interval between sweeps of the sensor set, in milliseconds.
    pub sweep_interval_ms: u64,
    /// Minimum interval between change notifications, in milliseconds.
    /// Bounds the flood from a noisy input.
    pub debounce_ms: u64,
    /// Whether a sensor change drives its bonded actuator.
    pub auto_control: bool,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            sweep_interval_ms: 100,
            debounce_ms: 50,
            auto_control: false,
        }
    }
}

impl SensorConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(enabled) = std::env::var("DEVLINK_AUTO_CONTROL") {
            if let Ok(parsed) = enabled.parse() {
                self.auto_control = parsed;
            }
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the persisted module record.
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
        }
    }
}

impl StorageConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("DEVLINK_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
    }

    /// Path of the module record file.
    pub fn record_path(&self) -> PathBuf {
        self.data_dir.join("module.json")
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {0}: {1}")]
    IoError(PathBuf, std::io::Error),

    #[error("failed to parse config {0}: {1}")]
    ParseError(PathBuf, String),
}
