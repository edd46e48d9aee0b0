//! # devlink-runtime
//!
//! The tick-driven dispatch layer for devlink agents.
//!
//! This crate provides:
//! - The `Dispatcher`: protocol command interpretation, keep-alive
//!   tracking, and the periodic sensor sweep
//! - Runtime configuration (YAML file + environment overrides)
//! - Transport bindings: non-blocking TCP and an in-memory loopback
//! - The firmware-update collaborator contract
//!
//! Everything runs on one logical thread: one `tick` per scheduler
//! iteration drives transport polling, frame parsing, dispatch and the
//! sensor sweep. There is no preemption and no blocking I/O.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod loopback;
pub mod tcp;
pub mod update;

pub use config::{
    Config, ConfigError, KeepAliveConfig, NetworkConfig, ProtocolConfig, SensorConfig,
    StorageConfig,
};
pub use dispatcher::{CommandListener, Dispatcher, TickOutcome};
pub use error::RuntimeError;
pub use loopback::LoopbackTransport;
pub use tcp::TcpTransport;
pub use update::{FirmwareUpdater, UpdateError};
