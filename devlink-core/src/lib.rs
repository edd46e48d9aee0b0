//! # devlink-core
//!
//! Device model for devlink.
//!
//! This crate provides:
//! - The `Device` entity (sensors and actuators) and its wire descriptor
//! - A fixed-capacity `DeviceRegistry` with positional id resync
//! - The `CommandTable` mapping user command names to callbacks

pub mod commands;
pub mod device;
pub mod error;
pub mod registry;

pub use commands::CommandTable;
pub use device::{Device, DeviceType, ValueSource};
pub use error::CoreError;
pub use registry::DeviceRegistry;

/// Hard maximum number of registered devices.
pub const MAX_DEVICES: usize = 32;

/// Highest device id the protocol can address.
pub const MAX_DEVICE_ID: u8 = 127;

/// Hard maximum number of user-registered commands.
pub const MAX_COMMANDS: usize = 16;

/// Longest accepted user command name.
pub const MAX_COMMAND_NAME: usize = 14;
