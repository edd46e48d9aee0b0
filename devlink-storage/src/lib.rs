//! # devlink-storage
//!
//! Persisted module configuration for devlink agents: the small fixed
//! record (module name, device-id list, controller address) an agent
//! reloads across restarts. The core only ever touches the device-id list
//! (on id resync); the rest is opaque pass-through for the binary.

pub mod error;
pub mod store;

pub use error::StorageError;
pub use store::{ConfigRecord, ConfigStore, FileStore, MemoryStore};
