//! Core error types.

use thiserror::Error;

/// Errors from the device registry and command table.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("device registry full: capacity {capacity}")]
    RegistryFull { capacity: usize },

    #[error("device id already registered: {id}")]
    DuplicateId { id: u8 },

    #[error("device not found: {id}")]
    NotFound { id: u8 },

    #[error("command table full: capacity {capacity}")]
    TableFull { capacity: usize },

    #[error("command name too long: {name:?} (max {max})")]
    NameTooLong { name: String, max: usize },

    #[error("id count mismatch: expected {expected}, got {actual}")]
    CountMismatch { expected: usize, actual: usize },

    #[error("device id out of range: {id} (max {max})")]
    IdOutOfRange { id: u8, max: u8 },
}
