//! Storage error types.

use thiserror::Error;

/// Errors from loading or saving the module record.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("record serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
