//! Runtime error types.

use thiserror::Error;

/// Errors surfaced by the dispatcher.
///
/// Frame-level failures (overflow, timeout, malformed tokens) never reach
/// this type: they are recovered inside the tick and the next frame starts
/// clean. What propagates here is genuine I/O or storage failure.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("frame error: {0}")]
    Frame(#[from] devlink_protocol::FrameError),

    #[error("core error: {0}")]
    Core(#[from] devlink_core::CoreError),

    #[error("storage error: {0}")]
    Storage(#[from] devlink_storage::StorageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
