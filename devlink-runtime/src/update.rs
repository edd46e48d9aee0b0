//! Firmware-update collaborator contract.
//!
//! Over-the-air update is an external concern invoked from the dispatch
//! loop; the core only needs this trait. An agent without an updater
//! replies NOT_IMPLEMENTED to FIRMWARE_UPDATE.

use thiserror::Error;

/// Errors from a firmware update attempt.
#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("firmware update failed: {0}")]
    Failed(String),
}

/// External firmware-update collaborator.
pub trait FirmwareUpdater {
    /// Fetches and applies a firmware image named by `source` (a URL or
    /// identifier read from the request frame). On success the dispatcher
    /// replies SUCCESS and requests a reset.
    fn update_from(&mut self, source: &str) -> Result<(), UpdateError>;
}
