//! Framing and token-decoding errors.

use thiserror::Error;

/// Errors produced while extracting a frame or decoding its tokens.
///
/// All variants are recovered locally: the codec returns to a clean idle
/// state and the next `parse` starts from an empty buffer. The remote peer
/// is responsible for resending.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The frame exceeded the receive buffer before its end marker.
    /// The buffered bytes were discarded.
    #[error("frame exceeded {capacity}-byte buffer before end marker")]
    Overflow { capacity: usize },

    /// No byte arrived for the configured read timeout mid-frame.
    /// The partial frame was discarded.
    #[error("read timed out after {waited_ms}ms mid-frame")]
    Timeout { waited_ms: u64 },

    /// A token could not be decoded as the type its position requires.
    /// Distinguished from [`FrameError::MissingToken`]: the token was
    /// present but undecodable.
    #[error("malformed token: expected {expected}, got {token:?}")]
    Malformed {
        expected: &'static str,
        token: String,
    },

    /// A required token was absent (the frame ended early).
    #[error("missing token: expected {expected}")]
    MissingToken { expected: &'static str },

    /// The transport failed while writing.
    #[error("transport write failed: {0}")]
    Io(#[from] std::io::Error),
}
