//! # devlink-protocol
//!
//! Wire protocol implementation for devlink (DLP - devlink protocol).
//!
//! This crate provides:
//! - Token framing with start/end markers and a fixed-capacity receive buffer
//! - `Command` message values with correlation ids
//! - Typed payload readers (strings, integers, floats, value lists)
//! - The byte-transport contract implemented by concrete bindings

pub mod command;
pub mod error;
pub mod frame;
pub mod transport;

pub use command::{Command, CommandType, ResponseStatus, Value};
pub use error::FrameError;
pub use frame::FrameCodec;
pub use transport::Transport;

/// Protocol version supported by this implementation.
pub const PROTOCOL_VERSION: u16 = 1;

/// Default TCP port a devlink agent listens on.
pub const DEFAULT_PORT: u16 = 8182;

/// Frame start marker.
pub const FRAME_START: u8 = b'<';

/// Frame end / acknowledge marker.
pub const FRAME_END: u8 = b'>';

/// Token separator inside a frame.
pub const TOKEN_SEP: u8 = b':';

/// Separator between entries of a value list.
pub const LIST_SEP: u8 = b',';

/// Terminator of a value list, distinct from the frame end marker so a
/// frame can carry several lists.
pub const LIST_END: u8 = b';';

/// Capacity of the fixed receive buffer. A frame that exceeds this before
/// its end marker is discarded with an overflow error; there is no growth.
pub const FRAME_BUFFER_SIZE: usize = 128;

/// Default per-byte wait inside `parse` before a partial frame is abandoned.
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 100;
