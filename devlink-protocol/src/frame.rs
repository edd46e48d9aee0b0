//! Token framing engine.
//!
//! Frame layout (all tokens textual, decimal for numbers):
//!
//! ```text
//! +-------+------+-----+----+-----+-----------+-----+-------+---------+-----+
//! | START | type | SEP | id | SEP | device_id | SEP | value | payload | END |
//! +-------+------+-----+----+-----+-----------+-----+-------+---------+-----+
//! ```
//!
//! Payload tokens (names, strings, value lists) follow the fixed header and
//! are pulled by the caller through the typed readers. A value list is
//! comma-separated and closed by [`LIST_END`], distinct from the frame end
//! marker, so one frame can carry several lists.
//!
//! Frames are assembled incrementally because bytes trickle in with
//! arbitrary inter-byte delay; the per-byte read timeout stops a stalled
//! peer from occupying the buffer forever, and the overflow flag stops a
//! broken peer from overrunning the fixed-capacity buffer.

use crate::command::{Command, CommandType, Value};
use crate::error::FrameError;
use crate::transport::Transport;
use crate::{
    DEFAULT_READ_TIMEOUT_MS, FRAME_BUFFER_SIZE, FRAME_END, FRAME_START, LIST_END, LIST_SEP,
    TOKEN_SEP,
};
use bytes::{BufMut, BytesMut};
use std::fmt::Display;
use std::str::FromStr;
use std::time::{Duration, Instant};

/// Encodes a command into one complete frame.
pub fn encode(cmd: &Command) -> BytesMut {
    let mut buf = BytesMut::with_capacity(32);
    buf.put_u8(FRAME_START);
    put_display(&mut buf, cmd.kind.code());
    buf.put_u8(TOKEN_SEP);
    put_display(&mut buf, cmd.id);
    buf.put_u8(TOKEN_SEP);
    put_display(&mut buf, cmd.device_id);
    buf.put_u8(TOKEN_SEP);
    put_display(&mut buf, cmd.value);
    buf.put_u8(FRAME_END);
    buf
}

fn put_display(buf: &mut BytesMut, v: impl Display) {
    use std::fmt::Write;
    // Formatting into BytesMut cannot fail.
    let _ = write!(buf, "{v}");
}

/// The framing codec: turns transport bytes into [`Command`] values and
/// commands back into bytes.
///
/// Owns the fixed-capacity receive buffer, the read cursor for payload
/// readers, the overflow flag and the per-byte read timeout. Exactly one
/// decoded command is live at a time; callers must consume its extra
/// payload before the next `parse` overwrites the buffer.
pub struct FrameCodec<T: Transport> {
    transport: T,
    buffer: [u8; FRAME_BUFFER_SIZE],
    end_offset: usize,
    read_cursor: usize,
    overflowed: bool,
    read_timeout: Duration,
}

impl<T: Transport> FrameCodec<T> {
    /// Creates a codec over a transport with the default read timeout.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            buffer: [0; FRAME_BUFFER_SIZE],
            end_offset: 0,
            read_cursor: 0,
            overflowed: false,
            read_timeout: Duration::from_millis(DEFAULT_READ_TIMEOUT_MS),
        }
    }

    /// Sets the per-byte wait used inside `parse`. Keep this short: the
    /// wait is a busy-poll that blocks the whole tick.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Non-blocking check: does the transport currently report bytes?
    /// Full-frame detection happens inside [`FrameCodec::parse`].
    pub fn poll(&mut self) -> bool {
        self.transport.bytes_available() > 0
    }

    /// Whether unconsumed payload from the last parsed frame remains.
    pub fn available(&self) -> bool {
        self.read_cursor < self.end_offset
    }

    /// Whether the last frame overflowed the buffer. Cleared only when the
    /// next frame begins, so callers must check before the next `parse`.
    pub fn overflow(&self) -> bool {
        self.overflowed
    }

    /// Bytes stored for the current frame.
    pub fn current_length(&self) -> usize {
        self.end_offset
    }

    /// Whether the underlying transport has a live peer.
    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Extracts one command from the stream.
    ///
    /// Consumes bytes until the end marker, waiting at most the read
    /// timeout for each byte. Bytes before the start marker are discarded.
    /// Fails with `Overflow` when the frame exceeds the buffer, `Timeout`
    /// when the peer stalls mid-frame, `Malformed`/`MissingToken` when the
    /// header cannot be decoded. All failures leave the codec ready for
    /// the next frame.
    pub fn parse(&mut self) -> Result<Command, FrameError> {
        // New frame: buffer reset, overflow flag cleared.
        self.end_offset = 0;
        self.read_cursor = 0;
        self.overflowed = false;

        // Sync to the start marker, discarding garbage.
        loop {
            let byte = self.next_byte()?;
            if byte == FRAME_START {
                break;
            }
            tracing::trace!(byte, "discarding byte outside frame");
        }

        // Accumulate until the end marker.
        loop {
            let byte = self.next_byte()?;
            if byte == FRAME_END {
                break;
            }
            self.store(byte)?;
        }

        let kind = CommandType::from_code(self.parse_token::<u16>("command type")?);
        let id = self.parse_token::<u32>("correlation id")?;
        let device_id = self.parse_token::<u8>("device id")?;
        let value = self.parse_token::<Value>("value")?;

        Ok(Command {
            kind,
            id,
            device_id,
            value,
        })
    }

    /// Waits for the next byte, up to the read timeout. Availability is
    /// always checked before the deadline, so a byte that arrives exactly
    /// at the boundary is consumed, never dropped.
    fn next_byte(&mut self) -> Result<u8, FrameError> {
        let deadline = Instant::now() + self.read_timeout;
        loop {
            if let Some(byte) = self.transport.read_byte() {
                return Ok(byte);
            }
            if Instant::now() >= deadline {
                return Err(FrameError::Timeout {
                    waited_ms: self.read_timeout.as_millis() as u64,
                });
            }
            std::hint::spin_loop();
        }
    }

    fn store(&mut self, byte: u8) -> Result<(), FrameError> {
        if self.end_offset >= FRAME_BUFFER_SIZE {
            self.overflowed = true;
            self.end_offset = 0;
            self.read_cursor = 0;
            tracing::debug!(capacity = FRAME_BUFFER_SIZE, "frame overflowed, discarding");
            return Err(FrameError::Overflow {
                capacity: FRAME_BUFFER_SIZE,
            });
        }
        self.buffer[self.end_offset] = byte;
        self.end_offset += 1;
        Ok(())
    }

    /// The next separator-delimited token, or `None` at end of frame.
    fn next_token(&mut self) -> Option<&[u8]> {
        if self.read_cursor >= self.end_offset {
            return None;
        }
        let start = self.read_cursor;
        while self.read_cursor < self.end_offset && self.buffer[self.read_cursor] != TOKEN_SEP {
            self.read_cursor += 1;
        }
        let end = self.read_cursor;
        if self.read_cursor < self.end_offset {
            self.read_cursor += 1; // consume the separator
        }
        Some(&self.buffer[start..end])
    }

    fn parse_token<V: FromStr>(&mut self, expected: &'static str) -> Result<V, FrameError> {
        let token = self
            .next_token()
            .ok_or(FrameError::MissingToken { expected })?;
        let text = std::str::from_utf8(token).map_err(|_| FrameError::Malformed {
            expected,
            token: String::from_utf8_lossy(token).into_owned(),
        })?;
        text.parse().map_err(|_| FrameError::Malformed {
            expected,
            token: text.to_string(),
        })
    }

    /// Reads the next payload token as a string.
    pub fn read_string(&mut self) -> Result<String, FrameError> {
        let token = self
            .next_token()
            .ok_or(FrameError::MissingToken { expected: "string" })?;
        let text = std::str::from_utf8(token).map_err(|_| FrameError::Malformed {
            expected: "string",
            token: String::from_utf8_lossy(token).into_owned(),
        })?;
        Ok(text.to_string())
    }

    /// Reads the next payload token as an `i32`.
    pub fn read_int(&mut self) -> Result<i32, FrameError> {
        self.parse_token("integer")
    }

    /// Reads the next payload token as a [`Value`].
    pub fn read_long(&mut self) -> Result<Value, FrameError> {
        self.parse_token("long")
    }

    /// Reads the next payload token as an `f32`.
    pub fn read_float(&mut self) -> Result<f32, FrameError> {
        self.parse_token("float")
    }

    /// Reads one value list, writing at most `out.len()` entries and
    /// returning the count written. Entries past the output slice are
    /// consumed and dropped so the cursor still lands after the list
    /// terminator. Reading a second list from the same frame takes a
    /// second call; the codec never splits lists implicitly.
    pub fn read_int_values(&mut self, out: &mut [i32]) -> Result<usize, FrameError> {
        self.read_list(out, "integer list")
    }

    /// `i64` variant of [`FrameCodec::read_int_values`].
    pub fn read_long_values(&mut self, out: &mut [Value]) -> Result<usize, FrameError> {
        self.read_list(out, "long list")
    }

    /// `f32` variant of [`FrameCodec::read_int_values`].
    pub fn read_float_values(&mut self, out: &mut [f32]) -> Result<usize, FrameError> {
        self.read_list(out, "float list")
    }

    fn read_list<V: FromStr>(
        &mut self,
        out: &mut [V],
        expected: &'static str,
    ) -> Result<usize, FrameError> {
        let mut stored = 0;
        loop {
            let start = self.read_cursor;
            while self.read_cursor < self.end_offset {
                let byte = self.buffer[self.read_cursor];
                if byte == LIST_SEP || byte == LIST_END {
                    break;
                }
                self.read_cursor += 1;
            }
            if self.read_cursor >= self.end_offset {
                // The frame ended before the list terminator.
                self.read_cursor = start;
                return Err(FrameError::MissingToken {
                    expected: "list terminator",
                });
            }
            let delimiter = self.buffer[self.read_cursor];
            let end = self.read_cursor;
            self.read_cursor += 1; // consume the delimiter

            if end > start {
                let token = &self.buffer[start..end];
                let text = std::str::from_utf8(token).map_err(|_| FrameError::Malformed {
                    expected,
                    token: String::from_utf8_lossy(token).into_owned(),
                })?;
                let value = text.parse().map_err(|_| FrameError::Malformed {
                    expected,
                    token: text.to_string(),
                })?;
                if stored < out.len() {
                    out[stored] = value;
                    stored += 1;
                }
            }

            if delimiter == LIST_END {
                break;
            }
        }
        // Consume a trailing token separator so the next reader starts clean.
        if self.read_cursor < self.end_offset && self.buffer[self.read_cursor] == TOKEN_SEP {
            self.read_cursor += 1;
        }
        Ok(stored)
    }

    /// Writes one complete command frame.
    pub fn send(&mut self, cmd: &Command) -> Result<(), FrameError> {
        let buf = encode(cmd);
        self.transport.write_bytes(&buf)?;
        Ok(())
    }

    /// Writes a single scalar wrapped in its own frame.
    pub fn send_arg(&mut self, arg: impl Display) -> Result<(), FrameError> {
        let mut buf = BytesMut::with_capacity(16);
        buf.put_u8(FRAME_START);
        put_display(&mut buf, arg);
        buf.put_u8(FRAME_END);
        self.transport.write_bytes(&buf)?;
        Ok(())
    }

    /// Writes a value list wrapped in its own frame.
    pub fn send_values(&mut self, values: &[Value]) -> Result<(), FrameError> {
        let mut buf = BytesMut::with_capacity(16 + values.len() * 4);
        buf.put_u8(FRAME_START);
        for (i, v) in values.iter().enumerate() {
            if i > 0 {
                buf.put_u8(LIST_SEP);
            }
            put_display(&mut buf, v);
        }
        buf.put_u8(LIST_END);
        buf.put_u8(FRAME_END);
        self.transport.write_bytes(&buf)?;
        Ok(())
    }

    // Unmanaged writers: compose an arbitrary multi-token frame with
    // do_start / print / do_token / do_end. Used for variable-length
    // replies that are built per device.

    /// Writes the frame start marker.
    pub fn do_start(&mut self) -> Result<(), FrameError> {
        self.transport.write_bytes(&[FRAME_START])?;
        Ok(())
    }

    /// Writes a token separator.
    pub fn do_token(&mut self) -> Result<(), FrameError> {
        self.transport.write_bytes(&[TOKEN_SEP])?;
        Ok(())
    }

    /// Writes a list terminator.
    pub fn do_list_end(&mut self) -> Result<(), FrameError> {
        self.transport.write_bytes(&[LIST_END])?;
        Ok(())
    }

    /// Writes the frame end marker.
    pub fn do_end(&mut self) -> Result<(), FrameError> {
        self.transport.write_bytes(&[FRAME_END])?;
        Ok(())
    }

    /// Writes the textual form of an argument. Only meaningful between
    /// `do_start` and `do_end`.
    pub fn print(&mut self, arg: impl Display) -> Result<(), FrameError> {
        let mut buf = BytesMut::with_capacity(16);
        put_display(&mut buf, arg);
        self.transport.write_bytes(&buf)?;
        Ok(())
    }

    /// Pushes queued output to the peer.
    pub fn flush(&mut self) -> Result<(), FrameError> {
        self.transport.flush()?;
        Ok(())
    }
}
