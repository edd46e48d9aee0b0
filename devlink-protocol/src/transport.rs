//! The byte-transport contract.
//!
//! Concrete bindings (serial link, TCP socket, message-queue client) live
//! outside this crate; the codec only requires the poll-oriented operations
//! below. All methods must be non-blocking: the codec owns the decision of
//! how long to wait for the next byte.

/// A byte-oriented, ordered transport.
pub trait Transport {
    /// Number of bytes currently readable without waiting.
    fn bytes_available(&mut self) -> usize;

    /// Reads the next byte, or `None` when nothing is available right now.
    fn read_byte(&mut self) -> Option<u8>;

    /// Queues bytes for transmission.
    fn write_bytes(&mut self, bytes: &[u8]) -> std::io::Result<()>;

    /// Pushes queued output to the peer.
    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }

    /// Whether the underlying link currently has a live peer.
    fn is_connected(&self) -> bool;
}
