//! Non-blocking TCP transport binding.
//!
//! The agent side of a controller connection. Reads are buffered through
//! an internal queue so `bytes_available` can answer without consuming;
//! writes retry through `WouldBlock` because the socket stays in
//! non-blocking mode for the poll-driven tick loop.

use devlink_protocol::Transport;
use std::collections::VecDeque;
use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpStream};

const READ_CHUNK: usize = 256;

pub struct TcpTransport {
    stream: TcpStream,
    peer: SocketAddr,
    pending: VecDeque<u8>,
    connected: bool,
}

impl TcpTransport {
    /// Wraps an accepted stream, switching it to non-blocking mode.
    pub fn from_stream(stream: TcpStream) -> std::io::Result<Self> {
        let peer = stream.peer_addr()?;
        stream.set_nonblocking(true)?;
        stream.set_nodelay(true)?;
        tracing::info!(%peer, "controller connected");
        Ok(Self {
            stream,
            peer,
            pending: VecDeque::with_capacity(READ_CHUNK),
            connected: true,
        })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Pulls whatever the socket has into the pending queue.
    fn fill(&mut self) {
        if !self.connected {
            return;
        }
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => {
                    tracing::info!(peer = %self.peer, "controller disconnected");
                    self.connected = false;
                    return;
                }
                Ok(n) => self.pending.extend(&chunk[..n]),
                Err(e) if e.kind() == ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::warn!(peer = %self.peer, error = %e, "read failed");
                    self.connected = false;
                    return;
                }
            }
        }
    }
}

impl Transport for TcpTransport {
    fn bytes_available(&mut self) -> usize {
        self.fill();
        self.pending.len()
    }

    fn read_byte(&mut self) -> Option<u8> {
        if self.pending.is_empty() {
            self.fill();
        }
        self.pending.pop_front()
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        let mut written = 0;
        while written < bytes.len() {
            match self.stream.write(&bytes[written..]) {
                Ok(0) => {
                    self.connected = false;
                    return Err(std::io::Error::new(
                        ErrorKind::WriteZero,
                        "peer stopped accepting bytes",
                    ));
                }
                Ok(n) => written += n,
                Err(e) if e.kind() == ErrorKind::WouldBlock => std::hint::spin_loop(),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.connected = false;
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self.stream.flush() {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(()),
            Err(e) => {
                self.connected = false;
                Err(e)
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}
