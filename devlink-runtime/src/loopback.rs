//! In-memory loopback transport.
//!
//! Two endpoints sharing a pair of byte queues, for dispatcher and codec
//! tests and for wiring an agent to an in-process controller. Strictly
//! single-threaded, like everything else in the runtime.

use devlink_protocol::Transport;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

type ByteQueue = Rc<RefCell<VecDeque<u8>>>;

/// One endpoint of an in-memory byte pipe.
pub struct LoopbackTransport {
    rx: ByteQueue,
    tx: ByteQueue,
    connected: Rc<Cell<bool>>,
}

impl LoopbackTransport {
    /// Creates a connected pair of endpoints. Bytes written to one side
    /// become readable on the other.
    pub fn pair() -> (LoopbackTransport, LoopbackTransport) {
        let a_to_b: ByteQueue = Rc::new(RefCell::new(VecDeque::new()));
        let b_to_a: ByteQueue = Rc::new(RefCell::new(VecDeque::new()));
        let connected = Rc::new(Cell::new(true));
        (
            LoopbackTransport {
                rx: b_to_a.clone(),
                tx: a_to_b.clone(),
                connected: connected.clone(),
            },
            LoopbackTransport {
                rx: a_to_b,
                tx: b_to_a,
                connected,
            },
        )
    }

    /// Marks both endpoints disconnected.
    pub fn disconnect(&self) {
        self.connected.set(false);
    }

    /// Drains everything currently readable on this side.
    pub fn read_all(&mut self) -> Vec<u8> {
        self.rx.borrow_mut().drain(..).collect()
    }
}

impl Transport for LoopbackTransport {
    fn bytes_available(&mut self) -> usize {
        self.rx.borrow().len()
    }

    fn read_byte(&mut self) -> Option<u8> {
        self.rx.borrow_mut().pop_front()
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.tx.borrow_mut().extend(bytes.iter().copied());
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.get()
    }
}
