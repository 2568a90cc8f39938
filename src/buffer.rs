//! Packet buffer with header room at the front and padding room at the tail
//!
//! ```text
//! |<-- headroom -->|<-- data (head..tail) -->|<-- tailroom -->|
//! 0              head                      tail          capacity
//! ```
//!
//! Outgoing packets start with `head = tail = HEADROOM` and grow backwards as
//! each layer pushes its header. Incoming frames start at `head = 0` and each
//! layer pulls its header off the front.

use crate::error::{NetError, Result};

/// Ethernet (14) + IPv4 (20) + UDP (8)
pub const HEADROOM: usize = 42;

/// Smallest payload an Ethernet frame may carry
const MIN_TAILROOM_TARGET: usize = 46;

#[derive(Clone)]
pub struct PacketBuf {
    storage: Vec<u8>,
    head: usize,
    tail: usize,
}

impl PacketBuf {
    /// Create an empty buffer of `capacity` bytes with `headroom` reserved
    pub fn new(capacity: usize, headroom: usize) -> Self {
        let headroom = headroom.min(capacity);
        PacketBuf {
            storage: vec![0u8; capacity],
            head: headroom,
            tail: headroom,
        }
    }

    /// Copy `payload` into a new buffer ready for headers to be pushed.
    ///
    /// The backing allocation is large enough for all stack headers and for
    /// padding the payload up to the minimum Ethernet payload.
    pub fn from_payload(payload: &[u8]) -> Self {
        let capacity = HEADROOM + payload.len().max(MIN_TAILROOM_TARGET);
        let mut buf = PacketBuf::new(capacity, HEADROOM);
        buf.storage[HEADROOM..HEADROOM + payload.len()].copy_from_slice(payload);
        buf.tail = HEADROOM + payload.len();
        buf
    }

    /// Wrap a received frame; the whole frame is the data window
    pub fn from_frame(frame: &[u8]) -> Self {
        PacketBuf {
            storage: frame.to_vec(),
            head: 0,
            tail: frame.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.tail - self.head
    }

    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    pub fn headroom(&self) -> usize {
        self.head
    }

    pub fn data(&self) -> &[u8] {
        &self.storage[self.head..self.tail]
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.storage[self.head..self.tail]
    }

    /// Extend the window `len` bytes to the front and return the new bytes
    pub fn push_header(&mut self, len: usize) -> Result<&mut [u8]> {
        if self.head < len {
            return Err(NetError::NoBufferSpace);
        }
        self.head -= len;
        Ok(&mut self.storage[self.head..self.head + len])
    }

    /// Remove `len` bytes from the front of the window and return them
    pub fn pull_header(&mut self, len: usize) -> Result<&[u8]> {
        if len > self.len() {
            return Err(NetError::BufferUnderflow {
                requested: len,
                available: self.len(),
            });
        }
        let start = self.head;
        self.head += len;
        Ok(&self.storage[start..start + len])
    }

    /// Append `len` zero bytes to the tail of the window
    pub fn add_padding(&mut self, len: usize) -> Result<()> {
        let new_tail = self.tail + len;
        if new_tail > self.capacity() {
            return Err(NetError::NoBufferSpace);
        }
        self.storage[self.tail..new_tail].fill(0);
        self.tail = new_tail;
        Ok(())
    }

    /// Drop `len` bytes from the tail of the window
    pub fn remove_padding(&mut self, len: usize) -> Result<()> {
        if len > self.len() {
            return Err(NetError::BufferUnderflow {
                requested: len,
                available: self.len(),
            });
        }
        self.tail -= len;
        Ok(())
    }

    /// Shrink the window to its first `len` bytes; longer lengths are a no-op
    pub fn truncate(&mut self, len: usize) {
        if len < self.len() {
            self.tail = self.head + len;
        }
    }
}

impl std::fmt::Debug for PacketBuf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "PacketBuf {{ head: {}, tail: {}, len: {}, capacity: {} }}",
            self.head,
            self.tail,
            self.len(),
            self.capacity()
        )
    }
}
