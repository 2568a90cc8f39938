//! Network layer protocols implementation
//!
//! This module contains implementations for network layer protocols:
//! - IPv4: Internet Protocol version 4, including fragment reassembly
//! - ICMP: Internet Control Message Protocol (echo and destination unreachable)
//!
//! It also hosts the internet checksum shared by IP, ICMP and UDP.

pub mod fragment;
pub mod icmp;
pub mod ipv4;

// Re-export commonly used items
pub use fragment::{ReassemblyConfig, Reassembler};
pub use icmp::{IcmpHeader, UnreachableCode, ICMP_TYPE_ECHO_REPLY, ICMP_TYPE_ECHO_REQUEST};
pub use ipv4::{flags, protocol, Ipv4Header};

/// Calculate Internet checksum
///
/// Algorithm: Sum data in 16-bit chunks, add carry bits to the sum,
/// and return the one's complement of the result.
/// This is used for IP, ICMP and UDP checksums.
pub fn checksum(data: &[u8]) -> u16 {
    let mut sum = Checksum::new();
    sum.add_bytes(data);
    sum.finish()
}

/// Incremental internet checksum
///
/// Feeding the same bytes in any number of pieces gives the same result as
/// [`checksum`] over their concatenation. Used for pseudo-header checksums so
/// the transport segment does not have to be copied behind a pseudo-header.
#[derive(Debug, Clone, Default)]
pub struct Checksum {
    sum: u32,
    // High byte of a word split across two `add_bytes` calls
    pending: Option<u8>,
}

impl Checksum {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_bytes(&mut self, mut data: &[u8]) {
        if let Some(high) = self.pending.take() {
            match data.split_first() {
                Some((&low, rest)) => {
                    self.add_word(u16::from_be_bytes([high, low]));
                    data = rest;
                }
                None => {
                    self.pending = Some(high);
                    return;
                }
            }
        }

        let mut chunks = data.chunks_exact(2);
        for chunk in &mut chunks {
            self.add_word(u16::from_be_bytes([chunk[0], chunk[1]]));
        }
        if let [last] = chunks.remainder() {
            self.pending = Some(*last);
        }
    }

    pub fn add_u16(&mut self, value: u16) {
        self.add_bytes(&value.to_be_bytes());
    }

    fn add_word(&mut self, word: u16) {
        self.sum += word as u32;
        // Fold early so the accumulator never overflows on large inputs
        if self.sum > 0xFFFF_0000 {
            self.sum = (self.sum & 0xFFFF) + (self.sum >> 16);
        }
    }

    /// Pad a trailing odd byte with zero, fold the carries and complement
    pub fn finish(&self) -> u16 {
        let mut sum = self.sum;
        if let Some(last_byte) = self.pending {
            sum += (last_byte as u32) << 8;
        }

        // Add carry bits
        while (sum >> 16) > 0 {
            sum = (sum & 0xFFFF) + (sum >> 16);
        }

        !sum as u16
    }
}
