//! IPv4 protocol implementation
//!
//! This module provides the IPv4 header codec and the validation gate used by
//! the receive path. Only the fixed 20-byte header is supported; datagrams
//! carrying options are treated as malformed.
//!
//! Features:
//! - IPv4 header parsing and serialization
//! - Checksum calculation and validation
//! - Fragment flag and offset helpers
//! - Packet construction with automatic checksum

use std::net::Ipv4Addr;

use crate::error::{NetError, ParseError};
use crate::network::checksum;
use byteorder::{BigEndian, ByteOrder};

pub const IPV4_HEADER_LEN: usize = 20;
pub const IPV4_VERSION: u8 = 4;
pub const DEFAULT_IHL: u8 = 5; // 5 * 4 = 20 bytes (standard header length)
pub const DEFAULT_TTL: u8 = 64;

/// Largest payload a single datagram can describe
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize - IPV4_HEADER_LEN;

/// IPv4 packet header structure
///
/// Represents the standard 20-byte IPv4 header as defined in RFC 791
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ipv4Header {
    pub version: u8,
    pub ihl: u8, // Internet Header Length
    pub tos: u8, // Type of Service
    pub total_len: u16,
    pub id: u16,
    pub flags_frag_offset: u16, // Flags and Fragment Offset
    pub ttl: u8,                // Time to Live
    pub protocol: u8,           // Next Protocol
    pub checksum: u16,
    pub src_addr: Ipv4Addr,
    pub dst_addr: Ipv4Addr,
}

impl Ipv4Header {
    /// Create a header for one fragment of an outgoing datagram.
    ///
    /// `byte_offset` is in bytes and must be a multiple of 8. The checksum is
    /// left at zero; call [`update_checksum`](Self::update_checksum) once all
    /// fields are final.
    pub fn new_fragment(
        protocol: u8,
        src_addr: Ipv4Addr,
        dst_addr: Ipv4Addr,
        payload_len: u16,
        id: u16,
        byte_offset: usize,
        more_fragments: bool,
        ttl: u8,
    ) -> Self {
        let mut flags_frag_offset = ((byte_offset / 8) as u16) & flags::FRAGMENT_OFFSET_MASK;
        if more_fragments {
            flags_frag_offset |= flags::MORE_FRAGMENTS;
        }

        Ipv4Header {
            version: IPV4_VERSION,
            ihl: DEFAULT_IHL,
            tos: 0,
            total_len: IPV4_HEADER_LEN as u16 + payload_len,
            id,
            flags_frag_offset,
            ttl,
            protocol,
            checksum: 0,
            src_addr,
            dst_addr,
        }
    }

    /// Create an unfragmented header with default values
    pub fn new_simple(
        protocol: u8,
        src_addr: Ipv4Addr,
        dst_addr: Ipv4Addr,
        payload_len: u16,
    ) -> Self {
        Self::new_fragment(protocol, src_addr, dst_addr, payload_len, 0, 0, false, DEFAULT_TTL)
    }

    /// Parse IPv4 header from byte slice
    ///
    /// Only checks what is needed to decode the fields: length and version.
    /// [`validate`](Self::validate) performs the rest of the receive gate.
    pub fn from_bytes(data: &[u8]) -> Result<Self, ParseError> {
        if data.len() < IPV4_HEADER_LEN {
            return Err(ParseError::TooShort {
                expected: IPV4_HEADER_LEN,
                actual: data.len(),
            });
        }

        let version = (data[0] & 0xF0) >> 4;
        if version != IPV4_VERSION {
            return Err(ParseError::BadVersion(version));
        }

        Ok(Ipv4Header {
            version,
            ihl: data[0] & 0x0F,
            tos: data[1],
            total_len: BigEndian::read_u16(&data[2..4]),
            id: BigEndian::read_u16(&data[4..6]),
            flags_frag_offset: BigEndian::read_u16(&data[6..8]),
            ttl: data[8],
            protocol: data[9],
            checksum: BigEndian::read_u16(&data[10..12]),
            src_addr: Ipv4Addr::new(data[12], data[13], data[14], data[15]),
            dst_addr: Ipv4Addr::new(data[16], data[17], data[18], data[19]),
        })
    }

    /// Validate the header against the buffer it was read from.
    ///
    /// `buffer_len` is the length of the whole received buffer, which may be
    /// longer than `total_len` because of link-layer padding.
    pub fn validate(&self, buffer_len: usize) -> Result<(), ParseError> {
        if self.ihl != DEFAULT_IHL {
            return Err(ParseError::UnsupportedHeaderLength(self.ihl));
        }

        let declared = self.total_len as usize;
        if declared > buffer_len || declared < IPV4_HEADER_LEN {
            return Err(ParseError::BadLength {
                declared,
                actual: buffer_len,
            });
        }

        let computed = self.calculate_checksum();
        if computed != self.checksum {
            return Err(ParseError::BadChecksum {
                stored: self.checksum,
                computed,
            });
        }

        Ok(())
    }

    /// Calculate the header checksum with the checksum field taken as zero
    pub fn calculate_checksum(&self) -> u16 {
        let mut header_bytes = self.to_bytes();
        header_bytes[10..12].copy_from_slice(&[0, 0]);
        checksum(&header_bytes)
    }

    /// Recalculate and store the checksum field.
    ///
    /// Call this after modifying any header fields.
    pub fn update_checksum(&mut self) {
        self.checksum = self.calculate_checksum();
    }

    /// Serialize the header to a 20-byte array ready for transmission
    pub fn to_bytes(&self) -> [u8; IPV4_HEADER_LEN] {
        let mut bytes = [0u8; IPV4_HEADER_LEN];
        self.write(&mut bytes);
        bytes
    }

    /// Write the header into the first 20 bytes of `buf`
    pub fn write(&self, buf: &mut [u8]) {
        buf[0] = (self.version << 4) | self.ihl;
        buf[1] = self.tos;
        BigEndian::write_u16(&mut buf[2..4], self.total_len);
        BigEndian::write_u16(&mut buf[4..6], self.id);
        BigEndian::write_u16(&mut buf[6..8], self.flags_frag_offset);
        buf[8] = self.ttl;
        buf[9] = self.protocol;
        BigEndian::write_u16(&mut buf[10..12], self.checksum);
        buf[12..16].copy_from_slice(&self.src_addr.octets());
        buf[16..20].copy_from_slice(&self.dst_addr.octets());
    }

    /// Get the header length in bytes
    pub fn header_len(&self) -> usize {
        (self.ihl as usize) * 4
    }

    /// Get payload length
    ///
    /// Returns the length of the payload (total length - header length)
    pub fn payload_len(&self) -> usize {
        (self.total_len as usize).saturating_sub(self.header_len())
    }

    pub fn dont_fragment(&self) -> bool {
        self.flags_frag_offset & flags::DONT_FRAGMENT != 0
    }

    pub fn more_fragments(&self) -> bool {
        self.flags_frag_offset & flags::MORE_FRAGMENTS != 0
    }

    /// Fragment offset in bytes
    pub fn fragment_offset(&self) -> usize {
        (self.flags_frag_offset & flags::FRAGMENT_OFFSET_MASK) as usize * 8
    }

    /// True for any piece of a fragmented datagram
    pub fn is_fragment(&self) -> bool {
        self.more_fragments() || self.fragment_offset() != 0
    }
}

/// IPv4 protocol constants
pub mod protocol {
    pub const ICMP: u8 = 1;
    pub const UDP: u8 = 17;
}

/// IPv4 flags constants
pub mod flags {
    pub const DONT_FRAGMENT: u16 = 0x4000;
    pub const MORE_FRAGMENTS: u16 = 0x2000;
    pub const FRAGMENT_OFFSET_MASK: u16 = 0x1FFF;
}

pub struct Ipv4Utils {}

impl Ipv4Utils {
    /// Create a complete IPv4 packet with payload
    ///
    /// The total length and checksum fields are updated to match the payload.
    /// Payloads that do not fit the 16-bit total length are rejected.
    pub fn create_packet_with_payload(header: &Ipv4Header, payload: &[u8]) -> crate::error::Result<Vec<u8>> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(NetError::PayloadTooLarge(payload.len()));
        }
        let mut header = header.clone();
        header.total_len = IPV4_HEADER_LEN as u16 + payload.len() as u16;
        header.update_checksum();
        let mut packet = Vec::with_capacity(header.total_len as usize);
        packet.extend_from_slice(&header.to_bytes());
        packet.extend_from_slice(payload);
        Ok(packet)
    }
}
