//! ICMP (Internet Control Message Protocol) implementation
//!
//! This module provides ICMP header parsing and the two messages the stack
//! originates: Echo Reply in answer to Echo Request, and Destination
//! Unreachable for datagrams addressed to an unsupported protocol or port.

use byteorder::{BigEndian, ByteOrder};

use crate::error::ParseError;
use crate::network::checksum;
use crate::network::ipv4::IPV4_HEADER_LEN;

/// Minimum ICMP header length in bytes
pub const ICMP_HEADER_LEN: usize = 8;

/// ICMP message types
pub const ICMP_TYPE_ECHO_REPLY: u8 = 0;
pub const ICMP_TYPE_DEST_UNREACHABLE: u8 = 3;
pub const ICMP_TYPE_ECHO_REQUEST: u8 = 8;

/// Bytes of the offending datagram's payload quoted in an error message
const QUOTED_PAYLOAD_LEN: usize = 8;

/// Destination Unreachable codes emitted by the stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnreachableCode {
    ProtocolUnreachable = 2,
    PortUnreachable = 3,
}

/// ICMP packet header structure
///
/// Represents the standard 8-byte ICMP header as defined in RFC 792
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IcmpHeader {
    pub msg_type: u8,  // ICMP message type
    pub msg_code: u8,  // ICMP message code
    pub checksum: u16, // ICMP checksum
    pub rest: [u8; 4], // Type-specific data (e.g., identifier and sequence for echo)
}

impl IcmpHeader {
    /// Parse ICMP header from byte slice
    pub fn from_bytes(data: &[u8]) -> Result<Self, ParseError> {
        if data.len() < ICMP_HEADER_LEN {
            return Err(ParseError::TooShort {
                expected: ICMP_HEADER_LEN,
                actual: data.len(),
            });
        }

        Ok(IcmpHeader {
            msg_type: data[0],
            msg_code: data[1],
            checksum: BigEndian::read_u16(&data[2..4]),
            rest: [data[4], data[5], data[6], data[7]],
        })
    }

    /// Convert ICMP header to bytes
    pub fn to_bytes(&self) -> [u8; ICMP_HEADER_LEN] {
        let mut bytes = [0u8; ICMP_HEADER_LEN];
        bytes[0] = self.msg_type;
        bytes[1] = self.msg_code;
        BigEndian::write_u16(&mut bytes[2..4], self.checksum);
        bytes[4..8].copy_from_slice(&self.rest);
        bytes
    }

    /// Check if this is an Echo Request message
    pub fn is_echo_request(&self) -> bool {
        self.msg_type == ICMP_TYPE_ECHO_REQUEST
    }

    /// Check if this is an Echo Reply message
    pub fn is_echo_reply(&self) -> bool {
        self.msg_type == ICMP_TYPE_ECHO_REPLY
    }

    /// Check if this is a Destination Unreachable message
    pub fn is_unreachable(&self) -> bool {
        self.msg_type == ICMP_TYPE_DEST_UNREACHABLE
    }

    /// Get the identifier field for Echo Request/Reply messages
    pub fn identifier(&self) -> u16 {
        BigEndian::read_u16(&self.rest[0..2])
    }

    /// Get the sequence number field for Echo Request/Reply messages
    pub fn sequence(&self) -> u16 {
        BigEndian::read_u16(&self.rest[2..4])
    }
}

pub struct IcmpUtils {}

impl IcmpUtils {
    /// Verify the checksum of a whole ICMP message
    pub fn validate(message: &[u8]) -> Result<IcmpHeader, ParseError> {
        let header = IcmpHeader::from_bytes(message)?;
        let computed = Self::message_checksum(message);
        if computed != header.checksum {
            return Err(ParseError::BadChecksum {
                stored: header.checksum,
                computed,
            });
        }
        Ok(header)
    }

    /// Build an Echo Reply for a validated Echo Request message.
    ///
    /// Identifier, sequence number and data are echoed unchanged.
    pub fn create_echo_reply(request: &[u8]) -> Result<Vec<u8>, ParseError> {
        let header = IcmpHeader::from_bytes(request)?;
        let mut reply = request.to_vec();
        let reply_header = IcmpHeader {
            msg_type: ICMP_TYPE_ECHO_REPLY,
            msg_code: 0,
            checksum: 0,
            rest: header.rest,
        };
        reply[..ICMP_HEADER_LEN].copy_from_slice(&reply_header.to_bytes());
        Self::fill_checksum(&mut reply);
        Ok(reply)
    }

    /// Build a Destination Unreachable message.
    ///
    /// `original` is the offending datagram starting at its IP header; the
    /// header and the first 8 bytes of its payload are quoted (RFC 792).
    pub fn create_unreachable(original: &[u8], code: UnreachableCode) -> Vec<u8> {
        let quoted = original.len().min(IPV4_HEADER_LEN + QUOTED_PAYLOAD_LEN);
        let header = IcmpHeader {
            msg_type: ICMP_TYPE_DEST_UNREACHABLE,
            msg_code: code as u8,
            checksum: 0,
            rest: [0; 4],
        };

        let mut message = Vec::with_capacity(ICMP_HEADER_LEN + quoted);
        message.extend_from_slice(&header.to_bytes());
        message.extend_from_slice(&original[..quoted]);
        Self::fill_checksum(&mut message);
        message
    }

    fn message_checksum(message: &[u8]) -> u16 {
        let mut copy = message.to_vec();
        copy[2..4].copy_from_slice(&[0, 0]);
        checksum(&copy)
    }

    fn fill_checksum(message: &mut [u8]) {
        message[2..4].copy_from_slice(&[0, 0]);
        let sum = checksum(message);
        BigEndian::write_u16(&mut message[2..4], sum);
    }
}
