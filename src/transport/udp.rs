//! UDP (User Datagram Protocol) implementation
//!
//! This module provides the UDP header codec, the pseudo-header checksum and
//! the port table mapping local ports to application handlers.

use std::collections::HashMap;
use std::net::Ipv4Addr;

use crate::error::{NetError, ParseError, Result};
use crate::network::ipv4::{protocol, MAX_PAYLOAD_LEN};
use crate::network::Checksum;
use byteorder::{BigEndian, ByteOrder};

/// UDP header length in bytes
pub const UDP_HEADER_LEN: usize = 8;

/// Largest payload a UDP datagram can carry over IPv4
pub const MAX_UDP_PAYLOAD: usize = MAX_PAYLOAD_LEN - UDP_HEADER_LEN;

/// UDP packet header structure
///
/// Represents the standard 8-byte UDP header as defined in RFC 768
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UdpHeader {
    pub src_port: u16,
    pub dst_port: u16,
    pub length: u16, // Length of UDP header and data
    pub checksum: u16,
}

impl UdpHeader {
    /// Parse UDP header from byte slice
    pub fn from_bytes(data: &[u8]) -> std::result::Result<Self, ParseError> {
        if data.len() < UDP_HEADER_LEN {
            return Err(ParseError::TooShort {
                expected: UDP_HEADER_LEN,
                actual: data.len(),
            });
        }

        Ok(UdpHeader {
            src_port: BigEndian::read_u16(&data[0..2]),
            dst_port: BigEndian::read_u16(&data[2..4]),
            length: BigEndian::read_u16(&data[4..6]),
            checksum: BigEndian::read_u16(&data[6..8]),
        })
    }

    /// Convert UDP header to bytes
    pub fn to_bytes(&self) -> [u8; UDP_HEADER_LEN] {
        let mut bytes = [0u8; UDP_HEADER_LEN];
        self.write(&mut bytes);
        bytes
    }

    pub fn write(&self, buf: &mut [u8]) {
        BigEndian::write_u16(&mut buf[0..2], self.src_port);
        BigEndian::write_u16(&mut buf[2..4], self.dst_port);
        BigEndian::write_u16(&mut buf[4..6], self.length);
        BigEndian::write_u16(&mut buf[6..8], self.checksum);
    }
}

pub struct UdpUtils {}

impl UdpUtils {
    /// Calculate UDP checksum with pseudo header
    ///
    /// `udp_packet` is the whole datagram (header and payload). Its checksum
    /// field is taken as zero whatever it currently holds. Input shorter
    /// than a header is summed as far as it goes; the length in the pseudo
    /// header is only meaningful up to 65535 bytes.
    pub fn calculate_udp_checksum(src_ip: Ipv4Addr, dst_ip: Ipv4Addr, udp_packet: &[u8]) -> u16 {
        let udp_len = udp_packet.len() as u16;

        // IPv4 pseudo header: src_ip(4) + dst_ip(4) + zero(1) + protocol(1) + udp_len(2)
        let mut sum = Checksum::new();
        sum.add_bytes(&src_ip.octets());
        sum.add_bytes(&dst_ip.octets());
        sum.add_bytes(&[0, protocol::UDP]);
        sum.add_u16(udp_len);

        sum.add_bytes(udp_packet.get(..6).unwrap_or(udp_packet));
        sum.add_bytes(udp_packet.get(UDP_HEADER_LEN..).unwrap_or_default());
        sum.finish()
    }

    /// Checksum value to put on the wire; zero means "no checksum" (RFC 768)
    fn wire_checksum(computed: u16) -> u16 {
        if computed == 0 {
            0xFFFF
        } else {
            computed
        }
    }

    /// Validate a received UDP datagram.
    ///
    /// `packet` may be longer than the declared UDP length; the checksum
    /// covers only the declared length. A zero checksum field means the
    /// sender did not compute one and is accepted.
    pub fn validate_udp_packet(
        src_ip: Ipv4Addr,
        dst_ip: Ipv4Addr,
        packet: &[u8],
    ) -> std::result::Result<UdpHeader, ParseError> {
        let header = UdpHeader::from_bytes(packet)?;

        let declared = header.length as usize;
        if declared < UDP_HEADER_LEN || declared > packet.len() {
            return Err(ParseError::BadLength {
                declared,
                actual: packet.len(),
            });
        }

        if header.checksum != 0 {
            let computed = Self::wire_checksum(Self::calculate_udp_checksum(
                src_ip,
                dst_ip,
                &packet[..declared],
            ));
            if computed != header.checksum {
                return Err(ParseError::BadChecksum {
                    stored: header.checksum,
                    computed,
                });
            }
        }

        Ok(header)
    }

    /// Write the header in front of `payload` and fill the checksum.
    ///
    /// `datagram` must start with `UDP_HEADER_LEN` bytes of room followed by
    /// the payload.
    pub fn write_header(
        datagram: &mut [u8],
        src_ip: Ipv4Addr,
        dst_ip: Ipv4Addr,
        src_port: u16,
        dst_port: u16,
    ) {
        let header = UdpHeader {
            src_port,
            dst_port,
            length: datagram.len() as u16,
            checksum: 0,
        };
        header.write(datagram);
        let sum = Self::wire_checksum(Self::calculate_udp_checksum(src_ip, dst_ip, datagram));
        BigEndian::write_u16(&mut datagram[6..8], sum);
    }

    /// Creates a complete UDP packet with proper checksum
    pub fn create_udp_packet_with_checksum(
        src_ip: Ipv4Addr,
        dst_ip: Ipv4Addr,
        src_port: u16,
        dst_port: u16,
        payload: &[u8],
    ) -> Result<Vec<u8>> {
        if payload.len() > MAX_UDP_PAYLOAD {
            return Err(NetError::PayloadTooLarge(payload.len()));
        }
        let mut packet = vec![0u8; UDP_HEADER_LEN + payload.len()];
        packet[UDP_HEADER_LEN..].copy_from_slice(payload);
        Self::write_header(&mut packet, src_ip, dst_ip, src_port, dst_port);
        Ok(packet)
    }
}

/// Application callback: payload, source address, source port
pub type UdpHandler = Box<dyn FnMut(&[u8], Ipv4Addr, u16)>;

/// Local port -> handler
pub struct UdpTable {
    handlers: HashMap<u16, UdpHandler>,
    capacity: usize,
}

impl UdpTable {
    pub fn new(capacity: usize) -> Self {
        UdpTable {
            handlers: HashMap::new(),
            capacity,
        }
    }

    /// Register `handler` on `port`.
    ///
    /// An open port gets its handler replaced. Opening a new port fails when
    /// the table is full, leaving the table unchanged.
    pub fn open(&mut self, port: u16, handler: UdpHandler) -> Result<()> {
        if port == 0 {
            return Err(NetError::InvalidPort(port));
        }
        if !self.handlers.contains_key(&port) && self.handlers.len() >= self.capacity {
            return Err(NetError::PortTableFull(self.handlers.len()));
        }
        self.handlers.insert(port, handler);
        Ok(())
    }

    /// Remove the handler on `port`; returns whether one was registered
    pub fn close(&mut self, port: u16) -> bool {
        self.handlers.remove(&port).is_some()
    }

    pub fn is_open(&self, port: u16) -> bool {
        self.handlers.contains_key(&port)
    }

    pub fn handler_mut(&mut self, port: u16) -> Option<&mut UdpHandler> {
        self.handlers.get_mut(&port)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
