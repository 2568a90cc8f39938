//! Interface configuration

use std::net::Ipv4Addr;

use crate::link::arp::ArpConfig;
use crate::link::ethernet::{MacAddress, ETHERNET_MTU};
use crate::network::fragment::ReassemblyConfig;
use crate::network::ipv4::{DEFAULT_TTL, IPV4_HEADER_LEN};
use crate::transport::udp::UDP_HEADER_LEN;

const DEFAULT_MAC: MacAddress = [0x02, 0x00, 0x00, 0x00, 0x00, 0x01];
const DEFAULT_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
const DEFAULT_UDP_PORTS: usize = 16;

/// Smallest MTU that still carries an IPv4 header and one 8-byte fragment
const MIN_MTU: usize = IPV4_HEADER_LEN + 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Hardware address of the interface
    pub mac: MacAddress,
    /// The single IPv4 address of the interface
    pub ip: Ipv4Addr,
    /// Largest IPv4 datagram sent in one frame
    pub mtu: usize,
    /// TTL stamped on outgoing datagrams
    pub ttl: u8,
    /// Maximum number of open UDP ports
    pub udp_port_capacity: usize,
    pub reassembly: ReassemblyConfig,
    pub arp: ArpConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            mac: DEFAULT_MAC,
            ip: DEFAULT_IP,
            mtu: ETHERNET_MTU,
            ttl: DEFAULT_TTL,
            udp_port_capacity: DEFAULT_UDP_PORTS,
            reassembly: ReassemblyConfig::default(),
            arp: ArpConfig::default(),
        }
    }
}

impl Config {
    pub fn new(mac: MacAddress, ip: Ipv4Addr) -> Self {
        Config {
            mac,
            ip,
            ..Config::default()
        }
    }

    /// Set the MTU; values below 28 bytes are raised to 28
    pub fn with_mtu(mut self, mtu: usize) -> Self {
        self.mtu = mtu.max(MIN_MTU);
        self
    }

    pub fn with_ttl(mut self, ttl: u8) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_udp_port_capacity(mut self, capacity: usize) -> Self {
        self.udp_port_capacity = capacity;
        self
    }

    pub fn with_reassembly(mut self, reassembly: ReassemblyConfig) -> Self {
        self.reassembly = reassembly;
        self
    }

    pub fn with_arp(mut self, arp: ArpConfig) -> Self {
        self.arp = arp;
        self
    }

    /// Largest payload carried by one IPv4 fragment, a multiple of 8
    pub fn max_fragment_payload(&self) -> usize {
        (self.mtu.max(MIN_MTU) - IPV4_HEADER_LEN) & !7
    }

    /// Largest UDP payload that fits in one unfragmented datagram
    pub fn max_unfragmented_udp_payload(&self) -> usize {
        self.mtu.max(MIN_MTU) - IPV4_HEADER_LEN - UDP_HEADER_LEN
    }
}
