//! A small single-interface IPv4 stack in Rust
//!
//! This library provides one Ethernet interface with one IPv4 address:
//! - Ethernet framing with minimum-size padding
//! - ARP next-hop resolution
//! - IPv4 send/receive with fragmentation and reassembly
//! - ICMP echo reply and destination unreachable reporting
//! - UDP with a port table of application handlers
//!
//! Everything runs on the caller's thread: drive the stack by calling
//! [`Interface::poll`] in a loop.

pub mod buffer;
pub mod config;
pub mod error;
pub mod iface;
pub mod link;
pub mod network;
pub mod transport;

// Re-export commonly used types
pub use buffer::PacketBuf;
pub use config::Config;
pub use error::{NetError, ParseError, Result};
pub use iface::{Handler, Interface, LinkDevice, QueueDevice, TapDevice};
pub use link::{ArpResolver, MacAddress, Resolver, StaticResolver};
pub use network::icmp::{IcmpHeader, UnreachableCode, ICMP_TYPE_ECHO_REPLY, ICMP_TYPE_ECHO_REQUEST};
pub use network::ipv4::Ipv4Header;
pub use transport::udp::{UdpHeader, UdpUtils};
