//! Link layer implementation
//!
//! This module contains:
//! - Ethernet: frame header codec, minimum-size padding, transmit/poll
//! - ARP: the address resolution step between IPv4 and Ethernet

pub mod arp;
pub mod ethernet;

// Re-export commonly used items
pub use arp::{ArpConfig, ArpResolver, Resolver, StaticResolver};
pub use ethernet::{ethertype, Ethernet, EthernetHeader, MacAddress, BROADCAST_MAC};
