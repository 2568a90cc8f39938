//! Protocol dispatch
//!
//! Maps a protocol number (an EtherType on the link layer, an IP protocol
//! number on the network layer) to the handler that takes the payload.

use std::collections::HashMap;

/// Protocol handlers built into the stack
///
/// The tables only remap these handlers to protocol numbers; `Ipv4` and
/// `Arp` take link frames, `Icmp` and `Udp` take IPv4 payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handler {
    Ipv4,
    Arp,
    Icmp,
    Udp,
}

impl Handler {
    /// Whether the handler consumes Ethernet payloads
    pub fn is_link_layer(&self) -> bool {
        matches!(self, Handler::Ipv4 | Handler::Arp)
    }

    /// Whether the handler consumes IPv4 payloads
    pub fn is_ip_layer(&self) -> bool {
        matches!(self, Handler::Icmp | Handler::Udp)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProtocolTable {
    handlers: HashMap<u16, Handler>,
}

impl ProtocolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `protocol`, returning the handler it replaces
    pub fn register(&mut self, protocol: u16, handler: Handler) -> Option<Handler> {
        self.handlers.insert(protocol, handler)
    }

    pub fn unregister(&mut self, protocol: u16) -> Option<Handler> {
        self.handlers.remove(&protocol)
    }

    pub fn lookup(&self, protocol: u16) -> Option<Handler> {
        self.handlers.get(&protocol).copied()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_lookup() {
        let mut table = ProtocolTable::new();
        assert!(table.is_empty());
        assert_eq!(table.register(0x0800, Handler::Ipv4), None);
        assert_eq!(table.lookup(0x0800), Some(Handler::Ipv4));
        assert_eq!(table.lookup(0x86DD), None);
    }

    #[test]
    fn test_last_registration_wins() {
        let mut table = ProtocolTable::new();
        table.register(17, Handler::Udp);
        assert_eq!(table.register(17, Handler::Icmp), Some(Handler::Udp));
        assert_eq!(table.lookup(17), Some(Handler::Icmp));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_handler_layers() {
        assert!(Handler::Ipv4.is_link_layer());
        assert!(Handler::Arp.is_link_layer());
        assert!(!Handler::Udp.is_link_layer());
        assert!(Handler::Icmp.is_ip_layer());
        assert!(Handler::Udp.is_ip_layer());
        assert!(!Handler::Arp.is_ip_layer());
    }

    #[test]
    fn test_unregister() {
        let mut table = ProtocolTable::new();
        table.register(1, Handler::Icmp);
        assert_eq!(table.unregister(1), Some(Handler::Icmp));
        assert_eq!(table.unregister(1), None);
        assert_eq!(table.lookup(1), None);
    }
}
