//! Address resolution
//!
//! [`Resolver`] is the step between IPv4 and Ethernet: it maps a next-hop
//! IPv4 address to a MAC address and frames the datagram. Two resolvers are
//! provided:
//! - [`ArpResolver`]: RFC 826 ARP with a neighbour cache and a small queue of
//!   datagrams per address waiting for a reply
//! - [`StaticResolver`]: a fixed table, for links without ARP and for tests

use std::collections::{HashMap, VecDeque};
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use byteorder::{BigEndian, ByteOrder};
use log::{debug, trace, warn};

use crate::buffer::PacketBuf;
use crate::error::{NetError, ParseError, Result};
use crate::iface::device::LinkDevice;
use crate::link::ethernet::{ethertype, format_mac, Ethernet, MacAddress, BROADCAST_MAC};
use crate::network::ipv4::IPV4_HEADER_LEN;

pub const ARP_PACKET_LEN: usize = 28;

const HTYPE_ETHERNET: u16 = 1;

pub mod operation {
    pub const REQUEST: u16 = 1;
    pub const REPLY: u16 = 2;
}

/// Maps IPv4 next hops to link addresses and sends datagrams on the link
pub trait Resolver {
    /// Send `datagram` (a complete IPv4 datagram) to `dst`.
    ///
    /// May queue the datagram while the link address is being looked up.
    fn resolve_and_send<D: LinkDevice>(
        &mut self,
        link: &mut Ethernet<D>,
        datagram: PacketBuf,
        dst: Ipv4Addr,
    ) -> Result<()>;

    /// Handle a frame carrying the resolver's own protocol
    fn receive<D: LinkDevice>(
        &mut self,
        _link: &mut Ethernet<D>,
        _packet: PacketBuf,
        _src_mac: MacAddress,
    ) -> Result<()> {
        Ok(())
    }

    /// Advance the resolver's clock and drop stale state
    fn expire(&mut self, _now: Instant) {}
}

/// ARP packet for Ethernet/IPv4
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpPacket {
    pub operation: u16,
    pub sender_mac: MacAddress,
    pub sender_ip: Ipv4Addr,
    pub target_mac: MacAddress,
    pub target_ip: Ipv4Addr,
}

impl ArpPacket {
    pub fn from_bytes(data: &[u8]) -> std::result::Result<Self, ParseError> {
        if data.len() < ARP_PACKET_LEN {
            return Err(ParseError::TooShort {
                expected: ARP_PACKET_LEN,
                actual: data.len(),
            });
        }
        if BigEndian::read_u16(&data[0..2]) != HTYPE_ETHERNET
            || BigEndian::read_u16(&data[2..4]) != ethertype::IPV4
            || data[4] != 6
            || data[5] != 4
        {
            return Err(ParseError::UnsupportedArp);
        }

        let mut sender_mac = [0u8; 6];
        let mut target_mac = [0u8; 6];
        sender_mac.copy_from_slice(&data[8..14]);
        target_mac.copy_from_slice(&data[18..24]);
        Ok(ArpPacket {
            operation: BigEndian::read_u16(&data[6..8]),
            sender_mac,
            sender_ip: Ipv4Addr::new(data[14], data[15], data[16], data[17]),
            target_mac,
            target_ip: Ipv4Addr::new(data[24], data[25], data[26], data[27]),
        })
    }

    pub fn to_bytes(&self) -> [u8; ARP_PACKET_LEN] {
        let mut bytes = [0u8; ARP_PACKET_LEN];
        BigEndian::write_u16(&mut bytes[0..2], HTYPE_ETHERNET);
        BigEndian::write_u16(&mut bytes[2..4], ethertype::IPV4);
        bytes[4] = 6;
        bytes[5] = 4;
        BigEndian::write_u16(&mut bytes[6..8], self.operation);
        bytes[8..14].copy_from_slice(&self.sender_mac);
        bytes[14..18].copy_from_slice(&self.sender_ip.octets());
        bytes[18..24].copy_from_slice(&self.target_mac);
        bytes[24..28].copy_from_slice(&self.target_ip.octets());
        bytes
    }
}

/// ARP cache and queue limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpConfig {
    /// How long a learned mapping stays valid
    pub entry_lifetime: Duration,
    /// How long datagrams wait for a reply before being dropped
    pub pending_timeout: Duration,
    /// Datagrams queued per unresolved address; the oldest is dropped first.
    /// All fragments of one datagram count once.
    pub max_queued: usize,
}

impl Default for ArpConfig {
    fn default() -> Self {
        ArpConfig {
            entry_lifetime: Duration::from_secs(60),
            pending_timeout: Duration::from_secs(5),
            max_queued: 4,
        }
    }
}

/// Fragments of one outgoing datagram, tagged with its identification
#[derive(Debug)]
struct QueuedDatagram {
    id: Option<u16>,
    fragments: Vec<PacketBuf>,
}

#[derive(Debug)]
struct Pending {
    queue: VecDeque<QueuedDatagram>,
    since: Instant,
}

impl Pending {
    /// Queue one fragment, keeping at most `max_queued` datagrams
    fn push(&mut self, fragment: PacketBuf, max_queued: usize, dst: Ipv4Addr) {
        let id = datagram_id(&fragment);
        if let Some(last) = self.queue.back_mut() {
            if id.is_some() && last.id == id {
                last.fragments.push(fragment);
                return;
            }
        }
        if self.queue.len() >= max_queued {
            debug!("arp: queue for {} full, dropping oldest datagram", dst);
            self.queue.pop_front();
        }
        self.queue.push_back(QueuedDatagram {
            id,
            fragments: vec![fragment],
        });
    }
}

/// Identification field of an IPv4 datagram
fn datagram_id(datagram: &PacketBuf) -> Option<u16> {
    let data = datagram.data();
    (data.len() >= IPV4_HEADER_LEN).then(|| BigEndian::read_u16(&data[4..6]))
}

/// ARP resolver for one interface address
#[derive(Debug)]
pub struct ArpResolver {
    ip: Ipv4Addr,
    config: ArpConfig,
    cache: HashMap<Ipv4Addr, (MacAddress, Instant)>,
    pending: HashMap<Ipv4Addr, Pending>,
    now: Instant,
}

impl ArpResolver {
    pub fn new(ip: Ipv4Addr, config: ArpConfig) -> Self {
        ArpResolver {
            ip,
            config,
            cache: HashMap::new(),
            pending: HashMap::new(),
            now: Instant::now(),
        }
    }

    /// Cached link address for `ip`
    pub fn lookup(&self, ip: Ipv4Addr) -> Option<MacAddress> {
        if ip == Ipv4Addr::BROADCAST {
            return Some(BROADCAST_MAC);
        }
        self.cache.get(&ip).map(|(mac, _)| *mac)
    }

    /// Add or refresh a mapping
    pub fn insert(&mut self, ip: Ipv4Addr, mac: MacAddress) {
        self.cache.insert(ip, (mac, self.now));
    }

    /// Number of datagrams waiting for `ip` to resolve
    pub fn queued(&self, ip: Ipv4Addr) -> usize {
        self.pending.get(&ip).map_or(0, |p| p.queue.len())
    }

    fn send_request<D: LinkDevice>(&self, link: &mut Ethernet<D>, target_ip: Ipv4Addr) -> Result<()> {
        let request = ArpPacket {
            operation: operation::REQUEST,
            sender_mac: link.mac(),
            sender_ip: self.ip,
            target_mac: [0; 6],
            target_ip,
        };
        debug!("arp: who-has {} tell {}", target_ip, self.ip);
        link.transmit(
            PacketBuf::from_payload(&request.to_bytes()),
            BROADCAST_MAC,
            ethertype::ARP,
        )
    }

    fn flush<D: LinkDevice>(&mut self, link: &mut Ethernet<D>, ip: Ipv4Addr, mac: MacAddress) {
        if let Some(pending) = self.pending.remove(&ip) {
            debug!("arp: sending {} queued datagrams to {}", pending.queue.len(), ip);
            for datagram in pending.queue.into_iter().flat_map(|queued| queued.fragments) {
                if let Err(e) = link.transmit(datagram, mac, ethertype::IPV4) {
                    warn!("arp: failed to send queued datagram to {}: {}", ip, e);
                }
            }
        }
    }
}

impl Resolver for ArpResolver {
    fn resolve_and_send<D: LinkDevice>(
        &mut self,
        link: &mut Ethernet<D>,
        datagram: PacketBuf,
        dst: Ipv4Addr,
    ) -> Result<()> {
        if let Some(mac) = self.lookup(dst) {
            return link.transmit(datagram, mac, ethertype::IPV4);
        }

        let now = self.now;
        let max_queued = self.config.max_queued.max(1);
        let pending = self.pending.entry(dst).or_insert_with(|| Pending {
            queue: VecDeque::new(),
            since: now,
        });
        let first = pending.queue.is_empty();
        pending.push(datagram, max_queued, dst);

        if first {
            self.send_request(link, dst)?;
        }
        Ok(())
    }

    fn receive<D: LinkDevice>(
        &mut self,
        link: &mut Ethernet<D>,
        packet: PacketBuf,
        src_mac: MacAddress,
    ) -> Result<()> {
        let arp = match ArpPacket::from_bytes(packet.data()) {
            Ok(arp) => arp,
            Err(e) => {
                debug!("arp: dropping packet from {}: {}", format_mac(&src_mac), e);
                return Ok(());
            }
        };

        // Merge: refresh a sender we already know about
        let known = self.cache.contains_key(&arp.sender_ip);
        if known {
            self.insert(arp.sender_ip, arp.sender_mac);
        }
        if arp.target_ip != self.ip {
            trace!("arp: ignoring packet for {}", arp.target_ip);
            return Ok(());
        }
        if !known {
            self.insert(arp.sender_ip, arp.sender_mac);
        }
        self.flush(link, arp.sender_ip, arp.sender_mac);

        if arp.operation == operation::REQUEST {
            let reply = ArpPacket {
                operation: operation::REPLY,
                sender_mac: link.mac(),
                sender_ip: self.ip,
                target_mac: arp.sender_mac,
                target_ip: arp.sender_ip,
            };
            debug!("arp: {} is-at {}", self.ip, format_mac(&link.mac()));
            link.transmit(
                PacketBuf::from_payload(&reply.to_bytes()),
                arp.sender_mac,
                ethertype::ARP,
            )?;
        }
        Ok(())
    }

    fn expire(&mut self, now: Instant) {
        self.now = now;
        let lifetime = self.config.entry_lifetime;
        let timeout = self.config.pending_timeout;
        self.cache
            .retain(|_, (_, learned)| now.saturating_duration_since(*learned) < lifetime);
        self.pending.retain(|ip, pending| {
            let keep = now.saturating_duration_since(pending.since) < timeout;
            if !keep {
                debug!("arp: no reply from {}, dropping {} datagrams", ip, pending.queue.len());
            }
            keep
        });
    }
}

/// Fixed IPv4 -> MAC table
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    table: HashMap<Ipv4Addr, MacAddress>,
    fallback: Option<MacAddress>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, ip: Ipv4Addr, mac: MacAddress) -> Self {
        self.table.insert(ip, mac);
        self
    }

    /// Link address used for destinations missing from the table
    pub fn with_fallback(mut self, mac: MacAddress) -> Self {
        self.fallback = Some(mac);
        self
    }
}

impl Resolver for StaticResolver {
    fn resolve_and_send<D: LinkDevice>(
        &mut self,
        link: &mut Ethernet<D>,
        datagram: PacketBuf,
        dst: Ipv4Addr,
    ) -> Result<()> {
        let mac = if dst == Ipv4Addr::BROADCAST {
            Some(BROADCAST_MAC)
        } else {
            self.table.get(&dst).copied().or(self.fallback)
        };
        match mac {
            Some(mac) => link.transmit(datagram, mac, ethertype::IPV4),
            None => Err(NetError::Unresolved(dst)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iface::device::QueueDevice;
    use crate::link::ethernet::{EthernetHeader, ETHERNET_HEADER_LEN, ETHERNET_MTU};

    const OUR_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
    const OUR_MAC: MacAddress = [0x02, 0, 0, 0, 0, 1];
    const PEER_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);
    const PEER_MAC: MacAddress = [0x02, 0, 0, 0, 0, 2];

    fn link() -> Ethernet<QueueDevice> {
        Ethernet::new(QueueDevice::new(), OUR_MAC, ETHERNET_MTU)
    }

    fn arp_of(frame: &[u8]) -> ArpPacket {
        ArpPacket::from_bytes(&frame[ETHERNET_HEADER_LEN..]).unwrap()
    }

    fn request_from_peer() -> PacketBuf {
        let request = ArpPacket {
            operation: operation::REQUEST,
            sender_mac: PEER_MAC,
            sender_ip: PEER_IP,
            target_mac: [0; 6],
            target_ip: OUR_IP,
        };
        PacketBuf::from_frame(&request.to_bytes())
    }

    #[test]
    fn test_packet_roundtrip() {
        let packet = ArpPacket {
            operation: operation::REPLY,
            sender_mac: OUR_MAC,
            sender_ip: OUR_IP,
            target_mac: PEER_MAC,
            target_ip: PEER_IP,
        };
        assert_eq!(ArpPacket::from_bytes(&packet.to_bytes()).unwrap(), packet);
    }

    #[test]
    fn test_rejects_non_ethernet_ipv4() {
        let mut bytes = request_from_peer().data().to_vec();
        bytes[1] = 6;
        assert_eq!(ArpPacket::from_bytes(&bytes), Err(ParseError::UnsupportedArp));
    }

    #[test]
    fn test_answers_request_and_learns_sender() {
        let mut link = link();
        let mut resolver = ArpResolver::new(OUR_IP, ArpConfig::default());

        resolver.receive(&mut link, request_from_peer(), PEER_MAC).unwrap();

        assert_eq!(resolver.lookup(PEER_IP), Some(PEER_MAC));
        let frames = link.device_mut().take_transmitted();
        assert_eq!(frames.len(), 1);
        let eth = EthernetHeader::from_bytes(&frames[0]).unwrap();
        assert_eq!(eth.dst, PEER_MAC);
        assert_eq!(eth.ethertype, ethertype::ARP);
        let reply = arp_of(&frames[0]);
        assert_eq!(reply.operation, operation::REPLY);
        assert_eq!(reply.sender_ip, OUR_IP);
        assert_eq!(reply.sender_mac, OUR_MAC);
        assert_eq!(reply.target_ip, PEER_IP);
    }

    #[test]
    fn test_ignores_request_for_other_host() {
        let mut link = link();
        let mut resolver = ArpResolver::new(OUR_IP, ArpConfig::default());
        let request = ArpPacket {
            operation: operation::REQUEST,
            sender_mac: PEER_MAC,
            sender_ip: PEER_IP,
            target_mac: [0; 6],
            target_ip: Ipv4Addr::new(10, 0, 0, 3),
        };

        resolver
            .receive(&mut link, PacketBuf::from_frame(&request.to_bytes()), PEER_MAC)
            .unwrap();
        assert!(link.device_mut().take_transmitted().is_empty());
        assert_eq!(resolver.lookup(PEER_IP), None);
    }

    #[test]
    fn test_miss_queues_and_reply_flushes() {
        let mut link = link();
        let mut resolver = ArpResolver::new(OUR_IP, ArpConfig::default());

        resolver
            .resolve_and_send(&mut link, PacketBuf::from_payload(b"one"), PEER_IP)
            .unwrap();
        resolver
            .resolve_and_send(&mut link, PacketBuf::from_payload(b"two"), PEER_IP)
            .unwrap();
        assert_eq!(resolver.queued(PEER_IP), 2);

        // One broadcast request for both datagrams
        let frames = link.device_mut().take_transmitted();
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][0..6], &BROADCAST_MAC);
        let request = arp_of(&frames[0]);
        assert_eq!(request.operation, operation::REQUEST);
        assert_eq!(request.target_ip, PEER_IP);

        let reply = ArpPacket {
            operation: operation::REPLY,
            sender_mac: PEER_MAC,
            sender_ip: PEER_IP,
            target_mac: OUR_MAC,
            target_ip: OUR_IP,
        };
        resolver
            .receive(&mut link, PacketBuf::from_frame(&reply.to_bytes()), PEER_MAC)
            .unwrap();

        let frames = link.device_mut().take_transmitted();
        assert_eq!(frames.len(), 2);
        assert_eq!(&frames[0][0..6], &PEER_MAC);
        assert_eq!(&frames[0][14..17], b"one");
        assert_eq!(&frames[1][14..17], b"two");
        assert_eq!(resolver.queued(PEER_IP), 0);
    }

    #[test]
    fn test_queue_limit_drops_oldest() {
        let mut link = link();
        let config = ArpConfig {
            max_queued: 2,
            ..ArpConfig::default()
        };
        let mut resolver = ArpResolver::new(OUR_IP, config);
        for payload in [b"a", b"b", b"c"] {
            resolver
                .resolve_and_send(&mut link, PacketBuf::from_payload(payload), PEER_IP)
                .unwrap();
        }
        assert_eq!(resolver.queued(PEER_IP), 2);
    }

    #[test]
    fn test_fragments_of_one_datagram_count_once() {
        let mut link = link();
        let config = ArpConfig {
            max_queued: 1,
            ..ArpConfig::default()
        };
        let mut resolver = ArpResolver::new(OUR_IP, config);
        let fragment = |id: u16, byte: u8| {
            let mut datagram = vec![byte; IPV4_HEADER_LEN + 8];
            BigEndian::write_u16(&mut datagram[4..6], id);
            PacketBuf::from_payload(&datagram)
        };

        for byte in 0..6 {
            resolver
                .resolve_and_send(&mut link, fragment(40, byte), PEER_IP)
                .unwrap();
        }
        assert_eq!(resolver.queued(PEER_IP), 1);

        let reply = ArpPacket {
            operation: operation::REPLY,
            sender_mac: PEER_MAC,
            sender_ip: PEER_IP,
            target_mac: OUR_MAC,
            target_ip: OUR_IP,
        };
        link.device_mut().take_transmitted();
        resolver
            .receive(&mut link, PacketBuf::from_frame(&reply.to_bytes()), PEER_MAC)
            .unwrap();
        let frames = link.device_mut().take_transmitted();
        assert_eq!(frames.len(), 6);
        for (byte, frame) in frames.iter().enumerate() {
            assert_eq!(frame[ETHERNET_HEADER_LEN + 1], byte as u8);
        }

        // A second datagram pushes the first out
        resolver
            .resolve_and_send(&mut link, fragment(41, 0), Ipv4Addr::new(10, 0, 0, 9))
            .unwrap();
        resolver
            .resolve_and_send(&mut link, fragment(42, 0), Ipv4Addr::new(10, 0, 0, 9))
            .unwrap();
        assert_eq!(resolver.queued(Ipv4Addr::new(10, 0, 0, 9)), 1);
    }

    #[test]
    fn test_expire_drops_stale_state() {
        let mut link = link();
        let start = Instant::now();
        let mut resolver = ArpResolver::new(OUR_IP, ArpConfig::default());
        resolver.expire(start);
        resolver.insert(PEER_IP, PEER_MAC);
        resolver
            .resolve_and_send(&mut link, PacketBuf::from_payload(b"x"), Ipv4Addr::new(10, 0, 0, 9))
            .unwrap();

        resolver.expire(start + Duration::from_secs(10));
        assert_eq!(resolver.queued(Ipv4Addr::new(10, 0, 0, 9)), 0);
        assert_eq!(resolver.lookup(PEER_IP), Some(PEER_MAC));

        resolver.expire(start + Duration::from_secs(61));
        assert_eq!(resolver.lookup(PEER_IP), None);
    }

    #[test]
    fn test_static_resolver() {
        let mut link = link();
        let mut resolver = StaticResolver::new().with_entry(PEER_IP, PEER_MAC);

        resolver
            .resolve_and_send(&mut link, PacketBuf::from_payload(b"x"), PEER_IP)
            .unwrap();
        assert_eq!(&link.device_mut().take_transmitted()[0][0..6], &PEER_MAC);

        let unknown = Ipv4Addr::new(10, 0, 0, 7);
        assert!(matches!(
            resolver.resolve_and_send(&mut link, PacketBuf::from_payload(b"x"), unknown),
            Err(NetError::Unresolved(ip)) if ip == unknown
        ));

        let mut resolver = resolver.with_fallback(BROADCAST_MAC);
        resolver
            .resolve_and_send(&mut link, PacketBuf::from_payload(b"x"), unknown)
            .unwrap();
        assert_eq!(&link.device_mut().take_transmitted()[0][0..6], &BROADCAST_MAC);
    }
}
