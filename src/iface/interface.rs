//! Network interface and packet processing
//!
//! `Interface` is one instance of the stack. It owns the link device, the
//! address resolver, both dispatch tables, the UDP port table, the IPv4
//! identification counter and the reassembly state. Processing is poll
//! driven and single threaded: each call to [`Interface::poll`] reads at most
//! one frame and runs it through
//! Ethernet -> IPv4 -> (ICMP | UDP) -> application handler before returning.
//!
//! Outbound data takes the reverse path:
//! UDP -> IPv4 fragmentation -> address resolution -> Ethernet -> device.
//!
//! Malformed input is dropped with a debug log. Datagrams for an unsupported
//! protocol or a closed port are answered with ICMP Destination Unreachable.

use std::net::Ipv4Addr;
use std::time::Instant;

use log::{debug, trace, warn};

use crate::buffer::PacketBuf;
use crate::config::Config;
use crate::error::{NetError, Result};
use crate::iface::device::LinkDevice;
use crate::iface::dispatch::{Handler, ProtocolTable};
use crate::link::arp::{ArpResolver, Resolver};
use crate::link::ethernet::{ethertype, Ethernet, EthernetHeader};
use crate::network::fragment::Reassembler;
use crate::network::icmp::{IcmpUtils, UnreachableCode};
use crate::network::ipv4::{protocol, Ipv4Header, IPV4_HEADER_LEN, MAX_PAYLOAD_LEN};
use crate::transport::udp::{UdpTable, UdpUtils, MAX_UDP_PAYLOAD, UDP_HEADER_LEN};

/// Network interface for packet processing
pub struct Interface<D: LinkDevice, R: Resolver = ArpResolver> {
    config: Config,
    link: Ethernet<D>,
    resolver: R,
    /// EtherType -> handler
    link_protocols: ProtocolTable,
    /// IP protocol number -> handler
    ip_protocols: ProtocolTable,
    udp: UdpTable,
    reassembler: Reassembler,
    /// Identification for the next outgoing datagram
    next_id: u16,
}

impl<D: LinkDevice> Interface<D, ArpResolver> {
    /// Create an interface that resolves next hops with ARP
    pub fn new(config: Config, device: D) -> Self {
        let resolver = ArpResolver::new(config.ip, config.arp);
        Self::with_resolver(config, device, resolver)
    }
}

impl<D: LinkDevice, R: Resolver> Interface<D, R> {
    pub fn with_resolver(config: Config, device: D, resolver: R) -> Self {
        let mut link_protocols = ProtocolTable::new();
        link_protocols.register(ethertype::IPV4, Handler::Ipv4);
        link_protocols.register(ethertype::ARP, Handler::Arp);

        let mut ip_protocols = ProtocolTable::new();
        ip_protocols.register(protocol::ICMP as u16, Handler::Icmp);
        ip_protocols.register(protocol::UDP as u16, Handler::Udp);

        debug!(
            "interface up: ip={} mtu={} udp ports={}",
            config.ip, config.mtu, config.udp_port_capacity
        );

        Interface {
            link: Ethernet::new(device, config.mac, config.mtu),
            resolver,
            link_protocols,
            ip_protocols,
            udp: UdpTable::new(config.udp_port_capacity),
            reassembler: Reassembler::new(config.reassembly),
            next_id: 0,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn device(&self) -> &D {
        self.link.device()
    }

    pub fn device_mut(&mut self) -> &mut D {
        self.link.device_mut()
    }

    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    pub fn resolver_mut(&mut self) -> &mut R {
        &mut self.resolver
    }

    /// Number of datagrams waiting for missing fragments
    pub fn pending_reassembly(&self) -> usize {
        self.reassembler.pending()
    }

    /// Route frames with `ethertype` to `handler`; returns the replaced handler.
    ///
    /// Only `Handler::Ipv4` and `Handler::Arp` take link frames.
    pub fn register_link_protocol(&mut self, ethertype: u16, handler: Handler) -> Result<Option<Handler>> {
        if !handler.is_link_layer() {
            return Err(NetError::MisplacedHandler(handler));
        }
        Ok(self.link_protocols.register(ethertype, handler))
    }

    pub fn unregister_link_protocol(&mut self, ethertype: u16) -> Option<Handler> {
        self.link_protocols.unregister(ethertype)
    }

    /// Route datagrams carrying `protocol` to `handler`.
    ///
    /// Only `Handler::Icmp` and `Handler::Udp` take IPv4 payloads.
    pub fn register_ip_protocol(&mut self, protocol: u8, handler: Handler) -> Result<Option<Handler>> {
        if !handler.is_ip_layer() {
            return Err(NetError::MisplacedHandler(handler));
        }
        Ok(self.ip_protocols.register(protocol as u16, handler))
    }

    /// Stop accepting `protocol`; later datagrams get Protocol Unreachable
    pub fn unregister_ip_protocol(&mut self, protocol: u8) -> Option<Handler> {
        self.ip_protocols.unregister(protocol as u16)
    }

    /// Poll the device once using the current time
    pub fn poll(&mut self) -> Result<bool> {
        self.poll_at(Instant::now())
    }

    /// Expire stale state, then read and process at most one frame.
    ///
    /// Returns whether a frame was processed. Only device errors are
    /// returned; problems with the frame itself never are.
    pub fn poll_at(&mut self, now: Instant) -> Result<bool> {
        self.expire(now);

        match self.link.poll()? {
            Some(frame) => {
                self.process_frame(frame, now);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Run one received frame through the stack
    pub fn receive_frame(&mut self, frame: &[u8]) {
        self.receive_frame_at(frame, Instant::now());
    }

    /// Expire stale state at `now`, then process `frame`
    pub fn receive_frame_at(&mut self, frame: &[u8], now: Instant) {
        self.expire(now);
        self.process_frame(PacketBuf::from_frame(frame), now);
    }

    fn expire(&mut self, now: Instant) {
        self.reassembler.purge_expired(now);
        self.resolver.expire(now);
    }

    fn process_frame(&mut self, frame: PacketBuf, now: Instant) {
        let (eth, payload) = match EthernetHeader::strip(frame) {
            Ok(parts) => parts,
            Err(e) => {
                debug!("dropping frame: {}", e);
                return;
            }
        };

        match self.link_protocols.lookup(eth.ethertype) {
            Some(Handler::Ipv4) => self.process_ipv4_packet(payload, now),
            Some(Handler::Arp) => {
                if let Err(e) = self.resolver.receive(&mut self.link, payload, eth.src) {
                    warn!("failed to answer address resolution: {}", e);
                }
            }
            _ => trace!("no handler for ethertype {:#06x}", eth.ethertype),
        }
    }

    /// Validate, defragment and dispatch one IPv4 datagram
    fn process_ipv4_packet(&mut self, mut packet: PacketBuf, now: Instant) {
        let ip_header = match Ipv4Header::from_bytes(packet.data()) {
            Ok(header) => header,
            Err(e) => {
                debug!("dropping IPv4 packet: {}", e);
                return;
            }
        };

        if let Err(e) = ip_header.validate(packet.len()) {
            debug!("dropping IPv4 packet from {}: {}", ip_header.src_addr, e);
            return;
        }

        if !self.is_for_us(&ip_header.dst_addr) {
            trace!("ignoring IPv4 packet for {}", ip_header.dst_addr);
            return;
        }

        // Strip link-layer padding, then the header
        packet.truncate(ip_header.total_len as usize);
        if packet.pull_header(IPV4_HEADER_LEN).is_err() {
            return;
        }

        if ip_header.is_fragment() {
            trace!(
                "fragment id={} offset={} mf={} from {}",
                ip_header.id,
                ip_header.fragment_offset(),
                ip_header.more_fragments(),
                ip_header.src_addr
            );
            if let Some((header, datagram)) =
                self.reassembler.add_fragment(&ip_header, packet.data(), now)
            {
                self.dispatch_transport(&header, PacketBuf::from_frame(&datagram));
            }
            return;
        }

        self.dispatch_transport(&ip_header, packet);
    }

    fn dispatch_transport(&mut self, ip_header: &Ipv4Header, payload: PacketBuf) {
        match self.ip_protocols.lookup(ip_header.protocol as u16) {
            Some(Handler::Udp) => self.process_udp(ip_header, payload),
            Some(Handler::Icmp) => self.process_icmpv4(ip_header, payload),
            _ => {
                debug!(
                    "unsupported protocol {} from {}",
                    ip_header.protocol, ip_header.src_addr
                );
                let original = Self::original_datagram(ip_header, &payload);
                self.report_unreachable(&original, ip_header.src_addr, UnreachableCode::ProtocolUnreachable);
            }
        }
    }

    /// Process ICMPv4 message
    fn process_icmpv4(&mut self, ip_header: &Ipv4Header, payload: PacketBuf) {
        let icmp_header = match IcmpUtils::validate(payload.data()) {
            Ok(header) => header,
            Err(e) => {
                debug!("dropping ICMP message from {}: {}", ip_header.src_addr, e);
                return;
            }
        };

        if !icmp_header.is_echo_request() {
            debug!(
                "ignoring ICMP type {} code {} from {}",
                icmp_header.msg_type, icmp_header.msg_code, ip_header.src_addr
            );
            return;
        }

        debug!(
            "echo request id={} seq={} from {}",
            icmp_header.identifier(),
            icmp_header.sequence(),
            ip_header.src_addr
        );
        let reply = match IcmpUtils::create_echo_reply(payload.data()) {
            Ok(reply) => reply,
            Err(e) => {
                debug!("cannot build echo reply: {}", e);
                return;
            }
        };
        if let Err(e) = self.ipv4_send(PacketBuf::from_payload(&reply), ip_header.src_addr, protocol::ICMP) {
            warn!("failed to send echo reply to {}: {}", ip_header.src_addr, e);
        }
    }

    /// Process UDP datagram
    fn process_udp(&mut self, ip_header: &Ipv4Header, mut payload: PacketBuf) {
        let udp_header =
            match UdpUtils::validate_udp_packet(ip_header.src_addr, self.config.ip, payload.data()) {
                Ok(header) => header,
                Err(e) => {
                    debug!("dropping UDP datagram from {}: {}", ip_header.src_addr, e);
                    return;
                }
            };
        payload.truncate(udp_header.length as usize);

        match self.udp.handler_mut(udp_header.dst_port) {
            Some(handler) => {
                if payload.pull_header(UDP_HEADER_LEN).is_ok() {
                    trace!(
                        "udp {}:{} -> port {} ({} bytes)",
                        ip_header.src_addr,
                        udp_header.src_port,
                        udp_header.dst_port,
                        payload.len()
                    );
                    (*handler)(payload.data(), ip_header.src_addr, udp_header.src_port);
                }
            }
            None => {
                debug!(
                    "no handler on port {} for {}:{}",
                    udp_header.dst_port, ip_header.src_addr, udp_header.src_port
                );
                let original = Self::original_datagram(ip_header, &payload);
                self.report_unreachable(&original, ip_header.src_addr, UnreachableCode::PortUnreachable);
            }
        }
    }

    /// Check if packet is destined for this interface
    fn is_for_us(&self, dst_addr: &Ipv4Addr) -> bool {
        dst_addr == &self.config.ip
    }

    /// Rebuild the datagram an ICMP error should quote
    fn original_datagram(ip_header: &Ipv4Header, payload: &PacketBuf) -> Vec<u8> {
        let mut original = Vec::with_capacity(IPV4_HEADER_LEN + payload.len());
        original.extend_from_slice(&ip_header.to_bytes());
        original.extend_from_slice(payload.data());
        original
    }

    fn report_unreachable(&mut self, original: &[u8], dst: Ipv4Addr, code: UnreachableCode) {
        if let Err(e) = self.send_unreachable(original, dst, code) {
            warn!("failed to send {:?} to {}: {}", code, dst, e);
        }
    }

    /// Send ICMP Destination Unreachable about `original` to `dst`
    pub fn send_unreachable(&mut self, original: &[u8], dst: Ipv4Addr, code: UnreachableCode) -> Result<()> {
        let message = IcmpUtils::create_unreachable(original, code);
        self.ipv4_send(PacketBuf::from_payload(&message), dst, protocol::ICMP)
    }

    /// Send `payload` to `dst` as one IPv4 datagram, fragmenting as needed.
    ///
    /// All fragments share one identification. If a fragment fails to go
    /// out the error is returned and the fragments already sent stay sent.
    pub fn ipv4_send(&mut self, payload: PacketBuf, dst: Ipv4Addr, protocol: u8) -> Result<()> {
        let total = payload.len();
        if total > MAX_PAYLOAD_LEN {
            return Err(NetError::PayloadTooLarge(total));
        }

        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);

        let max_payload = self.config.max_fragment_payload();
        if total <= max_payload {
            return self.ipv4_fragment_emit(payload, dst, protocol, id, 0, false);
        }

        debug!(
            "fragmenting {} bytes to {} into {} byte pieces (id={})",
            total, dst, max_payload, id
        );
        let data = payload.data();
        let mut offset = 0;
        while offset < total {
            let end = (offset + max_payload).min(total);
            let more_fragments = end < total;
            let fragment = PacketBuf::from_payload(&data[offset..end]);
            self.ipv4_fragment_emit(fragment, dst, protocol, id, offset, more_fragments)?;
            offset = end;
        }
        Ok(())
    }

    /// Put an IPv4 header on one fragment and hand it to address resolution.
    ///
    /// `byte_offset` must be a multiple of 8.
    pub fn ipv4_fragment_emit(
        &mut self,
        mut payload: PacketBuf,
        dst: Ipv4Addr,
        protocol: u8,
        id: u16,
        byte_offset: usize,
        more_fragments: bool,
    ) -> Result<()> {
        if byte_offset % 8 != 0 {
            return Err(NetError::MisalignedFragment(byte_offset));
        }
        if byte_offset + payload.len() > MAX_PAYLOAD_LEN {
            return Err(NetError::PayloadTooLarge(byte_offset + payload.len()));
        }

        let mut ip_header = Ipv4Header::new_fragment(
            protocol,
            self.config.ip,
            dst,
            payload.len() as u16,
            id,
            byte_offset,
            more_fragments,
            self.config.ttl,
        );
        ip_header.update_checksum();
        ip_header.write(payload.push_header(IPV4_HEADER_LEN)?);

        trace!(
            "ipv4 tx id={} offset={} mf={} len={} to {}",
            id,
            byte_offset,
            more_fragments,
            ip_header.total_len,
            dst
        );
        self.resolver.resolve_and_send(&mut self.link, payload, dst)
    }

    /// Register `handler` for datagrams arriving on `port`.
    ///
    /// Opening a port that is already open replaces its handler.
    pub fn udp_open<F>(&mut self, port: u16, handler: F) -> Result<()>
    where
        F: FnMut(&[u8], Ipv4Addr, u16) + 'static,
    {
        self.udp.open(port, Box::new(handler))?;
        debug!("udp port {} open", port);
        Ok(())
    }

    /// Close `port`; closing a port that is not open does nothing
    pub fn udp_close(&mut self, port: u16) {
        if self.udp.close(port) {
            debug!("udp port {} closed", port);
        }
    }

    pub fn udp_is_open(&self, port: u16) -> bool {
        self.udp.is_open(port)
    }

    /// Send `data` from local `src_port` to `dst_addr:dst_port`
    pub fn udp_send(&mut self, data: &[u8], src_port: u16, dst_addr: Ipv4Addr, dst_port: u16) -> Result<()> {
        if data.len() > MAX_UDP_PAYLOAD {
            return Err(NetError::PayloadTooLarge(data.len()));
        }

        let mut datagram = PacketBuf::from_payload(data);
        datagram.push_header(UDP_HEADER_LEN)?;
        UdpUtils::write_header(datagram.data_mut(), self.config.ip, dst_addr, src_port, dst_port);

        self.ipv4_send(datagram, dst_addr, protocol::UDP)
    }
}
