//! Ethernet II framing
//!
//! Strips and adds the 14-byte link header and pads short payloads to the
//! 46-byte minimum. Frames are handed to and read from a [`LinkDevice`].

use byteorder::{BigEndian, ByteOrder};
use log::trace;

use crate::buffer::PacketBuf;
use crate::error::{ParseError, Result};
use crate::iface::device::LinkDevice;

pub const ETHERNET_HEADER_LEN: usize = 14;
pub const ETHERNET_MIN_PAYLOAD: usize = 46;
pub const ETHERNET_MTU: usize = 1500;

pub type MacAddress = [u8; 6];

pub const BROADCAST_MAC: MacAddress = [0xFF; 6];

/// EtherType constants
pub mod ethertype {
    pub const IPV4: u16 = 0x0800;
    pub const ARP: u16 = 0x0806;
}

/// Ethernet II frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EthernetHeader {
    pub dst: MacAddress,
    pub src: MacAddress,
    pub ethertype: u16,
}

impl EthernetHeader {
    pub fn from_bytes(data: &[u8]) -> std::result::Result<Self, ParseError> {
        if data.len() < ETHERNET_HEADER_LEN {
            return Err(ParseError::TooShort {
                expected: ETHERNET_HEADER_LEN,
                actual: data.len(),
            });
        }

        let mut dst = [0u8; 6];
        let mut src = [0u8; 6];
        dst.copy_from_slice(&data[0..6]);
        src.copy_from_slice(&data[6..12]);
        Ok(EthernetHeader {
            dst,
            src,
            ethertype: BigEndian::read_u16(&data[12..14]),
        })
    }

    pub fn write(&self, buf: &mut [u8]) {
        buf[0..6].copy_from_slice(&self.dst);
        buf[6..12].copy_from_slice(&self.src);
        BigEndian::write_u16(&mut buf[12..14], self.ethertype);
    }

    /// Decode the header of a received frame and remove it from the buffer
    pub fn strip(mut frame: PacketBuf) -> std::result::Result<(Self, PacketBuf), ParseError> {
        let header = Self::from_bytes(frame.data())?;
        let actual = frame.len();
        frame
            .pull_header(ETHERNET_HEADER_LEN)
            .map_err(|_| ParseError::TooShort {
                expected: ETHERNET_HEADER_LEN,
                actual,
            })?;
        Ok((header, frame))
    }
}

/// Build a complete frame around `payload`; used by tests and tools that
/// inject traffic.
pub fn build_frame(dst: MacAddress, src: MacAddress, ethertype: u16, payload: &[u8]) -> Vec<u8> {
    let mut frame = vec![0u8; ETHERNET_HEADER_LEN];
    EthernetHeader { dst, src, ethertype }.write(&mut frame);
    frame.extend_from_slice(payload);
    frame
}

/// The framer bound to one link device
pub struct Ethernet<D: LinkDevice> {
    device: D,
    mac: MacAddress,
    rx_buf: Vec<u8>,
}

impl<D: LinkDevice> Ethernet<D> {
    pub fn new(device: D, mac: MacAddress, mtu: usize) -> Self {
        Ethernet {
            device,
            mac,
            rx_buf: vec![0u8; ETHERNET_HEADER_LEN + mtu],
        }
    }

    /// Hardware address used as the source of every frame
    pub fn mac(&self) -> MacAddress {
        self.mac
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// Frame `payload` and hand it to the device.
    ///
    /// Payloads shorter than the Ethernet minimum are zero padded. Device
    /// errors are returned as-is; nothing is retried.
    pub fn transmit(&mut self, mut payload: PacketBuf, dst: MacAddress, protocol: u16) -> Result<()> {
        if payload.len() < ETHERNET_MIN_PAYLOAD {
            payload.add_padding(ETHERNET_MIN_PAYLOAD - payload.len())?;
        }

        let header = EthernetHeader {
            dst,
            src: self.mac,
            ethertype: protocol,
        };
        header.write(payload.push_header(ETHERNET_HEADER_LEN)?);

        trace!(
            "tx frame type={:#06x} len={} dst={}",
            protocol,
            payload.len(),
            format_mac(&dst)
        );
        self.device.transmit(payload.data())?;
        Ok(())
    }

    /// Read one frame from the device, if any is waiting
    pub fn poll(&mut self) -> Result<Option<PacketBuf>> {
        match self.device.poll_receive(&mut self.rx_buf)? {
            Some(len) => {
                let len = len.min(self.rx_buf.len());
                trace!("rx frame len={}", len);
                Ok(Some(PacketBuf::from_frame(&self.rx_buf[..len])))
            }
            None => Ok(None),
        }
    }
}

pub fn format_mac(mac: &MacAddress) -> String {
    mac.iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(":")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iface::device::QueueDevice;

    const OUR_MAC: MacAddress = [0x02, 0, 0, 0, 0, 1];
    const PEER_MAC: MacAddress = [0x02, 0, 0, 0, 0, 2];

    #[test]
    fn test_header_roundtrip() {
        let frame = build_frame(PEER_MAC, OUR_MAC, ethertype::ARP, &[]);
        let header = EthernetHeader::from_bytes(&frame).unwrap();
        assert_eq!(header.dst, PEER_MAC);
        assert_eq!(header.src, OUR_MAC);
        assert_eq!(header.ethertype, ethertype::ARP);
    }

    #[test]
    fn test_strip_header_only_frame() {
        let frame = build_frame(OUR_MAC, PEER_MAC, ethertype::IPV4, &[]);
        let (header, payload) = EthernetHeader::strip(PacketBuf::from_frame(&frame)).unwrap();
        assert_eq!(header.src, PEER_MAC);
        assert!(payload.is_empty());
    }

    #[test]
    fn test_strip_short_frame() {
        let frame = build_frame(OUR_MAC, PEER_MAC, ethertype::IPV4, &[]);
        let result = EthernetHeader::strip(PacketBuf::from_frame(&frame[..13]));
        assert_eq!(
            result.map(|(h, _)| h),
            Err(ParseError::TooShort { expected: 14, actual: 13 })
        );
    }

    #[test]
    fn test_transmit_pads_short_payload() {
        let mut link = Ethernet::new(QueueDevice::new(), OUR_MAC, ETHERNET_MTU);
        link.transmit(PacketBuf::from_payload(b"hi"), PEER_MAC, ethertype::IPV4)
            .unwrap();

        let frames = link.device_mut().take_transmitted();
        assert_eq!(frames.len(), 1);
        let frame = &frames[0];
        assert_eq!(frame.len(), ETHERNET_HEADER_LEN + ETHERNET_MIN_PAYLOAD);
        assert_eq!(&frame[0..6], &PEER_MAC);
        assert_eq!(&frame[6..12], &OUR_MAC);
        assert_eq!(&frame[12..14], &[0x08, 0x00]);
        assert_eq!(&frame[14..16], b"hi");
        assert!(frame[16..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_transmit_long_payload_unpadded() {
        let mut link = Ethernet::new(QueueDevice::new(), OUR_MAC, ETHERNET_MTU);
        link.transmit(PacketBuf::from_payload(&[1u8; 100]), PEER_MAC, ethertype::IPV4)
            .unwrap();
        assert_eq!(link.device_mut().take_transmitted()[0].len(), 114);
    }

    #[test]
    fn test_transmit_reports_device_failure() {
        let mut device = QueueDevice::new();
        device.set_fail_transmit(true);
        let mut link = Ethernet::new(device, OUR_MAC, ETHERNET_MTU);
        assert!(link
            .transmit(PacketBuf::from_payload(b"x"), PEER_MAC, ethertype::IPV4)
            .is_err());
    }

    #[test]
    fn test_poll() {
        let mut link = Ethernet::new(QueueDevice::new(), OUR_MAC, ETHERNET_MTU);
        assert!(link.poll().unwrap().is_none());

        let frame = build_frame(OUR_MAC, PEER_MAC, ethertype::IPV4, &[9; 20]);
        link.device_mut().inject(frame.clone());
        let buf = link.poll().unwrap().unwrap();
        assert_eq!(buf.data(), frame.as_slice());
    }

    #[test]
    fn test_format_mac() {
        assert_eq!(format_mac(&PEER_MAC), "02:00:00:00:00:02");
    }
}
