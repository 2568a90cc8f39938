//! TAP link device
//!
//! Wraps a `tun-tap` interface in TAP mode so the stack sees whole Ethernet
//! frames. The device is switched to non-blocking mode; an empty read is
//! reported as "nothing available" instead of blocking the poll loop.
//!
//! Note: Root/sudo privileges are required to create the TAP device.

use std::io;

use log::debug;
use tun_tap::{Iface, Mode};

use crate::iface::device::LinkDevice;

pub struct TapDevice {
    iface: Iface,
}

impl TapDevice {
    /// Create (or attach to) the TAP interface `name`
    pub fn open(name: &str) -> io::Result<Self> {
        let iface = Iface::without_packet_info(name, Mode::Tap)?;
        iface.set_non_blocking()?;
        debug!("TAP device {} opened", iface.name());
        Ok(TapDevice { iface })
    }

    /// Kernel-side name of the interface
    pub fn name(&self) -> &str {
        self.iface.name()
    }
}

impl LinkDevice for TapDevice {
    fn poll_receive(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        match self.iface.recv(buf) {
            Ok(nbytes) => Ok(Some(nbytes)),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn transmit(&mut self, frame: &[u8]) -> io::Result<()> {
        let sent = self.iface.send(frame)?;
        if sent != frame.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("short write: {} of {} bytes", sent, frame.len()),
            ));
        }
        Ok(())
    }
}
