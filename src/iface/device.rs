//! Link devices
//!
//! A [`LinkDevice`] moves raw Ethernet frames. The stack polls it for one
//! frame at a time and never expects it to block.

use std::collections::VecDeque;
use std::io;

pub trait LinkDevice {
    /// Copy one waiting frame into `buf`.
    ///
    /// Returns `Ok(None)` when nothing is available.
    fn poll_receive(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>>;

    /// Send one complete frame
    fn transmit(&mut self, frame: &[u8]) -> io::Result<()>;
}

/// In-memory device
///
/// Frames pushed with [`inject`](Self::inject) are returned by
/// `poll_receive`; transmitted frames are kept until
/// [`take_transmitted`](Self::take_transmitted).
#[derive(Debug, Default)]
pub struct QueueDevice {
    rx_queue: VecDeque<Vec<u8>>,
    tx_frames: Vec<Vec<u8>>,
    fail_transmit: bool,
}

impl QueueDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a frame to be received
    pub fn inject(&mut self, frame: Vec<u8>) {
        self.rx_queue.push_back(frame);
    }

    /// Frames transmitted since the last call
    pub fn take_transmitted(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.tx_frames)
    }

    /// Make every following transmit fail
    pub fn set_fail_transmit(&mut self, fail: bool) {
        self.fail_transmit = fail;
    }

    pub fn pending_rx(&self) -> usize {
        self.rx_queue.len()
    }
}

impl LinkDevice for QueueDevice {
    fn poll_receive(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        match self.rx_queue.pop_front() {
            Some(frame) => {
                let len = frame.len().min(buf.len());
                buf[..len].copy_from_slice(&frame[..len]);
                Ok(Some(len))
            }
            None => Ok(None),
        }
    }

    fn transmit(&mut self, frame: &[u8]) -> io::Result<()> {
        if self.fail_transmit {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "link is down"));
        }
        self.tx_frames.push(frame.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_device_receive_order() {
        let mut device = QueueDevice::new();
        device.inject(vec![1, 2, 3]);
        device.inject(vec![4]);

        let mut buf = [0u8; 16];
        assert_eq!(device.poll_receive(&mut buf).unwrap(), Some(3));
        assert_eq!(&buf[..3], &[1, 2, 3]);
        assert_eq!(device.poll_receive(&mut buf).unwrap(), Some(1));
        assert_eq!(device.poll_receive(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_queue_device_truncates_to_buffer() {
        let mut device = QueueDevice::new();
        device.inject(vec![7; 10]);
        let mut buf = [0u8; 4];
        assert_eq!(device.poll_receive(&mut buf).unwrap(), Some(4));
    }

    #[test]
    fn test_queue_device_transmit() {
        let mut device = QueueDevice::new();
        device.transmit(&[9, 9]).unwrap();
        assert_eq!(device.take_transmitted(), vec![vec![9, 9]]);
        assert!(device.take_transmitted().is_empty());

        device.set_fail_transmit(true);
        assert!(device.transmit(&[1]).is_err());
    }
}
