//! UDP echo server (port 7) on a TAP interface
//!
//! Handlers cannot call back into the interface, so received datagrams are
//! queued and echoed after each poll.
//!
//! ```sh
//! cargo run --example udp_echo
//! echo hello | nc -u 10.0.0.1 7
//! ```
//!
//! Note: Root/sudo privileges are required to create and configure the TAP device.

mod utils;

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::net::Ipv4Addr;
use std::rc::Rc;
use std::thread;
use std::time::Duration;

use toy_ipstack::{Config, Interface, TapDevice};
use utils::network::configure_interface;

const ECHO_PORT: u16 = 7;

fn main() -> io::Result<()> {
    let device = TapDevice::open("tap0")?;
    configure_interface(device.name(), "10.0.0.254/24")?;

    let config = Config::new([0x02, 0, 0, 0, 0, 0x07], Ipv4Addr::new(10, 0, 0, 1));
    let mut iface = Interface::new(config, device);

    let pending: Rc<RefCell<VecDeque<(Vec<u8>, Ipv4Addr, u16)>>> = Rc::default();
    let queue = pending.clone();
    iface
        .udp_open(ECHO_PORT, move |data: &[u8], src: Ipv4Addr, src_port: u16| {
            queue.borrow_mut().push_back((data.to_vec(), src, src_port));
        })
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
    println!("Echo server listening on 10.0.0.1:{}", ECHO_PORT);

    loop {
        let busy = match iface.poll() {
            Ok(busy) => busy,
            Err(e) => {
                eprintln!("Poll failed: {}", e);
                false
            }
        };

        let replies: Vec<_> = pending.borrow_mut().drain(..).collect();
        for (data, src, src_port) in replies {
            println!("Echoing {} bytes to {}:{}", data.len(), src, src_port);
            if let Err(e) = iface.udp_send(&data, ECHO_PORT, src, src_port) {
                eprintln!("Failed to send response: {}", e);
            }
        }

        if !busy {
            thread::sleep(Duration::from_millis(1));
        }
    }
}
