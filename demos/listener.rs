//! A UDP listener on a TAP interface
//!
//! Attaches the stack to `tap0` with address 10.0.0.1 and prints every
//! datagram that arrives on the listened ports. Anything else is handled by
//! the stack itself:
//! - ARP requests for 10.0.0.1 are answered
//! - Pings are answered
//! - Datagrams for other ports get ICMP Port Unreachable
//!
//! To run this example:
//!
//! ```sh
//! cargo run --example listener -- 5000 5001
//! echo hi | nc -u 10.0.0.1 5000
//! ```
//!
//! Note: Root/sudo privileges are required to create and configure the TAP device.

use std::io;
use std::net::Ipv4Addr;
use std::thread;
use std::time::Duration;

use toy_ipstack::{Config, Interface, TapDevice};

mod utils;
use utils::network::{configure_interface, parse_ip_cidr};

const HOST_CIDR: &str = "10.0.0.254/24";
const STACK_CIDR: &str = "10.0.0.1/24";
const STACK_MAC: [u8; 6] = [0x02, 0x00, 0x00, 0x00, 0x00, 0x01];

fn main() -> io::Result<()> {
    println!("Starting UDP listener...");

    let ports: Vec<u16> = std::env::args()
        .skip(1)
        .filter_map(|arg| arg.parse().ok())
        .collect();
    let ports = if ports.is_empty() { vec![5000] } else { ports };

    let device = TapDevice::open("tap0")?;
    println!("TAP device created: {}", device.name());
    configure_interface(device.name(), HOST_CIDR)?;

    let (local_addr, _) = parse_ip_cidr(STACK_CIDR)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "bad stack address"))?;
    let mut iface = Interface::new(Config::new(STACK_MAC, local_addr), device);

    for port in ports {
        let mut count = 0u64;
        iface
            .udp_open(port, move |data: &[u8], src: Ipv4Addr, src_port: u16| {
                count += 1;
                println!(
                    "\n[Port {} #{}] {} bytes from {}:{}",
                    port,
                    count,
                    data.len(),
                    src,
                    src_port
                );
                println!("  {}", String::from_utf8_lossy(data));
            })
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        println!("Listening on {}:{}", local_addr, port);
    }

    loop {
        match iface.poll() {
            Ok(true) => {}
            Ok(false) => thread::sleep(Duration::from_millis(1)),
            Err(e) => eprintln!("Poll failed: {}", e),
        }
    }
}
