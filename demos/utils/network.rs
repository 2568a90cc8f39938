use std::io;
use std::net::Ipv4Addr;
use std::process::Command;

fn run_ip(args: &[&str]) -> io::Result<()> {
    let status = Command::new("ip").args(args).status()?;
    if !status.success() {
        return Err(io::Error::new(
            io::ErrorKind::Other,
            format!("`ip {}` exited with {}", args.join(" "), status),
        ));
    }
    Ok(())
}

/// Give the host side of the TAP device an address and bring it up
pub fn configure_interface(iface_name: &str, ip_cidr: &str) -> io::Result<()> {
    // ip addr add <ip_cidr> dev <iface_name>
    run_ip(&["addr", "add", ip_cidr, "dev", iface_name])?;
    // ip link set up dev <iface_name>
    run_ip(&["link", "set", "up", "dev", iface_name])?;

    println!(
        "Interface {} configured with IP {} and brought up",
        iface_name, ip_cidr
    );
    Ok(())
}

/// Split "a.b.c.d/len" into address and prefix length
#[allow(dead_code)]
pub fn parse_ip_cidr(ip_cidr: &str) -> Option<(Ipv4Addr, u8)> {
    let (addr, prefix) = ip_cidr.split_once('/')?;
    let addr = addr.parse::<Ipv4Addr>().ok()?;
    let prefix_len = prefix.parse::<u8>().ok()?;
    if prefix_len > 32 {
        return None;
    }
    Some((addr, prefix_len))
}
