//! Local address discovery for the control plane.
//!
//! Grounded on `process.c: getControlIp`, which picks "the first
//! non-loopback local IPv4 address" to advertise as the switch's (or
//! tester's) own control-plane identity. The original walked the host's
//! interface list; we get the same answer more simply by asking the
//! kernel which local address it would route a packet out of, which
//! needs no interface-enumeration API and never actually sends anything.

use std::io;
use std::net::UdpSocket;

/// Returns the first non-loopback local IPv4 address the kernel would use
/// to reach the wider network, per §3's "our control-plane IP".
pub fn first_non_loopback_ipv4() -> io::Result<[u8; 4]> {
    let socket = UdpSocket::bind("0.0.0.0:0")?;
    // 8.8.8.8 is never actually contacted -- UDP `connect` only asks the
    // kernel to pick a route and a source address for it.
    socket.connect("8.8.8.8:80")?;
    match socket.local_addr()?.ip() {
        std::net::IpAddr::V4(v4) => Ok(v4.octets()),
        std::net::IpAddr::V6(_) => Err(io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            "no local IPv4 route found",
        )),
    }
}
