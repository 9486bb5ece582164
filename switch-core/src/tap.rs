//! Kernel TAP device setup for frames the switch does not forward (C5).
//!
//! Grounded on the teacher's raw `libc`/`ioctl` Linux TUN setup
//! (`connlib/libs/tunnel/src/tun_linux.rs`), adapted from `IFF_TUN` to
//! `IFF_TAP` since the switch bridges full L2 Ethernet frames, not raw IP
//! packets, and configured with `ifconfig`-equivalent `rtnetlink`-free
//! `ioctl`s to set the hardware address and IPv4 address the original
//! shelled out to `/sbin/ifconfig` for.

use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::sync::Arc;

#[repr(C)]
struct IfReq {
    name: [u8; libc::IFNAMSIZ],
    flags: i16,
    _pad: [u8; 22],
}

/// A cheaply cloneable handle to the TAP device's file descriptor.
///
/// Multiple forward workers write to it concurrently (§5: "per-worker
/// writes are serialized by the kernel file object; concurrent writes are
/// safe at the frame level") while a single TAP-bridge worker reads from
/// it, so this wraps the raw fd directly rather than `std::fs::File`,
/// which would require an exclusive `&mut` for either direction.
#[derive(Clone)]
pub struct Tap {
    fd: Arc<OwnedFd>,
    pub name: Arc<str>,
}

impl Tap {
    /// Opens `/dev/net/tun` in TAP mode (`IFF_TAP | IFF_NO_PI`) and brings
    /// the resulting interface up with `mac` and `ip`/`255.255.0.0`.
    pub fn open(mac: [u8; 6], ip: [u8; 4]) -> io::Result<Self> {
        let raw = unsafe { libc::open(c"/dev/net/tun".as_ptr(), libc::O_RDWR) };
        if raw < 0 {
            return Err(io::Error::last_os_error());
        }
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };

        let mut req = IfReq {
            name: [0; libc::IFNAMSIZ],
            flags: (libc::IFF_TAP | libc::IFF_NO_PI) as i16,
            _pad: [0; 22],
        };

        if unsafe { libc::ioctl(fd.as_raw_fd(), tunsetiff(), &mut req) } < 0 {
            return Err(io::Error::last_os_error());
        }

        set_nonblocking(&fd)?;

        let nul = req.name.iter().position(|&b| b == 0).unwrap_or(req.name.len());
        let name: Arc<str> = String::from_utf8_lossy(&req.name[..nul]).into_owned().into();

        configure_link(&name, mac, ip)?;

        Ok(Self { fd: Arc::new(fd), name })
    }

    /// Reads up to `buf.len()` bytes (max 8192 per the historical
    /// single-read limit). `Ok(None)` means "no data yet" (non-blocking
    /// fd, nothing to read); `Ok(Some(0))` is EOF, per C5's "on EOF set
    /// own alert and exit"; `Ok(Some(n))` is `n` bytes of one frame.
    pub fn read(&self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        let n = unsafe { libc::read(self.fd.as_raw_fd(), buf.as_mut_ptr() as *mut _, buf.len()) };
        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::WouldBlock {
                return Ok(None);
            }
            return Err(err);
        }
        Ok(Some(n as usize))
    }

    pub fn write(&self, frame: &[u8]) -> io::Result<()> {
        let n = unsafe { libc::write(self.fd.as_raw_fd(), frame.as_ptr() as *const _, frame.len()) };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

fn tunsetiff() -> libc::c_ulong {
    // TUNSETIFF = _IOW('T', 202, int), matching linux/if_tun.h.
    const IOC_NRBITS: u32 = 8;
    const IOC_TYPEBITS: u32 = 8;
    const IOC_SIZEBITS: u32 = 14;
    const IOC_WRITE: u32 = 1;

    let ioc_size = std::mem::size_of::<i32>() as u32;
    let dir = IOC_WRITE;
    let ty = b'T' as u32;
    let nr = 202u32;

    ((dir << (IOC_NRBITS + IOC_TYPEBITS + IOC_SIZEBITS))
        | (ty << IOC_NRBITS)
        | nr
        | (ioc_size << (IOC_NRBITS + IOC_TYPEBITS))) as libc::c_ulong
}

fn set_nonblocking(file: &OwnedFd) -> io::Result<()> {
    let fd = file.as_raw_fd();
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL, 0) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    let ret = unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Sets the interface's hardware address, IPv4 address, netmask, and
/// brings it up -- the `ioctl`-level equivalent of the three `ifconfig`
/// invocations the original shells out to.
fn configure_link(name: &str, mac: [u8; 6], ip: [u8; 4]) -> io::Result<()> {
    let fd = unsafe { libc::socket(libc::AF_INET, libc::SOCK_DGRAM, 0) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    let sock = unsafe { std::os::fd::OwnedFd::from_raw_fd(fd) };

    let mut ifr: libc::ifreq = unsafe { std::mem::zeroed() };
    for (dst, src) in ifr.ifr_name.iter_mut().zip(name.bytes()) {
        *dst = src as i8;
    }

    unsafe {
        ifr.ifr_ifru.ifru_hwaddr.sa_family = libc::ARPHRD_ETHER as u16;
        for (i, byte) in mac.iter().enumerate() {
            ifr.ifr_ifru.ifru_hwaddr.sa_data[i] = *byte as i8;
        }
    }
    if unsafe { libc::ioctl(sock.as_raw_fd(), libc::SIOCSIFHWADDR, &ifr) } < 0 {
        return Err(io::Error::last_os_error());
    }

    let mut addr_ifr: libc::ifreq = unsafe { std::mem::zeroed() };
    for (dst, src) in addr_ifr.ifr_name.iter_mut().zip(name.bytes()) {
        *dst = src as i8;
    }
    set_sockaddr_in(&mut addr_ifr, ip);
    if unsafe { libc::ioctl(sock.as_raw_fd(), libc::SIOCSIFADDR, &addr_ifr) } < 0 {
        return Err(io::Error::last_os_error());
    }

    set_sockaddr_in(&mut addr_ifr, [255, 255, 0, 0]);
    if unsafe { libc::ioctl(sock.as_raw_fd(), libc::SIOCSIFNETMASK, &addr_ifr) } < 0 {
        return Err(io::Error::last_os_error());
    }

    let mut flags_ifr: libc::ifreq = unsafe { std::mem::zeroed() };
    for (dst, src) in flags_ifr.ifr_name.iter_mut().zip(name.bytes()) {
        *dst = src as i8;
    }
    if unsafe { libc::ioctl(sock.as_raw_fd(), libc::SIOCGIFFLAGS, &mut flags_ifr) } < 0 {
        return Err(io::Error::last_os_error());
    }
    unsafe {
        flags_ifr.ifr_ifru.ifru_flags |= (libc::IFF_UP | libc::IFF_RUNNING) as i16;
    }
    if unsafe { libc::ioctl(sock.as_raw_fd(), libc::SIOCSIFFLAGS, &flags_ifr) } < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}

fn set_sockaddr_in(ifr: &mut libc::ifreq, ip: [u8; 4]) {
    unsafe {
        let addr = &mut ifr.ifr_ifru.ifru_addr as *mut libc::sockaddr as *mut libc::sockaddr_in;
        (*addr).sin_family = libc::AF_INET as u16;
        (*addr).sin_addr.s_addr = u32::from_ne_bytes(ip);
    }
}
