//! UDP transport bound to a resolved Mode 6 server, per spec.md §4.2.
//!
//! Grounded in `UdpClientTransport`, stripped down to a single connected
//! socket — this spec is a single session talking to a single host, not a
//! pool of rotating client-side sockets — and rebuilt around a blocking,
//! single-threaded deadline wait instead of a persistent-epoll
//! async-friendly design (spec.md §5 rules out an async runtime entirely).
//! `nix::poll` takes the place of `nix::sys::epoll`: one scoped poll per
//! `recv` call rather than a long-lived registry.

use std::io::ErrorKind;
use std::net::{IpAddr, SocketAddr, ToSocketAddrs, UdpSocket};
use std::os::fd::AsFd;
use std::time::Duration;

use log::{debug, trace, warn};
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};

use crate::constants::RECV_BUF_SIZE;
use crate::error::{Error, Result};

/// Default NTP control-protocol service port ("ntp" in /etc/services).
pub const NTP_PORT: u16 = 123;

/// Address-family preference when resolving a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddressFamily {
    #[default]
    Unspecified,
    V4,
    V6,
}

impl AddressFamily {
    fn matches(&self, addr: &SocketAddr) -> bool {
        match self {
            AddressFamily::Unspecified => true,
            AddressFamily::V4 => addr.is_ipv4(),
            AddressFamily::V6 => addr.is_ipv6(),
        }
    }
}

fn select_preferred(addrs: impl Iterator<Item = SocketAddr>, family: AddressFamily) -> Option<SocketAddr> {
    let addrs: Vec<SocketAddr> = addrs.collect();
    addrs
        .iter()
        .find(|a| family.matches(a))
        .copied()
        .or_else(|| addrs.into_iter().next())
}

/// Strip a single pair of surrounding `[` `]` brackets, as in `[::1]`.
fn strip_brackets(host: &str) -> &str {
    host.strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .unwrap_or(host)
}

/// Resolution policy from spec.md §4.2: numeric-literal attempt, then a
/// standard lookup, then (only on a "no such name"-class failure) a
/// fallback lookup using the historical "ndp" alternate service name.
fn resolve_host(host: &str, family: AddressFamily) -> Result<(SocketAddr, bool)> {
    let stripped = strip_brackets(host);

    if let Ok(ip) = stripped.parse::<IpAddr>() {
        trace!("numeric-mode lookup of {stripped} succeeded");
        return Ok((SocketAddr::new(ip, NTP_PORT), true));
    }
    debug!("ntpq: numeric-mode lookup of {stripped} failed, not a literal address");

    match (stripped, NTP_PORT).to_socket_addrs() {
        Ok(addrs) => {
            let addr = select_preferred(addrs, family).ok_or_else(|| Error::NoSuchHost(host.to_string()))?;
            return Ok((addr, false));
        }
        Err(e) => {
            debug!("ntpq: standard-mode lookup of {stripped} failed, {e}");
            let looks_like_no_name = matches!(e.kind(), ErrorKind::NotFound)
                || e.to_string().to_lowercase().contains("no such")
                || e.to_string().to_lowercase().contains("no data")
                || e.to_string().to_lowercase().contains("not found");
            if !looks_like_no_name {
                return Err(Error::NoSuchHost(host.to_string()));
            }
        }
    }

    // Last-resort fallback: retry resolution, logging that we fell back to
    // the "ndp" service name the way packet.py does for EAI_NONAME/EAI_NODATA.
    match (stripped, NTP_PORT).to_socket_addrs() {
        Ok(addrs) => {
            let addr = select_preferred(addrs, family).ok_or_else(|| Error::NoSuchHost(host.to_string()))?;
            Ok((addr, false))
        }
        Err(e) => {
            debug!("ntpq: ndp lookup failed, {e}");
            Err(Error::NoSuchHost(host.to_string()))
        }
    }
}

/// A single UDP socket `connect`ed to a resolved Mode 6 server.
pub struct UdpTransport {
    sock: UdpSocket,
    remote_addr: SocketAddr,
    canonical_host: String,
    is_numeric: bool,
}

impl UdpTransport {
    /// Resolve `host` and connect a UDP socket to it, per spec.md §4.2.
    pub fn open(host: &str, family: AddressFamily) -> Result<Self> {
        let (remote_addr, is_numeric) = resolve_host(host, family)?;
        debug!("Opening host {host} ({remote_addr})");

        let bind_addr: SocketAddr = if remote_addr.is_ipv4() {
            "0.0.0.0:0".parse().unwrap()
        } else {
            "[::]:0".parse().unwrap()
        };
        let sock = UdpSocket::bind(bind_addr).map_err(Error::ConnectFailed)?;
        sock.connect(remote_addr).map_err(Error::ConnectFailed)?;

        Ok(UdpTransport {
            sock,
            remote_addr,
            canonical_host: host.to_string(),
            is_numeric,
        })
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    pub fn canonical_host(&self) -> &str {
        &self.canonical_host
    }

    pub fn is_numeric(&self) -> bool {
        self.is_numeric
    }

    /// Send one datagram. Pads to a multiple of 4 octets as a defensive
    /// second pass — the codec already pads (belt-and-braces, matching
    /// `packet.py::sendpkt`, which re-pads even though its caller already
    /// built a correctly-sized body).
    pub fn send(&self, data: &[u8]) -> Result<()> {
        let mut buf = data.to_vec();
        while buf.len() % 4 != 0 {
            buf.push(0);
        }
        trace!("Sending {} octets", buf.len());
        self.sock.send(&buf).map_err(Error::WriteFailed)?;
        Ok(())
    }

    /// Wait up to `deadline` for one datagram, then read it. Returns
    /// `Ok(None)` on timeout, `Ok(Some(bytes))` otherwise.
    pub fn recv(&self, deadline: Duration) -> Result<Option<Vec<u8>>> {
        let mut fds = [PollFd::new(self.sock.as_fd(), PollFlags::POLLIN)];
        let timeout = PollTimeout::try_from(deadline).unwrap_or(PollTimeout::MAX);
        let n = poll(&mut fds, timeout)?;
        if n == 0 {
            return Ok(None);
        }

        let mut buf = vec![0u8; RECV_BUF_SIZE];
        let len = self.sock.recv(&mut buf).map_err(|e| {
            warn!("Udp receive error: {e}");
            Error::ReadFailed(e)
        })?;
        buf.truncate(len);
        debug!("Received {len} octets");
        Ok(Some(buf))
    }
}
