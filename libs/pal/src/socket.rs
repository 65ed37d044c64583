// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Thin socket layer and network byte order conversion.
//!
//! Every call maps onto exactly one native socket call. Failures are reported
//! once and never retried.

use core::fmt;
use core::net::SocketAddr;

use crate::error::report;
use crate::platform::{Network, RawSocket};
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Domain {
    Ipv4,
    Ipv6,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocketType {
    Stream,
    Datagram,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// Let the network stack pick the protocol matching the socket type.
    Default,
    Tcp,
    Udp,
}

/// A socket of the platform's network stack. Closed on drop.
pub struct Socket<P: Network> {
    raw: P::Socket,
    peer: Option<SocketAddr>,
}

// === impl Socket ===

impl<P: Network> Socket<P> {
    /// Opens a socket with the receive timeout configured for `platform`.
    pub fn open(platform: &P, domain: Domain, ty: SocketType, protocol: Protocol) -> Result<Self> {
        let raw = platform
            .open_socket(domain, ty, protocol)
            .inspect_err(|err| report("socket", *err))?;

        Ok(Self { raw, peer: None })
    }

    pub fn connect(&mut self, addr: SocketAddr) -> Result<()> {
        self.raw
            .connect(&addr)
            .inspect_err(|err| report("connect", *err))?;
        self.peer = Some(addr);
        Ok(())
    }

    pub fn bind(&self, addr: SocketAddr) -> Result<()> {
        self.raw
            .bind(&addr)
            .inspect_err(|err| report("bind", *err))
    }

    pub fn listen(&self, backlog: u32) -> Result<()> {
        self.raw
            .listen(backlog)
            .inspect_err(|err| report("listen", *err))
    }

    /// Accepts one connection; the returned socket knows its peer.
    pub fn accept(&self) -> Result<Socket<P>> {
        let (raw, peer) = self
            .raw
            .accept()
            .inspect_err(|err| report("accept", *err))?;

        Ok(Socket {
            raw,
            peer: Some(peer),
        })
    }

    /// Sends on a connected socket, returning the number of bytes sent.
    pub fn send(&self, buf: &[u8]) -> Result<usize> {
        self.raw.send(buf).inspect_err(|err| report("send", *err))
    }

    /// Receives on a connected socket, returning the number of bytes received.
    /// Zero means the peer closed the connection.
    pub fn recv(&self, buf: &mut [u8]) -> Result<usize> {
        self.raw.recv(buf).inspect_err(|err| report("recv", *err))
    }

    pub fn send_to(&self, buf: &[u8], addr: SocketAddr) -> Result<usize> {
        self.raw
            .send_to(buf, &addr)
            .inspect_err(|err| report("sendto", *err))
    }

    pub fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)> {
        self.raw
            .recv_from(buf)
            .inspect_err(|err| report("recvfrom", *err))
    }

    /// The address this socket was connected to or accepted from.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.raw
            .local_addr()
            .inspect_err(|err| report("getsockname", *err))
    }

    pub fn close(self) {}
}

impl<P: Network> fmt::Debug for Socket<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Socket")
            .field("peer", &self.peer)
            .finish_non_exhaustive()
    }
}

/// Converts a `u32` from host to network byte order.
pub const fn htonl(value: u32) -> u32 {
    value.to_be()
}

/// Converts a `u16` from host to network byte order.
pub const fn htons(value: u16) -> u16 {
    value.to_be()
}

/// Converts a `u32` from network to host byte order.
pub const fn ntohl(value: u32) -> u32 {
    u32::from_be(value)
}

/// Converts a `u16` from network to host byte order.
pub const fn ntohs(value: u16) -> u16 {
    u16::from_be(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_order_is_big_endian() {
        assert_eq!(htonl(0x1234_5678).to_ne_bytes(), [0x12, 0x34, 0x56, 0x78]);
        assert_eq!(htons(0xabcd).to_ne_bytes(), [0xab, 0xcd]);
        assert_eq!(ntohl(u32::from_ne_bytes([0x12, 0x34, 0x56, 0x78])), 0x1234_5678);
        assert_eq!(ntohs(u16::from_ne_bytes([0xab, 0xcd])), 0xabcd);
    }
}
