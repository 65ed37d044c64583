// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::mem;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::time::Duration;

use super::last_error;
use crate::platform::RawSocket;
use crate::socket::{Domain, Protocol, SocketType};
use crate::{Error, Result};

/// A BSD socket. The descriptor is closed on drop.
#[derive(Debug)]
pub struct LibcSocket {
    fd: OwnedFd,
}

impl LibcSocket {
    pub fn open(
        domain: Domain,
        ty: SocketType,
        protocol: Protocol,
        recv_timeout: Option<Duration>,
    ) -> Result<Self> {
        let family = match domain {
            Domain::Ipv4 => libc::AF_INET,
            Domain::Ipv6 => libc::AF_INET6,
        };
        let kind = match ty {
            SocketType::Stream => libc::SOCK_STREAM,
            SocketType::Datagram => libc::SOCK_DGRAM,
        };
        let protocol = match protocol {
            Protocol::Default => 0,
            Protocol::Tcp => libc::IPPROTO_TCP,
            Protocol::Udp => libc::IPPROTO_UDP,
        };

        // Safety: plain system call
        let fd = unsafe { libc::socket(family, kind | libc::SOCK_CLOEXEC, protocol) };
        if fd < 0 {
            return Err(last_error("socket"));
        }

        let socket = Self {
            // Safety: `fd` was just returned by socket(2) and is owned by no one else
            fd: unsafe { OwnedFd::from_raw_fd(fd) },
        };
        if let Some(timeout) = recv_timeout {
            socket.set_recv_timeout(timeout)?;
        }

        Ok(socket)
    }

    fn set_recv_timeout(&self, timeout: Duration) -> Result<()> {
        let tv = libc::timeval {
            tv_sec: libc::time_t::try_from(timeout.as_secs()).unwrap_or(libc::time_t::MAX),
            tv_usec: libc::suseconds_t::try_from(timeout.subsec_micros()).unwrap_or_default(),
        };

        // Safety: `tv` is a valid timeval and the length matches it
        let ret = unsafe {
            libc::setsockopt(
                self.fd.as_raw_fd(),
                libc::SOL_SOCKET,
                libc::SO_RCVTIMEO,
                (&raw const tv).cast(),
                socklen_of::<libc::timeval>(),
            )
        };
        if ret != 0 {
            return Err(last_error("setsockopt"));
        }

        Ok(())
    }

    fn raw(&self) -> libc::c_int {
        self.fd.as_raw_fd()
    }
}

impl RawSocket for LibcSocket {
    fn connect(&self, addr: &SocketAddr) -> Result<()> {
        let (storage, len) = to_sockaddr(addr);
        // Safety: `storage` holds a valid address of `len` bytes
        let ret = unsafe { libc::connect(self.raw(), (&raw const storage).cast(), len) };
        if ret != 0 {
            return Err(last_error("connect"));
        }
        Ok(())
    }

    fn bind(&self, addr: &SocketAddr) -> Result<()> {
        let (storage, len) = to_sockaddr(addr);
        // Safety: `storage` holds a valid address of `len` bytes
        let ret = unsafe { libc::bind(self.raw(), (&raw const storage).cast(), len) };
        if ret != 0 {
            return Err(last_error("bind"));
        }
        Ok(())
    }

    fn listen(&self, backlog: u32) -> Result<()> {
        let backlog = libc::c_int::try_from(backlog).unwrap_or(libc::c_int::MAX);
        // Safety: plain system call
        let ret = unsafe { libc::listen(self.raw(), backlog) };
        if ret != 0 {
            return Err(last_error("listen"));
        }
        Ok(())
    }

    fn accept(&self) -> Result<(Self, SocketAddr)> {
        let mut storage = zeroed_storage();
        let mut len = socklen_of::<libc::sockaddr_storage>();

        // Safety: `storage` has room for any address and `len` says so
        let fd = unsafe {
            libc::accept4(
                self.raw(),
                (&raw mut storage).cast(),
                &raw mut len,
                libc::SOCK_CLOEXEC,
            )
        };
        if fd < 0 {
            return Err(last_error("accept"));
        }

        let socket = Self {
            // Safety: `fd` was just returned by accept(2) and is owned by no one else
            fd: unsafe { OwnedFd::from_raw_fd(fd) },
        };
        Ok((socket, from_sockaddr(&storage)?))
    }

    fn send(&self, buf: &[u8]) -> Result<usize> {
        // Safety: `buf` is valid for reads of its length
        let n = unsafe {
            libc::send(self.raw(), buf.as_ptr().cast(), buf.len(), libc::MSG_NOSIGNAL)
        };
        byte_count("send", n)
    }

    fn recv(&self, buf: &mut [u8]) -> Result<usize> {
        // Safety: `buf` is valid for writes of its length
        let n = unsafe { libc::recv(self.raw(), buf.as_mut_ptr().cast(), buf.len(), 0) };
        byte_count("recv", n)
    }

    fn send_to(&self, buf: &[u8], addr: &SocketAddr) -> Result<usize> {
        let (storage, len) = to_sockaddr(addr);
        // Safety: `buf` is valid for reads of its length, `storage` holds a
        // valid address of `len` bytes
        let n = unsafe {
            libc::sendto(
                self.raw(),
                buf.as_ptr().cast(),
                buf.len(),
                libc::MSG_NOSIGNAL,
                (&raw const storage).cast(),
                len,
            )
        };
        byte_count("sendto", n)
    }

    fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)> {
        let mut storage = zeroed_storage();
        let mut len = socklen_of::<libc::sockaddr_storage>();

        // Safety: `buf` is valid for writes of its length, `storage` has room
        // for any address and `len` says so
        let n = unsafe {
            libc::recvfrom(
                self.raw(),
                buf.as_mut_ptr().cast(),
                buf.len(),
                0,
                (&raw mut storage).cast(),
                &raw mut len,
            )
        };
        let n = byte_count("recvfrom", n)?;

        Ok((n, from_sockaddr(&storage)?))
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        let mut storage = zeroed_storage();
        let mut len = socklen_of::<libc::sockaddr_storage>();

        // Safety: `storage` has room for any address and `len` says so
        let ret =
            unsafe { libc::getsockname(self.raw(), (&raw mut storage).cast(), &raw mut len) };
        if ret != 0 {
            return Err(last_error("getsockname"));
        }

        from_sockaddr(&storage)
    }
}

fn byte_count(call: &str, n: isize) -> Result<usize> {
    usize::try_from(n).map_err(|_| last_error(call))
}

fn socklen_of<T>() -> libc::socklen_t {
    libc::socklen_t::try_from(mem::size_of::<T>()).unwrap_or(libc::socklen_t::MAX)
}

fn zeroed_storage() -> libc::sockaddr_storage {
    // Safety: all-zero is a valid (unspecified family) socket address
    unsafe { mem::zeroed() }
}

fn to_sockaddr(addr: &SocketAddr) -> (libc::sockaddr_storage, libc::socklen_t) {
    let mut storage = zeroed_storage();

    let len = match addr {
        SocketAddr::V4(addr) => {
            // Safety: `sockaddr_storage` is large and aligned enough for any
            // socket address
            let sin = unsafe { &mut *(&raw mut storage).cast::<libc::sockaddr_in>() };
            sin.sin_family = libc::sa_family_t::try_from(libc::AF_INET).unwrap_or_default();
            sin.sin_port = addr.port().to_be();
            sin.sin_addr.s_addr = u32::from_ne_bytes(addr.ip().octets());
            socklen_of::<libc::sockaddr_in>()
        }
        SocketAddr::V6(addr) => {
            // Safety: see above
            let sin6 = unsafe { &mut *(&raw mut storage).cast::<libc::sockaddr_in6>() };
            sin6.sin6_family = libc::sa_family_t::try_from(libc::AF_INET6).unwrap_or_default();
            sin6.sin6_port = addr.port().to_be();
            sin6.sin6_flowinfo = addr.flowinfo();
            sin6.sin6_addr.s6_addr = addr.ip().octets();
            sin6.sin6_scope_id = addr.scope_id();
            socklen_of::<libc::sockaddr_in6>()
        }
    };

    (storage, len)
}

fn from_sockaddr(storage: &libc::sockaddr_storage) -> Result<SocketAddr> {
    match libc::c_int::from(storage.ss_family) {
        libc::AF_INET => {
            // Safety: the family says this is a `sockaddr_in`
            let sin = unsafe { &*(&raw const *storage).cast::<libc::sockaddr_in>() };
            let ip = Ipv4Addr::from(sin.sin_addr.s_addr.to_ne_bytes());
            Ok(SocketAddr::V4(SocketAddrV4::new(ip, u16::from_be(sin.sin_port))))
        }
        libc::AF_INET6 => {
            // Safety: the family says this is a `sockaddr_in6`
            let sin6 = unsafe { &*(&raw const *storage).cast::<libc::sockaddr_in6>() };
            let ip = Ipv6Addr::from(sin6.sin6_addr.s6_addr);
            Ok(SocketAddr::V6(SocketAddrV6::new(
                ip,
                u16::from_be(sin6.sin6_port),
                sin6.sin6_flowinfo,
                sin6.sin6_scope_id,
            )))
        }
        family => {
            log::debug!("unsupported address family {family}");
            Err(Error::NativeFailure)
        }
    }
}
