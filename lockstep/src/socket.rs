//! The datagram transport seam. `DatagramEndpoint` is the minimal interface the
//! engine consumes (send/recv/bind/close); `UdpEndpoint` is the real `mio`-backed
//! non-blocking implementation, and `tests` (behind `cfg(test)`) supplies an
//! in-memory mock so lockstep scenarios never bind a real socket.

use crate::error::{Error, ErrorUtils, Result};
use mio::net::UdpSocket;
use std::net::SocketAddr;

/// The transport contract the protocol engine consumes. Bind/send/recv only — no
/// connection concept; individual datagrams are never retransmitted or reordered by
/// this layer, only by the engine's own resend logic above it.
pub trait DatagramEndpoint {
    fn send_to(&mut self, bytes: &[u8], target: SocketAddr) -> Result<()>;

    /// Non-blocking receive. `Ok(None)` means no datagram is currently available
    /// (the `WouldBlock` case), not a failure.
    fn recv_from(&mut self, buf: &mut [u8]) -> Result<Option<(usize, SocketAddr)>>;

    fn local_addr(&self) -> Result<SocketAddr>;
}

/// A non-blocking UDP endpoint. Binds to `base_port`, retrying up to
/// [`crate::config::BIND_RETRY_PORTS`] consecutive ports on failure so a handful of
/// instances can share a host without pre-coordinating ports.
pub struct UdpEndpoint {
    socket: UdpSocket,
}

impl UdpEndpoint {
    pub fn bind(address: std::net::IpAddr, base_port: u16, retries: u16) -> Result<UdpEndpoint> {
        let mut last_err = None;
        for offset in 0..retries {
            let port = base_port.wrapping_add(offset);
            let addr = SocketAddr::new(address, port);
            match UdpSocket::bind(&addr) {
                Ok(socket) => return Ok(UdpEndpoint { socket }),
                Err(err) => last_err = Some(err),
            }
        }
        let _ = last_err;
        Err(Error::BindFailed)
    }
}

impl DatagramEndpoint for UdpEndpoint {
    fn send_to(&mut self, bytes: &[u8], target: SocketAddr) -> Result<()> {
        let result: Result<usize> = self.socket.send_to(bytes, &target).map_err(Error::from);
        if result.has_failed() {
            result.map(|_| ())
        } else {
            Ok(())
        }
    }

    fn recv_from(&mut self, buf: &mut [u8]) -> Result<Option<(usize, SocketAddr)>> {
        match self.socket.recv_from(buf) {
            Ok((n, from)) => Ok(Some((n, from))),
            Err(err) => {
                let wrapped: Result<()> = Err(Error::from(err));
                if wrapped.has_failed() {
                    Err(wrapped.unwrap_err())
                } else {
                    Ok(None)
                }
            }
        }
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}
