#[cfg(test)]
mod transport_test;
mod udp;

use std::net::SocketAddr;

pub use udp::UdpTransport;

use crate::error::Result;

/// Transport is the datagram channel compound RTCP packets are written to.
///
/// send_to is called with the session lock held, so implementations must not
/// block: a send that cannot complete immediately should fail instead.
pub trait Transport: Send + Sync {
    /// is_open reports whether the channel can still send.
    fn is_open(&self) -> bool;
    /// remote_addr is the peer reports are sent to, if one is configured.
    fn remote_addr(&self) -> Option<SocketAddr>;
    fn send_to(&self, buf: &[u8], target: SocketAddr) -> Result<usize>;
}
