use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::net::{ToSocketAddrs, UdpSocket};

use super::Transport;
use crate::error::{Error, Result};

/// UdpTransport sends RTCP over a tokio UdpSocket.
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    remote: Option<SocketAddr>,
    closed: AtomicBool,
}

impl UdpTransport {
    pub fn new(socket: Arc<UdpSocket>, remote: Option<SocketAddr>) -> Self {
        UdpTransport {
            socket,
            remote,
            closed: AtomicBool::new(false),
        }
    }

    /// bind opens a socket on laddr that reports to remote.
    pub async fn bind<A: ToSocketAddrs>(laddr: A, remote: Option<SocketAddr>) -> Result<Self> {
        let socket = UdpSocket::bind(laddr).await?;
        Ok(UdpTransport::new(Arc::new(socket), remote))
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// recv_from reads the next datagram, to be fed to the handler.
    pub async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::ErrTransportClosed);
        }
        Ok(self.socket.recv_from(buf).await?)
    }

    /// close stops sending; the socket itself goes away with the last reference.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

impl Transport for UdpTransport {
    fn is_open(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote
    }

    fn send_to(&self, buf: &[u8], target: SocketAddr) -> Result<usize> {
        if !self.is_open() {
            return Err(Error::ErrTransportClosed);
        }
        Ok(self.socket.try_send_to(buf, target)?)
    }
}
