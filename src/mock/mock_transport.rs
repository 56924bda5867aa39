use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use bytes::Bytes;
use util::marshal::Unmarshal;

use crate::compound_packet::RtcpPacket;
use crate::error::{Error, Result};
use crate::transport::Transport;

/// MockTransport records every datagram instead of sending it.
pub struct MockTransport {
    remote: Option<SocketAddr>,
    open: AtomicBool,
    sent: Mutex<Vec<(Bytes, SocketAddr)>>,
}

impl MockTransport {
    pub fn new(remote: Option<SocketAddr>) -> Self {
        MockTransport {
            remote,
            open: AtomicBool::new(true),
            sent: Mutex::new(vec![]),
        }
    }

    pub fn set_open(&self, open: bool) {
        self.open.store(open, Ordering::SeqCst);
    }

    /// sent returns the datagrams written so far.
    pub fn sent(&self) -> Vec<Bytes> {
        let sent = self.sent.lock().unwrap();
        sent.iter().map(|(b, _)| b.clone()).collect()
    }

    /// sent_packets decodes the datagrams written so far.
    pub fn sent_packets(&self) -> Result<Vec<RtcpPacket>> {
        self.sent()
            .into_iter()
            .map(|mut b| RtcpPacket::unmarshal(&mut b).map_err(Error::flatten))
            .collect()
    }
}

impl Transport for MockTransport {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote
    }

    fn send_to(&self, buf: &[u8], target: SocketAddr) -> Result<usize> {
        if !self.is_open() {
            return Err(Error::ErrTransportClosed);
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push((Bytes::copy_from_slice(buf), target));
        Ok(buf.len())
    }
}
