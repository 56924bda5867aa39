use std::time::Duration;

use tokio::net::UdpSocket;

use super::*;
use crate::error::{Error, Result};

#[tokio::test]
async fn test_udp_transport_send_to() -> Result<()> {
    let peer = UdpSocket::bind("127.0.0.1:0").await?;
    let peer_addr = peer.local_addr()?;

    let transport = UdpTransport::bind("127.0.0.1:0", Some(peer_addr)).await?;
    assert!(transport.is_open());
    assert_eq!(transport.remote_addr(), Some(peer_addr));

    let n = transport.send_to(b"\x80\xc9\x00\x01\x00\x00\x00\x01", peer_addr)?;
    assert_eq!(n, 8);

    let mut buf = [0u8; 64];
    let (n, from) = tokio::time::timeout(Duration::from_secs(1), peer.recv_from(&mut buf))
        .await
        .expect("datagram should arrive")?;
    assert_eq!(n, 8);
    assert_eq!(from, transport.local_addr()?);
    assert_eq!(&buf[..2], &[0x80, 0xc9]);

    Ok(())
}

#[tokio::test]
async fn test_udp_transport_closed() -> Result<()> {
    let transport = UdpTransport::bind("127.0.0.1:0", None).await?;
    assert_eq!(transport.remote_addr(), None);

    transport.close();
    assert!(!transport.is_open());

    let target = transport.local_addr()?;
    assert_eq!(
        transport.send_to(&[0u8; 4], target),
        Err(Error::ErrTransportClosed)
    );

    let mut buf = [0u8; 4];
    assert_eq!(
        transport.recv_from(&mut buf).await,
        Err(Error::ErrTransportClosed)
    );

    Ok(())
}
