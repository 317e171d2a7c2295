//! Datagram socket seam.
//!
//! Pipelines talk to the network through [`Network`] so tests can swap
//! in an in-memory or failing implementation. [`UdpNetwork`] is the
//! real one, built on `tokio::net::UdpSocket`.

use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tracing::{debug, warn};

/// Hop limit for multicast datagrams: stay on the local network.
const MULTICAST_TTL: u32 = 1;

#[async_trait]
pub trait DatagramSocket: Send + Sync {
    async fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize>;

    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;

    fn local_addr(&self) -> io::Result<SocketAddr>;
}

#[async_trait]
pub trait Network: Send + Sync {
    /// Open a socket for outgoing traffic to unicast and multicast
    /// destinations.
    async fn bind_sender(&self) -> io::Result<Arc<dyn DatagramSocket>>;

    /// Open the receive socket on `bind`, joined to `group` when it is
    /// a multicast address.
    async fn bind_receiver(
        &self,
        bind: SocketAddr,
        group: Ipv4Addr,
    ) -> io::Result<Arc<dyn DatagramSocket>>;
}

// ── UdpNetwork ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
pub struct UdpNetwork;

#[async_trait]
impl Network for UdpNetwork {
    async fn bind_sender(&self) -> io::Result<Arc<dyn DatagramSocket>> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
        socket.set_multicast_ttl_v4(MULTICAST_TTL)?;
        // Peers on the same host must see their own group traffic.
        socket.set_multicast_loop_v4(true)?;
        debug!("sender socket bound on {}", socket.local_addr()?);
        Ok(Arc::new(socket))
    }

    async fn bind_receiver(
        &self,
        bind: SocketAddr,
        group: Ipv4Addr,
    ) -> io::Result<Arc<dyn DatagramSocket>> {
        let socket = UdpSocket::bind(bind).await?;
        if group.is_multicast() {
            match socket.join_multicast_v4(group, Ipv4Addr::UNSPECIFIED) {
                Ok(()) => debug!("joined multicast group {group} on {bind}"),
                Err(e) => warn!("could not join multicast group {group} on {bind}: {e}"),
            }
        }
        Ok(Arc::new(socket))
    }
}

#[async_trait]
impl DatagramSocket for UdpSocket {
    async fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize> {
        UdpSocket::send_to(self, buf, target).await
    }

    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        UdpSocket::recv_from(self, buf).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        UdpSocket::local_addr(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn udp_sockets_exchange_datagrams() {
        let network = UdpNetwork;
        let rx = network
            .bind_receiver("127.0.0.1:0".parse().unwrap(), Ipv4Addr::new(239, 0, 0, 1))
            .await
            .unwrap();
        let tx = network.bind_sender().await.unwrap();

        let target = rx.local_addr().unwrap();
        tx.send_to(b"fragment", target).await.unwrap();

        let mut buf = [0u8; 64];
        let (n, _) = rx.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"fragment");
    }
}
