//! Socket abstraction layer
//!
//! [`TransferSocket`] owns the ephemeral UDP socket of one transfer and
//! speaks [`Packet`]s. It keeps the peer's transfer ID (address and port):
//! anything arriving from elsewhere, and anything that does not decode, is
//! dropped here so the sessions only ever see well-formed packets from
//! their peer.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

use log::{debug, warn};
use tokio::net::UdpSocket;

use super::error::{ErrorCode, TransferError};
use super::packet::{MAX_PACKET_SIZE, Packet};

/// A packet-oriented UDP socket bound to a single peer
#[derive(Debug)]
pub struct TransferSocket {
    inner: UdpSocket,
    peer: SocketAddr,
    pinned: bool,
}

impl TransferSocket {
    /// Socket whose peer is already known (server side, learned from the request).
    pub fn pinned(inner: UdpSocket, peer: SocketAddr) -> Self {
        Self {
            inner,
            peer,
            pinned: true,
        }
    }

    /// Socket that talks to `remote` until the first well-formed reply,
    /// whose source address then becomes the peer (client side: the server
    /// answers from a fresh port, not the one the request went to).
    pub fn unpinned(inner: UdpSocket, remote: SocketAddr) -> Self {
        Self {
            inner,
            peer: remote,
            pinned: false,
        }
    }

    /// Bind an ephemeral socket of the same address family as `peer`.
    pub async fn bind_for(peer: SocketAddr) -> std::io::Result<UdpSocket> {
        let bind_addr = match peer {
            SocketAddr::V4(_) => SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
            SocketAddr::V6(_) => SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0)),
        };
        UdpSocket::bind(bind_addr).await
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn is_pinned(&self) -> bool {
        self.pinned
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    /// Send a packet to the peer.
    pub async fn send(&self, packet: &Packet) -> Result<(), TransferError> {
        self.inner.send_to(&packet.serialize(), self.peer).await?;
        Ok(())
    }

    /// Receive the next well-formed packet from the peer.
    ///
    /// Malformed datagrams and datagrams from other addresses are dropped;
    /// only socket failures are returned as errors.
    pub async fn recv(&mut self) -> Result<Packet, TransferError> {
        let mut buf = [0u8; MAX_PACKET_SIZE + 1];
        loop {
            let (amt, src) = self.inner.recv_from(&mut buf).await?;

            if self.pinned && src != self.peer {
                self.reject_foreign(src).await;
                continue;
            }

            let packet = match Packet::deserialize(&buf[..amt]) {
                Ok(packet) => packet,
                Err(e) => {
                    debug!("Dropping datagram from {}: {}", src, e);
                    continue;
                }
            };

            if !self.pinned {
                if src.ip() != self.peer.ip() {
                    self.reject_foreign(src).await;
                    continue;
                }
                debug!("Transfer peer pinned to {}", src);
                self.peer = src;
                self.pinned = true;
            }

            return Ok(packet);
        }
    }

    /// RFC 1350: a packet with the wrong transfer ID gets an error reply
    /// without disturbing the transfer in progress.
    async fn reject_foreign(&self, src: SocketAddr) {
        warn!("Ignoring packet from unknown transfer ID {} (peer is {})", src, self.peer);
        let reply = Packet::error(ErrorCode::UnknownTransferId, ErrorCode::UnknownTransferId.default_message());
        if let Err(e) = self.inner.send_to(&reply.serialize(), src).await {
            debug!("Failed to answer unknown transfer ID {}: {}", src, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    async fn loopback() -> UdpSocket {
        UdpSocket::bind("127.0.0.1:0").await.unwrap()
    }

    #[tokio::test]
    async fn test_recv_drops_foreign_and_malformed() {
        let peer = loopback().await;
        let stranger = loopback().await;
        let mut sock = TransferSocket::pinned(loopback().await, peer.local_addr().unwrap());
        let local = sock.local_addr().unwrap();

        stranger.send_to(&Packet::Ack(1).serialize(), local).await.unwrap();
        peer.send_to(&[0, 9, 9], local).await.unwrap();
        peer.send_to(&Packet::Ack(2).serialize(), local).await.unwrap();

        let packet = tokio::time::timeout(Duration::from_secs(2), sock.recv()).await.unwrap().unwrap();
        assert_eq!(packet, Packet::Ack(2));

        let mut buf = [0u8; 64];
        let (amt, _) = stranger.recv_from(&mut buf).await.unwrap();
        assert_eq!(
            Packet::deserialize(&buf[..amt]).unwrap(),
            Packet::error(ErrorCode::UnknownTransferId, "Unknown transfer ID")
        );
    }

    #[tokio::test]
    async fn test_unpinned_socket_pins_first_reply() {
        let well_known = loopback().await;
        let ephemeral = loopback().await;
        let mut sock = TransferSocket::unpinned(loopback().await, well_known.local_addr().unwrap());
        assert!(!sock.is_pinned());

        sock.send(&Packet::Ack(0)).await.unwrap();
        let mut buf = [0u8; 16];
        let (_, client) = well_known.recv_from(&mut buf).await.unwrap();

        ephemeral.send_to(&Packet::Ack(0).serialize(), client).await.unwrap();
        let packet = sock.recv().await.unwrap();
        assert_eq!(packet, Packet::Ack(0));
        assert!(sock.is_pinned());
        assert_eq!(sock.peer(), ephemeral.local_addr().unwrap());
    }
}
