use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use tokio::net::UdpSocket;

use super::config::Config;
use super::handler::{Handler, Request};
use crate::tftp::core::{
    BridgeWriter, ErrorCode, MAX_PACKET_SIZE, Packet, ReceiverSession, RetryPolicy, SenderSession, TransferError,
    TransferSocket, bridge,
};

/// Pause after a failed read on the request socket.
const RECV_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// TFTP server
///
/// Listens on the well-known port and hands each RRQ/WRQ to a fresh
/// session on its own ephemeral socket, paired with a handler task.
pub struct Server<H: Handler> {
    socket: UdpSocket,
    handler: Arc<H>,
    retry: RetryPolicy,
    read_only: bool,
}

impl<H: Handler> Server<H> {
    /// Bind the well-known socket described by `config`.
    pub async fn new(config: &Config, handler: H) -> Result<Self> {
        let socket = UdpSocket::bind(config.bind_addr())
            .await
            .with_context(|| format!("Failed to bind TFTP server socket {}", config.bind_addr()))?;

        Ok(Self {
            socket,
            handler: Arc::new(handler),
            retry: config.retry,
            read_only: config.read_only,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket.local_addr().context("Failed to get local address")
    }

    /// Serve requests until the task is dropped.
    pub async fn listen(&self) -> Result<()> {
        info!("TFTP server listening on {}", self.local_addr()?);

        let mut buf = [0u8; MAX_PACKET_SIZE + 1];
        loop {
            let (amt, peer) = match self.socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(e) => {
                    error!("Failed to read request: {}", e);
                    tokio::time::sleep(RECV_ERROR_BACKOFF).await;
                    continue;
                }
            };

            let packet = match Packet::deserialize(&buf[..amt]) {
                Ok(packet) => packet,
                Err(e) => {
                    debug!("Dropping datagram from {}: {}", peer, e);
                    continue;
                }
            };

            if let Err(e) = self.dispatch(packet, peer).await {
                warn!("Could not start transfer for {}: {:#}", peer, e);
            }
        }
    }

    async fn dispatch(&self, packet: Packet, peer: SocketAddr) -> Result<()> {
        match packet {
            Packet::Rrq { filename, mode } => {
                info!("Received RRQ (filename={}, mode={}) from {}", filename, mode, peer);
                let socket = self.transfer_socket(peer).await?;
                let (writer, reader) = bridge();
                let session = SenderSession::new(socket, reader, self.retry, filename.clone());

                let handler = self.handler.clone();
                let request = Request { filename, mode, peer };
                tokio::spawn(async move { handler.read_request(request, writer).await });
                tokio::spawn(async move {
                    if let Err(e) = session.run().await {
                        debug!("Transfer to {} ended early: {}", peer, e);
                    }
                });
            }
            Packet::Wrq { filename, mode } => {
                info!("Received WRQ (filename={}, mode={}) from {}", filename, mode, peer);
                let socket = self.transfer_socket(peer).await?;
                if self.read_only {
                    let refusal = Packet::error(ErrorCode::AccessViolation, "Server is read-only");
                    socket.send(&refusal).await?;
                    return Ok(());
                }

                let (writer, reader) = bridge();
                let handler = self.handler.clone();
                let request = Request {
                    filename: filename.clone(),
                    mode,
                    peer,
                };
                tokio::spawn(async move { handler.write_request(request, reader).await });

                let retry = self.retry;
                tokio::spawn(async move {
                    // ACK 0 goes out only once the handler has taken the upload
                    let Some(writer) = accept_upload(&socket, writer, retry.timeout).await else {
                        return;
                    };
                    let session =
                        ReceiverSession::new(socket, writer, retry, filename).with_opening_packet(Packet::Ack(0));
                    if let Err(e) = session.run().await {
                        debug!("Transfer from {} ended early: {}", peer, e);
                    }
                });
            }
            other => {
                debug!("Ignoring {} from {} on the request port", other, peer);
            }
        }
        Ok(())
    }

    async fn transfer_socket(&self, peer: SocketAddr) -> Result<TransferSocket> {
        let socket = TransferSocket::bind_for(peer)
            .await
            .context("Failed to bind transfer socket")?;
        debug!("Transfer socket for {} bound to {}", peer, socket.local_addr()?);
        Ok(TransferSocket::pinned(socket, peer))
    }
}

/// Wait for the handler to start reading the upload. If it refuses (or
/// stays silent past `wait`), answer the WRQ with an ERROR instead.
async fn accept_upload(socket: &TransferSocket, writer: BridgeWriter, wait: Duration) -> Option<BridgeWriter> {
    let outcome = tokio::time::timeout(wait, writer.accepted()).await;
    let reason = match outcome {
        Ok(Ok(())) => return Some(writer),
        Ok(Err(reason)) => reason,
        Err(_) => {
            writer.close_with_error(TransferError::Timeout);
            TransferError::handler("Upload not accepted in time")
        }
    };

    info!("Refusing upload from {}: {}", socket.peer(), reason);
    let (code, msg) = reason.wire_error();
    if let Err(e) = socket.send(&Packet::error(code, msg)).await {
        debug!("Failed to send ERROR to {}: {}", socket.peer(), e);
    }
    None
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;

    use super::*;
    use crate::tftp::server::DirectoryHandler;

    fn loopback_config(root: PathBuf, read_only: bool) -> Config {
        Config::new("127.0.0.1".parse().unwrap(), 0, root, read_only)
            .with_retry_policy(RetryPolicy::new(1, Duration::from_millis(200)))
    }

    #[tokio::test]
    async fn test_server_bind_ephemeral() {
        let dir = tempfile::tempdir().unwrap();
        let config = loopback_config(dir.path().to_path_buf(), false);
        let server = Server::new(&config, DirectoryHandler::from_config(&config)).await.unwrap();
        let addr = server.local_addr().unwrap();
        assert_ne!(addr.port(), 0);
    }

    #[tokio::test]
    async fn test_read_only_server_refuses_wrq() {
        let dir = tempfile::tempdir().unwrap();
        let config = loopback_config(dir.path().to_path_buf(), true);
        let server = Server::new(&config, DirectoryHandler::from_config(&config)).await.unwrap();
        let addr = server.local_addr().unwrap();
        let task = tokio::spawn(async move { server.listen().await });

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let wrq = Packet::Wrq {
            filename: "upload.bin".to_string(),
            mode: "octet".to_string(),
        };
        client.send_to(&wrq.serialize(), addr).await.unwrap();

        let mut buf = [0u8; 128];
        let (amt, from) = tokio::time::timeout(Duration::from_secs(2), client.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_ne!(from, addr, "reply must come from a transfer socket");
        assert!(matches!(
            Packet::deserialize(&buf[..amt]).unwrap(),
            Packet::Error { code: 2, .. }
        ));
        assert!(!dir.path().join("upload.bin").exists());

        task.abort();
    }

    async fn first_reply_to_wrq(addr: SocketAddr, filename: &str) -> (Packet, SocketAddr) {
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let wrq = Packet::Wrq {
            filename: filename.to_string(),
            mode: "octet".to_string(),
        };
        client.send_to(&wrq.serialize(), addr).await.unwrap();

        let mut buf = [0u8; 128];
        let (amt, from) = tokio::time::timeout(Duration::from_secs(2), client.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        (Packet::deserialize(&buf[..amt]).unwrap(), from)
    }

    #[tokio::test]
    async fn test_refused_upload_is_never_acknowledged() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("keep.txt"), b"original").unwrap();
        let config = loopback_config(dir.path().to_path_buf(), false).with_overwrite(false);
        let server = Server::new(&config, DirectoryHandler::from_config(&config)).await.unwrap();
        let addr = server.local_addr().unwrap();
        let task = tokio::spawn(async move { server.listen().await });

        let (reply, from) = first_reply_to_wrq(addr, "keep.txt").await;
        assert_ne!(from, addr);
        assert!(matches!(reply, Packet::Error { code: 6, .. }), "unexpected reply: {reply}");
        assert_eq!(std::fs::read(dir.path().join("keep.txt")).unwrap(), b"original");

        task.abort();
    }

    #[tokio::test]
    async fn test_accepted_upload_starts_with_ack_zero() {
        let dir = tempfile::tempdir().unwrap();
        let config = loopback_config(dir.path().to_path_buf(), false);
        let server = Server::new(&config, DirectoryHandler::from_config(&config)).await.unwrap();
        let addr = server.local_addr().unwrap();
        let task = tokio::spawn(async move { server.listen().await });

        let (reply, from) = first_reply_to_wrq(addr, "fresh.bin").await;
        assert_ne!(from, addr);
        assert_eq!(reply, Packet::Ack(0));

        task.abort();
    }

    #[tokio::test]
    async fn test_server_ignores_stray_packets() {
        let dir = tempfile::tempdir().unwrap();
        let config = loopback_config(dir.path().to_path_buf(), false);
        let server = Server::new(&config, DirectoryHandler::from_config(&config)).await.unwrap();
        let addr = server.local_addr().unwrap();
        let task = tokio::spawn(async move { server.listen().await });

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.send_to(&Packet::Ack(1).serialize(), addr).await.unwrap();
        client.send_to(&[0xde, 0xad], addr).await.unwrap();

        let mut buf = [0u8; 16];
        let reply = tokio::time::timeout(Duration::from_millis(200), client.recv_from(&mut buf)).await;
        assert!(reply.is_err(), "stray packets must not be answered");
        assert!(!task.is_finished());

        task.abort();
    }
}
