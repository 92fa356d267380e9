use std::future::Future;
use std::path::Path;

use anyhow::Context;
use log::warn;
use tokio::fs::File;

use super::config::ClientConfig;
use crate::tftp::core::{
    BridgeReader, BridgeWriter, Packet, ReceiverSession, SenderSession, TransferError, TransferSocket, bridge,
};
use crate::tftp::files::{receive_file, send_file};

/// TFTP client
///
/// Supports file upload (PUT) and download (GET) operations
///
/// # Example
///
/// ```rust,no_run
/// use xtftp::tftp::client::{Client, ClientConfig};
/// use std::path::Path;
///
/// # async fn demo() -> anyhow::Result<()> {
/// let config = ClientConfig::new("192.168.1.100".parse().unwrap(), 69);
/// let client = Client::new(config)?;
///
/// // Download file
/// client.get_file("remote.txt", Path::new("local.txt")).await?;
///
/// // Upload file
/// client.put_file(Path::new("local.txt"), "remote.txt").await?;
/// # Ok(())
/// # }
/// ```
pub struct Client {
    config: ClientConfig,
}

impl Client {
    /// Create a new TFTP client
    pub fn new(config: ClientConfig) -> anyhow::Result<Self> {
        Ok(Self { config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Download `remote_file` (RRQ).
    ///
    /// `handler` runs on its own task and reads the file's bytes from the
    /// bridge until end-of-stream. Returns once both the transfer and the
    /// handler have finished.
    pub async fn get<F, Fut>(&self, remote_file: &str, handler: F) -> Result<u64, TransferError>
    where
        F: FnOnce(BridgeReader) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let server = self.config.server_addr();
        let socket = TransferSocket::bind_for(server).await?;
        let (writer, reader) = bridge();
        let task = tokio::spawn(handler(reader));

        let rrq = Packet::Rrq {
            filename: remote_file.to_string(),
            mode: self.config.mode.clone(),
        };
        let result = ReceiverSession::new(TransferSocket::unpinned(socket, server), writer, self.config.retry, remote_file)
            .with_opening_packet(rrq)
            .run()
            .await;

        if let Err(e) = task.await {
            warn!("Download handler for {} panicked: {}", remote_file, e);
        }
        result
    }

    /// Upload to `remote_file` (WRQ).
    ///
    /// `handler` runs on its own task and writes the file's bytes into the
    /// bridge, closing it at end-of-file (or with an error to abort).
    pub async fn put<F, Fut>(&self, remote_file: &str, handler: F) -> Result<u64, TransferError>
    where
        F: FnOnce(BridgeWriter) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let server = self.config.server_addr();
        let socket = TransferSocket::bind_for(server).await?;
        let (writer, reader) = bridge();
        let task = tokio::spawn(handler(writer));

        let wrq = Packet::Wrq {
            filename: remote_file.to_string(),
            mode: self.config.mode.clone(),
        };
        let result = SenderSession::new(TransferSocket::unpinned(socket, server), reader, self.config.retry, remote_file)
            .with_opening_packet(wrq)
            .run()
            .await;

        if let Err(e) = task.await {
            warn!("Upload handler for {} panicked: {}", remote_file, e);
        }
        result
    }

    /// Download a file from the server into `local_file`
    ///
    /// # Arguments
    ///
    /// * `remote_file` - File name on the server
    /// * `local_file` - Local save path
    pub async fn get_file(&self, remote_file: &str, local_file: &Path) -> anyhow::Result<u64> {
        log::info!("Downloading {} to {}", remote_file, local_file.display());

        let file = File::create(local_file)
            .await
            .with_context(|| format!("Failed to create {}", local_file.display()))?;

        let path = local_file.to_path_buf();
        let result = self
            .get(remote_file, |reader| async move {
                if let Err(e) = receive_file(reader, file).await {
                    warn!("Can't write {}: {}", path.display(), e);
                }
            })
            .await;

        match result {
            Ok(n) => {
                log::info!("Download complete: {} ({} bytes)", local_file.display(), n);
                Ok(n)
            }
            Err(e) => {
                if let Err(cleanup) = tokio::fs::remove_file(local_file).await {
                    warn!("Failed to remove partial download {}: {}", local_file.display(), cleanup);
                }
                Err(anyhow::Error::new(e).context(format!("Failed to download {}", remote_file)))
            }
        }
    }

    /// Upload `local_file` to the server
    ///
    /// # Arguments
    ///
    /// * `local_file` - Local file path
    /// * `remote_file` - File name on the server
    pub async fn put_file(&self, local_file: &Path, remote_file: &str) -> anyhow::Result<u64> {
        log::info!("Uploading {} to {}", local_file.display(), remote_file);

        let file = File::open(local_file)
            .await
            .with_context(|| format!("Failed to open {}", local_file.display()))?;

        let path = local_file.to_path_buf();
        let n = self
            .put(remote_file, |writer| async move {
                if let Err(e) = send_file(file, writer).await {
                    warn!("Can't read {}: {}", path.display(), e);
                }
            })
            .await
            .with_context(|| format!("Failed to upload {}", local_file.display()))?;

        log::info!("Upload complete: {} ({} bytes)", remote_file, n);
        Ok(n)
    }
}
