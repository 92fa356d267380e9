use std::future::Future;
use std::net::SocketAddr;
use std::path::{Component, Path, PathBuf};

use log::{info, warn};
use tokio::fs::{File, OpenOptions};

use super::config::Config;
use crate::tftp::core::{BridgeReader, BridgeWriter, ErrorCode, TransferError};
use crate::tftp::files::{receive_file, send_file};

/// A read or write request as received on the well-known port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub filename: String,
    /// Carried through untouched; netascii is not transcoded.
    pub mode: String,
    pub peer: SocketAddr,
}

/// User code on the far side of the bridge.
///
/// Each method runs on its own task, concurrently with the session that
/// moves the bytes over the network.
pub trait Handler: Send + Sync + 'static {
    /// Produce the contents for an RRQ. Close `writer` at end-of-file, or
    /// close it with an error to refuse or abort the download.
    fn read_request(&self, request: Request, writer: BridgeWriter) -> impl Future<Output = ()> + Send;

    /// Consume an upload for a WRQ until end-of-stream. Closing `reader`
    /// with an error aborts the upload.
    fn write_request(&self, request: Request, reader: BridgeReader) -> impl Future<Output = ()> + Send;
}

/// Serves files from a directory tree
#[derive(Debug, Clone)]
pub struct DirectoryHandler {
    send_directory: PathBuf,
    receive_directory: PathBuf,
    overwrite: bool,
}

impl DirectoryHandler {
    pub fn new(send_directory: PathBuf, receive_directory: PathBuf, overwrite: bool) -> Self {
        Self {
            send_directory,
            receive_directory,
            overwrite,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.send_directory.clone(),
            config.receive_directory.clone(),
            config.overwrite,
        )
    }
}

impl Handler for DirectoryHandler {
    async fn read_request(&self, request: Request, writer: BridgeWriter) {
        let Some(path) = resolve(&self.send_directory, &request.filename) else {
            writer.close_with_error(TransferError::with_code(ErrorCode::AccessViolation, "Access violation"));
            return;
        };

        let file = match File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                writer.close_with_error(TransferError::with_code(ErrorCode::FileNotFound, "File not found"));
                return;
            }
            Err(e) => {
                writer.close_with_error(TransferError::with_code(ErrorCode::AccessViolation, e.to_string()));
                return;
            }
        };

        match send_file(file, writer).await {
            Ok(n) => info!("Served {} to {} ({} bytes)", path.display(), request.peer, n),
            Err(e) => warn!("Can't send {} to {}: {}", path.display(), request.peer, e),
        }
    }

    async fn write_request(&self, request: Request, reader: BridgeReader) {
        let Some(path) = resolve(&self.receive_directory, &request.filename) else {
            reader.close_with_error(TransferError::with_code(ErrorCode::AccessViolation, "Access violation"));
            return;
        };

        let mut options = OpenOptions::new();
        options.write(true);
        if self.overwrite {
            options.create(true).truncate(true);
        } else {
            options.create_new(true);
        }

        let file = match options.open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                reader.close_with_error(TransferError::with_code(ErrorCode::FileAlreadyExists, "File already exists"));
                return;
            }
            Err(e) => {
                reader.close_with_error(TransferError::with_code(ErrorCode::AccessViolation, e.to_string()));
                return;
            }
        };

        match receive_file(reader, file).await {
            Ok(n) => info!("Stored {} from {} ({} bytes)", path.display(), request.peer, n),
            Err(e) => {
                warn!("Can't receive {} from {}: {}", path.display(), request.peer, e);
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    warn!("Failed to remove partial upload {}: {}", path.display(), e);
                }
            }
        }
    }
}

/// Map a requested filename into `root`, refusing anything that would
/// escape it. Leading slashes are treated as relative to `root`.
fn resolve(root: &Path, filename: &str) -> Option<PathBuf> {
    let relative = Path::new(filename.trim_start_matches('/'));
    if filename.contains('\0') || relative.as_os_str().is_empty() {
        return None;
    }
    if !relative.components().all(|c| matches!(c, Component::Normal(_))) {
        return None;
    }
    Some(root.join(relative))
}
