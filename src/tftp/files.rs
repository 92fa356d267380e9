//! Streaming between local files and a transfer bridge

use log::warn;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::tftp::core::{BridgeReader, BridgeWriter, ErrorCode, TransferError};

const CHUNK_SIZE: usize = 8192;

/// Feed `file` into `writer` and close it. A read failure is handed to the
/// session, which reports it to the peer.
pub async fn send_file(mut file: File, mut writer: BridgeWriter) -> Result<u64, TransferError> {
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut total = 0u64;

    loop {
        let n = match file.read(&mut buf).await {
            Ok(n) => n,
            Err(e) => {
                warn!("Failed to read file: {}", e);
                let err = TransferError::handler(e.to_string());
                writer.close_with_error(err.clone());
                return Err(err);
            }
        };
        if n == 0 {
            writer.close();
            return Ok(total);
        }
        writer.write_all(&buf[..n]).await?;
        total += n as u64;
    }
}

/// Drain `reader` into `file`. A write failure is reported to the peer as
/// "disk full".
pub async fn receive_file(mut reader: BridgeReader, mut file: File) -> Result<u64, TransferError> {
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut total = 0u64;

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        if let Err(e) = file.write_all(&buf[..n]).await {
            warn!("Failed to write file: {}", e);
            let err = TransferError::with_code(ErrorCode::DiskFull, e.to_string());
            reader.close_with_error(err.clone());
            return Err(err);
        }
        total += n as u64;
    }

    file.flush().await?;
    Ok(total)
}
