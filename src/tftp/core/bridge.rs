//! Synchronous byte pipe between a session and its handler
//!
//! A [`BridgeWriter`] hands chunks to the [`BridgeReader`] one at a time and
//! `write_all` only returns once the reader has consumed the whole chunk, so
//! neither side ever buffers more than the chunk in flight. Either end can be
//! closed with a [`TransferError`], which the other end observes on its next
//! (or current) operation instead of hanging.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{Notify, mpsc, oneshot};

use super::error::TransferError;

struct Chunk {
    data: Vec<u8>,
    pos: usize,
    consumed: oneshot::Sender<()>,
}

#[derive(Default)]
struct Shared {
    /// Set by the writer before it hangs up; `None` means clean EOF.
    writer_error: Mutex<Option<TransferError>>,
    /// Set by the reader before it hangs up; `None` means plain close.
    reader_error: Mutex<Option<TransferError>>,
    /// Set on the reader's first `read`.
    reading: AtomicBool,
    reading_started: Notify,
}

fn load(slot: &Mutex<Option<TransferError>>) -> Option<TransferError> {
    slot.lock().ok().and_then(|guard| guard.clone())
}

fn store(slot: &Mutex<Option<TransferError>>, err: TransferError) {
    if let Ok(mut guard) = slot.lock() {
        *guard = Some(err);
    }
}

/// Create a connected writer/reader pair.
pub fn bridge() -> (BridgeWriter, BridgeReader) {
    let (tx, rx) = mpsc::channel(1);
    let shared = Arc::new(Shared::default());
    (
        BridgeWriter {
            tx: Some(tx),
            shared: shared.clone(),
        },
        BridgeReader {
            rx,
            current: None,
            shared,
        },
    )
}

/// Producing end of a bridge
pub struct BridgeWriter {
    tx: Option<mpsc::Sender<Chunk>>,
    shared: Arc<Shared>,
}

impl BridgeWriter {
    /// Write `data` and wait until the reader has consumed all of it.
    pub async fn write_all(&mut self, data: &[u8]) -> Result<(), TransferError> {
        let Some(tx) = self.tx.as_ref() else {
            return Err(TransferError::Closed);
        };
        if data.is_empty() {
            return if tx.is_closed() { Err(self.reader_gone()) } else { Ok(()) };
        }

        let (consumed, done) = oneshot::channel();
        let chunk = Chunk {
            data: data.to_vec(),
            pos: 0,
            consumed,
        };
        if tx.send(chunk).await.is_err() {
            return Err(self.reader_gone());
        }
        done.await.map_err(|_| self.reader_gone())
    }

    /// Resolves once the reader end has been closed or dropped, yielding the
    /// reason the reader gave.
    pub async fn closed(&self) -> TransferError {
        if let Some(tx) = self.tx.as_ref() {
            tx.closed().await;
        }
        self.reader_gone()
    }

    /// Resolves once the reader has started reading, or with the reader's
    /// reason if it hung up before that.
    pub async fn accepted(&self) -> Result<(), TransferError> {
        if self.shared.reading.load(Ordering::SeqCst) {
            return Ok(());
        }
        tokio::select! {
            biased;
            _ = self.shared.reading_started.notified() => Ok(()),
            reason = self.closed() => {
                if self.shared.reading.load(Ordering::SeqCst) {
                    Ok(())
                } else {
                    Err(reason)
                }
            }
        }
    }

    /// Signal clean end-of-stream.
    pub fn close(self) {}

    /// Hang up with an error; the reader sees it once buffered data is drained.
    pub fn close_with_error(mut self, err: TransferError) {
        store(&self.shared.writer_error, err);
        self.tx.take();
    }

    fn reader_gone(&self) -> TransferError {
        load(&self.shared.reader_error).unwrap_or(TransferError::Closed)
    }
}

/// Consuming end of a bridge
pub struct BridgeReader {
    rx: mpsc::Receiver<Chunk>,
    current: Option<Chunk>,
    shared: Arc<Shared>,
}

impl BridgeReader {
    /// Read some bytes. `Ok(0)` means the writer closed cleanly.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransferError> {
        if !self.shared.reading.swap(true, Ordering::SeqCst) {
            self.shared.reading_started.notify_one();
        }
        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            if let Some(chunk) = self.current.as_mut() {
                let n = buf.len().min(chunk.data.len() - chunk.pos);
                buf[..n].copy_from_slice(&chunk.data[chunk.pos..chunk.pos + n]);
                chunk.pos += n;
                if chunk.pos == chunk.data.len() {
                    if let Some(chunk) = self.current.take() {
                        let _ = chunk.consumed.send(());
                    }
                }
                return Ok(n);
            }

            match self.rx.recv().await {
                Some(chunk) => self.current = Some(chunk),
                None => {
                    return match load(&self.shared.writer_error) {
                        Some(err) => Err(err),
                        None => Ok(0),
                    };
                }
            }
        }
    }

    /// Fill `buf` completely unless end-of-stream comes first.
    pub async fn read_full(&mut self, buf: &mut [u8]) -> Result<usize, TransferError> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(filled)
    }

    /// Drain the stream into `out`, returning the number of bytes appended.
    pub async fn read_to_end(&mut self, out: &mut Vec<u8>) -> Result<usize, TransferError> {
        let mut buf = [0u8; 4096];
        let mut total = 0;
        loop {
            let n = self.read(&mut buf).await?;
            if n == 0 {
                return Ok(total);
            }
            out.extend_from_slice(&buf[..n]);
            total += n;
        }
    }

    /// Hang up with an error; pending and future writes fail with it.
    pub fn close_with_error(mut self, err: TransferError) {
        store(&self.shared.reader_error, err);
        self.rx.close();
        self.current.take();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::tftp::core::ErrorCode;

    #[tokio::test]
    async fn test_write_completes_only_after_consumption() {
        let (mut writer, mut reader) = bridge();
        let finished = Arc::new(AtomicBool::new(false));

        let flag = finished.clone();
        let task = tokio::spawn(async move {
            writer.write_all(&[7u8; 600]).await.unwrap();
            flag.store(true, Ordering::SeqCst);
        });

        let mut block = [0u8; 512];
        assert_eq!(reader.read_full(&mut block).await.unwrap(), 512);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!finished.load(Ordering::SeqCst));

        let mut rest = Vec::new();
        assert_eq!(reader.read_to_end(&mut rest).await.unwrap(), 88);
        task.await.unwrap();
        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_clean_close_is_eof() {
        let (mut writer, mut reader) = bridge();
        tokio::spawn(async move {
            writer.write_all(b"hello").await.unwrap();
            writer.close();
        });

        let mut out = Vec::new();
        assert_eq!(reader.read_to_end(&mut out).await.unwrap(), 5);
        assert_eq!(out, b"hello");

        let mut buf = [0u8; 8];
        assert_eq!(reader.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_writer_error_reaches_reader_after_data() {
        let (mut writer, mut reader) = bridge();
        tokio::spawn(async move {
            writer.write_all(b"partial").await.unwrap();
            writer.close_with_error(TransferError::with_code(ErrorCode::DiskFull, "full"));
        });

        let mut out = Vec::new();
        let err = reader.read_to_end(&mut out).await.unwrap_err();
        assert_eq!(out, b"partial");
        assert!(matches!(err, TransferError::Handler { code: ErrorCode::DiskFull, .. }));
    }

    #[tokio::test]
    async fn test_reader_error_unblocks_pending_write() {
        let (mut writer, mut reader) = bridge();
        let task = tokio::spawn(async move { writer.write_all(&[1u8; 100]).await });

        let mut buf = [0u8; 10];
        assert_eq!(reader.read(&mut buf).await.unwrap(), 10);
        reader.close_with_error(TransferError::Timeout);

        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, TransferError::Timeout));
    }

    #[tokio::test]
    async fn test_dropped_reader_reports_closed() {
        let (mut writer, reader) = bridge();
        drop(reader);
        assert!(matches!(writer.write_all(b"x").await, Err(TransferError::Closed)));
        assert!(matches!(writer.write_all(b"").await, Err(TransferError::Closed)));
    }

    #[tokio::test]
    async fn test_closed_resolves_with_reader_reason() {
        let (writer, reader) = bridge();
        tokio::spawn(async move {
            reader.close_with_error(TransferError::handler("refused"));
        });

        let reason = writer.closed().await;
        assert!(matches!(reason, TransferError::Handler { ref message, .. } if message == "refused"));
    }

    #[tokio::test]
    async fn test_accepted_waits_for_first_read() {
        let (mut writer, mut reader) = bridge();
        let pending = tokio::time::timeout(Duration::from_millis(50), writer.accepted()).await;
        assert!(pending.is_err());

        let task = tokio::spawn(async move {
            let mut out = Vec::new();
            reader.read_to_end(&mut out).await.map(|_| out)
        });
        writer.accepted().await.unwrap();
        writer.accepted().await.unwrap();

        writer.write_all(b"payload").await.unwrap();
        writer.close();
        assert_eq!(task.await.unwrap().unwrap(), b"payload");
    }

    #[tokio::test]
    async fn test_accepted_reports_refusal() {
        let (writer, reader) = bridge();
        tokio::spawn(async move {
            reader.close_with_error(TransferError::with_code(ErrorCode::FileAlreadyExists, "exists"));
        });

        let err = writer.accepted().await.unwrap_err();
        assert!(matches!(err, TransferError::Handler { code: ErrorCode::FileAlreadyExists, .. }));
    }
}
