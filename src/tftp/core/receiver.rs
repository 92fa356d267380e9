//! Inbound transfer: serving a WRQ or performing a client get
//!
//! Each in-order DATA payload is written into the handler's [`BridgeWriter`]
//! and only acknowledged after the handler has consumed it. A duplicate of
//! the previous block means our ACK was lost: the ACK is repeated but the
//! payload is not delivered a second time.

use log::{debug, info, warn};
use tokio::time::{Instant, timeout_at};

use super::bridge::BridgeWriter;
use super::error::TransferError;
use super::options::RetryPolicy;
use super::packet::{BLOCK_SIZE, Packet};
use super::socket::TransferSocket;

enum State {
    AwaitData,
    Done,
    Failed(TransferError),
}

/// Drives one inbound transfer to completion
pub struct ReceiverSession {
    socket: TransferSocket,
    writer: BridgeWriter,
    policy: RetryPolicy,
    filename: String,
    /// Packet repeated when the timer fires; `None` until we have said anything.
    last_sent: Option<Packet>,
    last_delivered: u16,
    received: u64,
}

impl ReceiverSession {
    pub fn new(socket: TransferSocket, writer: BridgeWriter, policy: RetryPolicy, filename: impl Into<String>) -> Self {
        Self {
            socket,
            writer,
            policy,
            filename: filename.into(),
            last_sent: None,
            last_delivered: 0,
            received: 0,
        }
    }

    /// Send `packet` before waiting for DATA and repeat it on timeout until
    /// block 1 arrives: the RRQ of a client get, or the `ACK 0` with which a
    /// server accepts a WRQ.
    pub fn with_opening_packet(mut self, packet: Packet) -> Self {
        self.last_sent = Some(packet);
        self
    }

    /// Run the transfer. Returns the number of bytes delivered to the
    /// handler. On failure the handler's end of the bridge is closed with the
    /// same error.
    pub async fn run(mut self) -> Result<u64, TransferError> {
        let mut state = match self.last_sent.as_ref() {
            Some(packet) => match self.socket.send(packet).await {
                Ok(()) => State::AwaitData,
                Err(e) => State::Failed(e),
            },
            None => State::AwaitData,
        };

        loop {
            state = match state {
                State::AwaitData => match self.await_data().await {
                    Ok(true) => State::Done,
                    Ok(false) => State::AwaitData,
                    Err(e) => State::Failed(e),
                },
                State::Done => {
                    info!("Received {} from {} ({} bytes)", self.filename, self.socket.peer(), self.received);
                    self.writer.close();
                    return Ok(self.received);
                }
                State::Failed(e) => {
                    warn!("Receiving {} from {} failed: {}", self.filename, self.socket.peer(), e);
                    self.writer.close_with_error(e.clone());
                    return Err(e);
                }
            };
        }
    }

    /// Wait for the next in-order block and deliver it. Returns `true` once
    /// the terminal block has been delivered and acknowledged.
    async fn await_data(&mut self) -> Result<bool, TransferError> {
        let mut retries = 0;
        let mut deadline = Instant::now() + self.policy.timeout;

        loop {
            let received = tokio::select! {
                reason = self.writer.closed() => {
                    self.abort(&reason).await;
                    return Err(reason);
                }
                received = timeout_at(deadline, self.socket.recv()) => received,
            };

            match received {
                Ok(Ok(Packet::Data { block_num, data })) => {
                    if block_num == self.last_delivered.wrapping_add(1) {
                        return self.deliver(block_num, data).await;
                    }
                    if self.last_sent == Some(Packet::Ack(block_num)) {
                        debug!("Duplicate block {} from {}, repeating ACK", block_num, self.socket.peer());
                        self.socket.send(&Packet::Ack(block_num)).await?;
                    } else {
                        debug!(
                            "Dropping block {} from {}, expected {}",
                            block_num,
                            self.socket.peer(),
                            self.last_delivered.wrapping_add(1)
                        );
                    }
                }
                Ok(Ok(Packet::Error { code, msg })) => {
                    return Err(TransferError::PeerAbort { code, message: msg });
                }
                Ok(Ok(other)) => {
                    debug!("Ignoring unexpected {} from {}", other, self.socket.peer());
                }
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    if retries >= self.policy.retry_count {
                        return Err(TransferError::Timeout);
                    }
                    retries += 1;
                    // Nothing sent yet: stay quiet and let the peer's own timer drive it.
                    if let Some(packet) = self.last_sent.as_ref() {
                        debug!(
                            "Retransmitting {} to {} ({}/{})",
                            packet,
                            self.socket.peer(),
                            retries,
                            self.policy.retry_count
                        );
                        self.socket.send(packet).await?;
                    }
                    deadline = Instant::now() + self.policy.timeout;
                }
            }
        }
    }

    async fn deliver(&mut self, block_num: u16, data: Vec<u8>) -> Result<bool, TransferError> {
        if let Err(e) = self.writer.write_all(&data).await {
            self.abort(&e).await;
            return Err(e);
        }

        let ack = Packet::Ack(block_num);
        self.socket.send(&ack).await?;
        self.last_sent = Some(ack);
        self.last_delivered = block_num;
        self.received += data.len() as u64;

        Ok(data.len() < BLOCK_SIZE)
    }

    /// Tell the peer the handler gave up.
    async fn abort(&self, err: &TransferError) {
        let (code, msg) = err.wire_error();
        if let Err(e) = self.socket.send(&Packet::error(code, msg)).await {
            debug!("Failed to send ERROR to {}: {}", self.socket.peer(), e);
        }
    }
}
