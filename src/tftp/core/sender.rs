//! Outbound transfer: serving an RRQ or performing a client put
//!
//! Blocks are pulled from the handler through a [`BridgeReader`] and sent
//! lock-step: block `n + 1` is not read from the bridge, let alone sent,
//! before the peer has acknowledged block `n`.

use log::{debug, info, warn};
use tokio::time::{Instant, timeout_at};

use super::bridge::BridgeReader;
use super::error::TransferError;
use super::options::RetryPolicy;
use super::packet::{BLOCK_SIZE, Packet};
use super::socket::TransferSocket;

enum State {
    /// Pull the next block from the handler and send it.
    AwaitData,
    /// `packet` is outstanding; `last` marks the terminal (short) block.
    AwaitAck { packet: Packet, last: bool },
    Done,
    Failed(TransferError),
}

/// Drives one outbound transfer to completion
pub struct SenderSession {
    socket: TransferSocket,
    reader: BridgeReader,
    policy: RetryPolicy,
    filename: String,
    opening: Option<Packet>,
}

impl SenderSession {
    pub fn new(socket: TransferSocket, reader: BridgeReader, policy: RetryPolicy, filename: impl Into<String>) -> Self {
        Self {
            socket,
            reader,
            policy,
            filename: filename.into(),
            opening: None,
        }
    }

    /// Send `request` (a WRQ) first and treat it as block 0: data only starts
    /// flowing once the peer answers with `ACK 0`.
    pub fn with_opening_packet(mut self, request: Packet) -> Self {
        self.opening = Some(request);
        self
    }

    /// Run the transfer. Returns the number of payload bytes acknowledged
    /// by the peer. On failure the handler's end of the bridge is closed
    /// with the same error.
    pub async fn run(mut self) -> Result<u64, TransferError> {
        let mut block: u16 = 1;
        let mut sent: u64 = 0;

        let mut state = match self.opening.take() {
            Some(request) => {
                block = 0;
                match self.socket.send(&request).await {
                    Ok(()) => State::AwaitAck {
                        packet: request,
                        last: false,
                    },
                    Err(e) => State::Failed(e),
                }
            }
            None => State::AwaitData,
        };

        loop {
            state = match state {
                State::AwaitData => match self.next_block(block).await {
                    Ok(packet) => State::AwaitAck {
                        last: payload_len(&packet) < BLOCK_SIZE,
                        packet,
                    },
                    Err(e) => State::Failed(e),
                },
                State::AwaitAck { packet, last } => match self.await_ack(block, &packet).await {
                    Ok(()) => {
                        sent += payload_len(&packet) as u64;
                        if last {
                            State::Done
                        } else {
                            block = block.wrapping_add(1);
                            State::AwaitData
                        }
                    }
                    Err(e) => State::Failed(e),
                },
                State::Done => {
                    info!("Sent {} to {} ({} bytes)", self.filename, self.socket.peer(), sent);
                    return Ok(sent);
                }
                State::Failed(e) => {
                    warn!("Sending {} to {} failed: {}", self.filename, self.socket.peer(), e);
                    self.reader.close_with_error(e.clone());
                    return Err(e);
                }
            };
        }
    }

    /// Read up to one block from the handler and put it on the wire.
    async fn next_block(&mut self, block: u16) -> Result<Packet, TransferError> {
        let mut data = vec![0u8; BLOCK_SIZE];
        let n = match self.reader.read_full(&mut data).await {
            Ok(n) => n,
            Err(e) => {
                self.abort(&e).await;
                return Err(e);
            }
        };
        data.truncate(n);

        let packet = Packet::Data { block_num: block, data };
        self.socket.send(&packet).await?;
        Ok(packet)
    }

    /// Wait for `ACK block`, retransmitting `packet` whenever the timer fires.
    async fn await_ack(&mut self, block: u16, packet: &Packet) -> Result<(), TransferError> {
        let mut retries = 0;
        let mut deadline = Instant::now() + self.policy.timeout;

        loop {
            match timeout_at(deadline, self.socket.recv()).await {
                Ok(Ok(Packet::Ack(n))) if n == block => return Ok(()),
                Ok(Ok(Packet::Ack(n))) => {
                    debug!("Ignoring ACK {} from {} while waiting for {}", n, self.socket.peer(), block);
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
                    debug!(
                        "Retransmitting {} to {} ({}/{})",
                        packet,
                        self.socket.peer(),
                        retries,
                        self.policy.retry_count
                    );
                    self.socket.send(packet).await?;
                    deadline = Instant::now() + self.policy.timeout;
                }
            }
        }
    }

    /// Tell the peer the handler gave up.
    async fn abort(&self, err: &TransferError) {
        let (code, msg) = err.wire_error();
        if let Err(e) = self.socket.send(&Packet::error(code, msg)).await {
            debug!("Failed to send ERROR to {}: {}", self.socket.peer(), e);
        }
    }
}

fn payload_len(packet: &Packet) -> usize {
    match packet {
        Packet::Data { data, .. } => data.len(),
        _ => 0,
    }
}
