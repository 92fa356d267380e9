//! TFTP core protocol implementation
//!
//! This module contains the protocol engine shared by client and server:
//! - `packet`: Packet serialization and deserialization
//! - `socket`: Per-transfer socket with peer pinning
//! - `options`: Retry policy
//! - `bridge`: Synchronous byte pipe between a session and its handler
//! - `sender` / `receiver`: Lock-step session state machines
//! - `error`: Terminal transfer errors and RFC 1350 error codes

mod bridge;
mod error;
pub mod options;
mod packet;
mod receiver;
mod sender;
mod socket;

// Public core types
pub use bridge::{BridgeReader, BridgeWriter, bridge};
pub use error::{ErrorCode, TransferError};
pub use options::RetryPolicy;
pub use packet::{BLOCK_SIZE, MAX_PACKET_SIZE, Opcode, Packet, PacketError};
pub use receiver::ReceiverSession;
pub use sender::SenderSession;
pub use socket::TransferSocket;
