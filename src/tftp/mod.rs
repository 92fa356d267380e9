//! TFTP (Trivial File Transfer Protocol) implementation
//!
//! This module implements [RFC 1350](https://www.rfc-editor.org/rfc/rfc1350)
//! TFTP version 2 with fixed 512-byte blocks. Option negotiation
//! (RFC 2347 and friends) is not supported; options appended to a request
//! are ignored.
//!
//! ## Module Structure
//!
//! ```text
//! tftp/
//! ├── core/           # Protocol engine
//! │   ├── packet      # Packet serialization/deserialization
//! │   ├── socket      # Per-transfer socket, peer pinning
//! │   ├── options     # Retry policy
//! │   ├── bridge      # Session <-> handler byte pipe
//! │   ├── sender      # Outbound transfer state machine
//! │   └── receiver    # Inbound transfer state machine
//! │
//! ├── server/         # TFTP server
//! │   ├── server      # Request dispatch on the well-known port
//! │   ├── handler     # Handler trait, directory handler
//! │   └── config      # Server configuration
//! │
//! ├── client/         # TFTP client
//! │
//! └── files           # File <-> bridge streaming
//! ```
//!
//! ## Usage Examples
//!
//! ### Start TFTP Server
//!
//! ```rust,no_run
//! use xtftp::tftp::server::{Config, DirectoryHandler, Server};
//! use std::path::PathBuf;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let config = Config::new(
//!     "0.0.0.0".parse().unwrap(),
//!     69,
//!     PathBuf::from("/var/tftp"),
//!     false, // read_only
//! );
//!
//! let server = Server::new(&config, DirectoryHandler::from_config(&config)).await?;
//! server.listen().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Stream a download into memory
//!
//! ```rust,no_run
//! use xtftp::tftp::client::{Client, ClientConfig};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let client = Client::new(ClientConfig::new("192.168.1.100".parse().unwrap(), 69))?;
//! let (tx, rx) = tokio::sync::oneshot::channel();
//! client
//!     .get("pxelinux.0", |mut reader| async move {
//!         let mut image = Vec::new();
//!         let _ = tx.send(reader.read_to_end(&mut image).await.map(|_| image));
//!     })
//!     .await?;
//! let image = rx.await??;
//! # let _ = image;
//! # Ok(())
//! # }
//! ```

// Submodules
pub mod client;
pub mod core;
pub mod files;
pub mod server;
