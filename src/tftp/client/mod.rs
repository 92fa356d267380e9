//! TFTP client implementation
//!
//! - `client`: Get/Put over a streaming bridge, plus file helpers
//! - `config`: Client configuration

mod client;
mod config;

pub use client::Client;
pub use config::ClientConfig;
