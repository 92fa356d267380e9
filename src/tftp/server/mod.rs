//! TFTP server implementation
//!
//! This module provides complete TFTP server functionality:
//! - `server`: Main server loop, dispatches requests to sessions
//! - `handler`: Producer/consumer side of each transfer
//! - `config`: Server configuration

mod config;
mod handler;
mod server;

use anyhow::Result;

// Public server types
pub use config::Config;
pub use handler::{DirectoryHandler, Handler, Request};
pub use server::Server;

/// Run a TFTP server serving `config.send_directory` until the task is dropped
pub async fn run(config: Config) -> Result<()> {
    log::info!("Starting TFTP server on {}", config.bind_addr());
    log::info!("Root directory: {}", config.send_directory.display());
    log::info!("Read-only mode: {}", config.read_only);

    // Ensure directory exists
    if !config.send_directory.is_dir() {
        log::error!("Directory does not exist: {}", config.send_directory.display());
        return Err(anyhow::anyhow!("Directory does not exist"));
    }

    let handler = DirectoryHandler::from_config(&config);
    let server = Server::new(&config, handler).await?;

    log::info!("TFTP server listening, press Ctrl+C to stop");
    server.listen().await
}
