//! Lock-step TFTP engine that exposes each transfer as a byte stream
//!
//! See [`tftp`] for the protocol implementation.

pub mod config;
pub mod tftp;
