//! Optional TOML configuration file
//!
//! ```toml
//! [retry]
//! retry_count = 5
//! timeout = "2s"
//!
//! [server]
//! ip = "0.0.0.0"
//! port = 69
//! directory = "/srv/tftp"
//! read_only = true
//!
//! [client]
//! port = 69
//! mode = "octet"
//! ```
//!
//! Every key is optional; command line flags take precedence.

use std::net::IpAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::tftp::core::RetryPolicy;

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub retry: RetryPolicy,
    pub server: ServerSection,
    pub client: ClientSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSection {
    pub ip: Option<IpAddr>,
    pub port: Option<u16>,
    pub directory: Option<PathBuf>,
    pub read_only: Option<bool>,
    pub overwrite: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientSection {
    pub port: Option<u16>,
    pub mode: Option<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Load `path` if given, defaults otherwise
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}
