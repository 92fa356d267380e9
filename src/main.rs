use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::info;

use xtftp::config::FileConfig;
use xtftp::tftp::client::{Client, ClientConfig};
use xtftp::tftp::server::{self, Config};

#[derive(Parser)]
#[command(name = "xtftp", version, about = "TFTP server and client")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Retransmissions before a transfer is abandoned
    #[arg(long, global = true)]
    retries: Option<u32>,

    /// Time to wait for the peer before retransmitting (e.g. "5s", "500ms")
    #[arg(long, global = true, value_parser = humantime_serde::re::humantime::parse_duration)]
    timeout: Option<Duration>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve a directory
    Serve {
        /// Address to listen on
        #[arg(short, long)]
        ip: Option<IpAddr>,
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
        /// Root directory
        #[arg(short, long)]
        directory: Option<PathBuf>,
        /// Refuse write requests
        #[arg(long)]
        read_only: bool,
        /// Refuse uploads that would replace an existing file
        #[arg(long)]
        no_overwrite: bool,
    },
    /// Download a file
    Get {
        server: IpAddr,
        remote: String,
        /// Local path (defaults to the remote file name)
        local: Option<PathBuf>,
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Upload a file
    Put {
        server: IpAddr,
        local: PathBuf,
        /// Remote name (defaults to the local file name)
        remote: Option<String>,
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let file = FileConfig::load_or_default(cli.config.as_deref())?;

    let mut retry = file.retry;
    if let Some(retries) = cli.retries {
        retry.retry_count = retries;
    }
    if let Some(timeout) = cli.timeout {
        retry.timeout = timeout;
    }

    match cli.command {
        Command::Serve {
            ip,
            port,
            directory,
            read_only,
            no_overwrite,
        } => {
            let section = file.server;
            let ip = ip.or(section.ip).unwrap_or(IpAddr::from([0, 0, 0, 0]));
            let port = port.or(section.port).unwrap_or(69);
            let directory = match directory.or(section.directory) {
                Some(dir) => dir,
                None => std::env::current_dir()?,
            };
            let read_only = read_only || section.read_only.unwrap_or(false);
            let overwrite = !no_overwrite && section.overwrite.unwrap_or(true);

            let config = Config::new(ip, port, directory, read_only)
                .with_overwrite(overwrite)
                .with_retry_policy(retry);
            server::run(config).await
        }
        Command::Get {
            server,
            remote,
            local,
            port,
        } => {
            let local = local.unwrap_or_else(|| PathBuf::from(&remote));
            let client = Client::new(client_config(server, port, &file, retry))?;
            let n = client.get_file(&remote, &local).await?;
            info!("Got {} ({} bytes)", remote, n);
            Ok(())
        }
        Command::Put {
            server,
            local,
            remote,
            port,
        } => {
            let remote = match remote {
                Some(remote) => remote,
                None => local
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .ok_or_else(|| anyhow::anyhow!("Cannot derive remote name from {}", local.display()))?,
            };
            let client = Client::new(client_config(server, port, &file, retry))?;
            let n = client.put_file(&local, &remote).await?;
            info!("Put {} ({} bytes)", remote, n);
            Ok(())
        }
    }
}

fn client_config(server: IpAddr, port: Option<u16>, file: &FileConfig, retry: xtftp::tftp::core::RetryPolicy) -> ClientConfig {
    let port = port.or(file.client.port).unwrap_or(69);
    let mut config = ClientConfig::new(server, port).with_retry_policy(retry);
    if let Some(mode) = file.client.mode.as_deref() {
        config = config.with_mode(mode);
    }
    config
}
