use crate::{config::default_config_path, gateway::Policy};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;

#[derive(Parser)]
#[command(author, version, about, long_about = None)] // Read from `Cargo.toml`
#[command(propagate_version = true)]
pub struct Cli {
    /// log level
    #[arg(long)]
    pub log: Option<Level>,

    /// config path
    #[arg(long, default_value_t = default_config_path())]
    pub config: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write the default config if none exists
    Init,
    /// Run gateway daemon
    Daemon(DaemonCmdOpts),
}

/// Override config
#[derive(Args, Default)]
pub struct DaemonCmdOpts {
    /// server port
    #[arg(long)]
    pub port: Option<u16>,
    /// server address
    #[arg(long)]
    pub addr: Option<String>,
    /// tls cert path
    #[arg(long)]
    pub tls_cert_path: Option<PathBuf>,
    /// tls key path
    #[arg(long)]
    pub tls_key_path: Option<PathBuf>,
    /// admin server port
    #[arg(long)]
    pub admin_port: Option<u16>,
    /// admin server address
    #[arg(long)]
    pub admin_addr: Option<String>,
    /// origin the gateway forwards to
    #[arg(long)]
    pub origin: Option<String>,
    /// cache store version
    #[arg(long)]
    pub cache_version: Option<String>,
    /// cache-first or network-first
    #[arg(long)]
    pub policy: Option<Policy>,
    /// directory stores are persisted to
    #[arg(long)]
    pub storage_path: Option<PathBuf>,
}
