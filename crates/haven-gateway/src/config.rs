use std::{
    fs::{create_dir_all, read_to_string, File},
    io::Write,
    path::PathBuf,
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, Level};

use crate::{cli::DaemonCmdOpts, gateway::Policy, mock::MockTable};

pub const DEFAULT_HAVEN_GATEWAY_PATH: &str = ".haven/gateway";
pub const DEFAULT_HAVEN_GATEWAY_CONFIG_PATH: &str = ".haven/gateway/config.toml";

pub fn default_config_path() -> String {
    home_dir()
        .join(DEFAULT_HAVEN_GATEWAY_CONFIG_PATH)
        .to_string_lossy()
        .into_owned()
}

fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

pub fn init_config(path: &PathBuf) -> Result<()> {
    // privilege log
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .finish();
    if !path.exists() {
        tracing::subscriber::with_default(subscriber, || info!("Create config at: {path:?}"));
        let parent_dir = path
            .parent()
            .with_context(|| format!("Couldn't get parent dir from: {path:?}"))?;
        create_dir_all(parent_dir)?;
        let gateway_config = GatewayConfig::default();
        let mut file = File::create(path)?;
        let toml = toml::to_string(&gateway_config)?;
        file.write_all(toml.as_bytes())?;
    }
    Ok(())
}

pub fn load_config(path: &PathBuf) -> Result<GatewayConfig> {
    // privilege log
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::with_default(subscriber, || info!("Load config at: {:?}", path));
    let toml = read_to_string(path)?;
    toml::from_str(&toml).context("Failed to deserialize")
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct GatewayConfig {
    pub log_level: String,
    pub server: ServerConfig,
    pub admin_server: AdminConfig,
    pub origin: OriginConfig,
    pub cache: CacheConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub telemetry: TelemetrySettings,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mock: Vec<MockConfig>,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct ServerConfig {
    pub port: u16,
    pub addr: String,
    /// Serve over TLS when both paths are set.
    pub cert_path: Option<PathBuf>,
    pub key_path: Option<PathBuf>,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct AdminConfig {
    pub port: u16,
    pub addr: String,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct OriginConfig {
    pub url: String,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct CacheConfig {
    /// Store names are `<prefix>-<version>`.
    pub prefix: String,
    pub version: String,
    pub policy: Policy,
    /// Served by network-first when both network and store miss.
    pub offline_page: Option<String>,
    /// Fetched and stored on install, in order.
    pub manifest: Vec<String>,
    /// How long a request waits for activation before bypassing the gateway (ms).
    pub control_timeout: u64,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct StorageConfig {
    /// Directory the stores are restored from and flushed to on shutdown.
    pub path: Option<PathBuf>,
}

/// Optional tracing layers. Layers behind a disabled cargo feature stay off.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(default)]
pub struct TelemetrySettings {
    pub json_log: bool,
    pub tree_trace: bool,
    pub chrome_trace: bool,
    pub jaeger_trace: bool,
    pub tokio_console: bool,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct MockConfig {
    /// Url path suffix.
    pub path: String,
    #[serde(default = "default_mock_status")]
    pub status: u16,
    /// Raw json payload.
    pub body: String,
}

fn default_mock_status() -> u16 {
    200
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            log_level: "INFO".into(),
            server: ServerConfig {
                addr: "0.0.0.0".into(),
                port: 8080,
                cert_path: None,
                key_path: None,
            },
            admin_server: AdminConfig {
                addr: "127.0.0.1".into(),
                port: 5001,
            },
            origin: OriginConfig {
                url: "http://127.0.0.1:3000".into(),
            },
            cache: CacheConfig {
                prefix: "haven".into(),
                version: "v1".into(),
                policy: Policy::CacheFirst,
                offline_page: Some("/offline.html".into()),
                manifest: vec!["/".into(), "/offline.html".into()],
                control_timeout: 5_000, // 5s
            },
            storage: StorageConfig {
                path: Some(home_dir().join(DEFAULT_HAVEN_GATEWAY_PATH).join("caches")),
            },
            telemetry: TelemetrySettings::default(),
            mock: Vec::new(),
        }
    }
}

impl GatewayConfig {
    pub fn mock_table(&self) -> Result<MockTable> {
        MockTable::from_config(&self.mock).context("Invalid mock table")
    }

    pub fn tls_paths(&self) -> Option<(PathBuf, PathBuf)> {
        match (&self.server.cert_path, &self.server.key_path) {
            (Some(cert), Some(key)) => Some((cert.clone(), key.clone())),
            _ => None,
        }
    }

    pub fn merge_log_level(&mut self, log_level: Option<Level>) {
        if let Some(log_level) = log_level {
            self.log_level = log_level.to_string();
        }
    }

    pub fn merge_daemon_opts(&mut self, config: DaemonCmdOpts) {
        if let Some(port) = config.port {
            self.server.port = port;
        }
        if let Some(addr) = config.addr {
            self.server.addr = addr;
        }
        if let Some(tls_cert_path) = config.tls_cert_path {
            self.server.cert_path = Some(tls_cert_path);
        }
        if let Some(tls_key_path) = config.tls_key_path {
            self.server.key_path = Some(tls_key_path);
        }
        if let Some(port) = config.admin_port {
            self.admin_server.port = port;
        }
        if let Some(addr) = config.admin_addr {
            self.admin_server.addr = addr;
        }
        if let Some(origin) = config.origin {
            self.origin.url = origin;
        }
        if let Some(version) = config.cache_version {
            self.cache.version = version;
        }
        if let Some(policy) = config.policy {
            self.cache.policy = policy;
        }
        if let Some(storage_path) = config.storage_path {
            self.storage.path = Some(storage_path);
        }
    }
}
