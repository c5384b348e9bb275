//! Daemon configuration file
//!
//! ```toml
//! [server]
//! listen = "0.0.0.0:8080"
//! data_dir = "./data"
//! storage = "sled"
//! log_level = "info"
//!
//! [treasury]
//! chain_mode = "rpc"
//! rpc_url = "https://api.devnet.solana.com"
//! admin_wallets = ["..."]
//! ```

use anyhow::Context;
use ece_treasury::TreasuryConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[default]
    Sled,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    pub data_dir: PathBuf,
    pub storage: StorageKind,
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 8080)),
            data_dir: PathBuf::from("./data"),
            storage: StorageKind::Sled,
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub server: ServerConfig,
    pub treasury: TreasuryConfig,
}

impl DaemonConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::parse(&contents).with_context(|| format!("parsing config file {}", path.display()))
    }

    pub fn parse(contents: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Ledger location for sled storage
    pub fn ledger_path(&self) -> PathBuf {
        self.server.data_dir.join("ledger")
    }
}
