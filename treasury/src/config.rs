//! Treasury configuration
//!
//! Defaults, then an optional TOML table, then environment overrides.

use ece_crypto::{CryptoError, KeyPair};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::chain::rpc::{Commitment, RpcGatewayConfig};

pub const ENV_RPC_URL: &str = "SOLANA_RPC_URL";
pub const ENV_PROGRAM_ID: &str = "ECE_TOKEN_PROGRAM_ID";
pub const ENV_STATE_ACCOUNT: &str = "ECE_TREASURY_STATE_ACCOUNT";
pub const ENV_SECRET_KEY: &str = "ECE_TREASURY_SECRET_KEY";
pub const ENV_ADMIN_WALLETS: &str = "ECE_ADMIN_WALLETS";
pub const ENV_EMERGENCY_SIGNERS: &str = "ECE_EMERGENCY_SIGNERS";
pub const ENV_CHAIN_MODE: &str = "ECE_CHAIN_MODE";
pub const ENV_CONFIRM_TIMEOUT: &str = "ECE_CONFIRM_TIMEOUT_SECS";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Treasury signing key is required in rpc mode (set ECE_TREASURY_SECRET_KEY)")]
    MissingSigningKey,

    #[error("Invalid treasury signing key: {0}")]
    Key(#[from] CryptoError),
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChainMode {
    Rpc,
    #[default]
    Simulated,
}

impl FromStr for ChainMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rpc" => Ok(ChainMode::Rpc),
            "simulated" => Ok(ChainMode::Simulated),
            other => Err(ConfigError::Invalid(format!("unknown chain mode {}", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TreasuryConfig {
    pub chain_mode: ChainMode,
    pub rpc_url: String,
    pub commitment: Commitment,
    pub program_id: String,
    pub treasury_state_account: String,
    /// JSON byte array or hex
    pub treasury_secret_key: Option<String>,
    pub admin_wallets: Vec<String>,
    pub emergency_signers: Vec<String>,
    pub request_timeout_secs: u64,
    pub confirm_timeout_secs: u64,
    pub poll_interval_ms: u64,
}

impl Default for TreasuryConfig {
    fn default() -> Self {
        Self {
            chain_mode: ChainMode::default(),
            rpc_url: "https://api.devnet.solana.com".to_string(),
            commitment: Commitment::Confirmed,
            program_id: String::new(),
            treasury_state_account: String::new(),
            treasury_secret_key: None,
            admin_wallets: Vec::new(),
            emergency_signers: Vec::new(),
            request_timeout_secs: 10,
            confirm_timeout_secs: 60,
            poll_interval_ms: 500,
        }
    }
}

/// Comma separated list, blanks dropped
pub fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl TreasuryConfig {
    /// Apply overrides from the process environment
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_RPC_URL) {
            self.rpc_url = url;
        }
        if let Some(program_id) = lookup(ENV_PROGRAM_ID) {
            self.program_id = program_id;
        }
        if let Some(account) = lookup(ENV_STATE_ACCOUNT) {
            self.treasury_state_account = account;
        }
        if let Some(key) = lookup(ENV_SECRET_KEY) {
            self.treasury_secret_key = Some(key);
        }
        if let Some(wallets) = lookup(ENV_ADMIN_WALLETS) {
            self.admin_wallets = parse_list(&wallets);
        }
        if let Some(signers) = lookup(ENV_EMERGENCY_SIGNERS) {
            self.emergency_signers = parse_list(&signers);
        }
        if let Some(mode) = lookup(ENV_CHAIN_MODE) {
            self.chain_mode = mode.parse()?;
        }
        if let Some(secs) = lookup(ENV_CONFIRM_TIMEOUT) {
            self.confirm_timeout_secs = secs.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!("{} must be a number of seconds", ENV_CONFIRM_TIMEOUT))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.confirm_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "confirm_timeout_secs must be positive".to_string(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "poll_interval_ms must be positive".to_string(),
            ));
        }
        if self.chain_mode == ChainMode::Rpc {
            if self.rpc_url.is_empty() {
                return Err(ConfigError::Invalid("rpc_url is empty".to_string()));
            }
            if self.program_id.is_empty() || self.treasury_state_account.is_empty() {
                return Err(ConfigError::Invalid(
                    "program_id and treasury_state_account are required in rpc mode".to_string(),
                ));
            }
        }
        if self.emergency_signers.is_empty() {
            tracing::warn!("no emergency signers configured, emergency pause is unavailable");
        }
        Ok(())
    }

    /// Treasury authority key. Simulated mode falls back to an ephemeral key.
    pub fn signing_key(&self) -> Result<KeyPair, ConfigError> {
        match (&self.treasury_secret_key, self.chain_mode) {
            (Some(material), _) => Ok(KeyPair::from_secret_material(material)?),
            (None, ChainMode::Rpc) => Err(ConfigError::MissingSigningKey),
            (None, ChainMode::Simulated) => {
                let keypair = KeyPair::generate();
                tracing::warn!(
                    authority = %keypair.public_key_hex(),
                    "no treasury key configured, using an ephemeral key"
                );
                Ok(keypair)
            }
        }
    }

    pub fn rpc_gateway_config(&self) -> RpcGatewayConfig {
        RpcGatewayConfig {
            rpc_url: self.rpc_url.clone(),
            commitment: self.commitment,
            program_id: self.program_id.clone(),
            treasury_state_account: self.treasury_state_account.clone(),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            confirm_timeout: Duration::from_secs(self.confirm_timeout_secs),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
        }
    }
}
