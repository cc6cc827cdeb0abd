//! Configuration for the ledger server

use std::fs;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::blockchain::chain::DEFAULT_MINING_REWARD;
use crate::blockchain::crypto::HASH_HEX_LEN;
use crate::blockchain::pow::DEFAULT_DIFFICULTY;

/// Errors that can occur while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    /// Leading zero hex digits required in each block hash
    #[serde(default = "default_difficulty")]
    pub difficulty: usize,
    #[serde(default = "default_mining_reward")]
    pub mining_reward: f64,
    /// Upper bound on a single nonce search; unbounded when absent
    #[serde(default)]
    pub mining_timeout_secs: Option<u64>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            difficulty: default_difficulty(),
            mining_reward: default_mining_reward(),
            mining_timeout_secs: None,
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_difficulty() -> usize {
    DEFAULT_DIFFICULTY
}

fn default_mining_reward() -> f64 {
    DEFAULT_MINING_REWARD
}

impl Config {
    /// Loads and validates configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parses and validates configuration from TOML text
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let ledger = &self.ledger;

        if ledger.difficulty > HASH_HEX_LEN {
            return Err(ConfigError::Invalid(format!(
                "difficulty {} exceeds the {} digits of a SHA-256 hash",
                ledger.difficulty, HASH_HEX_LEN
            )));
        }
        if !ledger.mining_reward.is_finite() || ledger.mining_reward < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "mining_reward must be a non-negative number, got {}",
                ledger.mining_reward
            )));
        }
        if ledger.mining_timeout_secs == Some(0) {
            return Err(ConfigError::Invalid(
                "mining_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
