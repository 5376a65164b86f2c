use ::config::{Config, Environment, File};
use alloy::primitives::Address;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::rules::DEFAULT_TRANSFER_THRESHOLD;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Source(#[from] ::config::ConfigError),
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Settings as read from the sources, before validation.
#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    rpc_url: Option<String>,
    contract_address: Option<String>,
    webhook_url: Option<String>,
    token_symbol: Option<String>,
    transfer_threshold: Option<u64>,
    webhook_max_attempts: Option<u32>,
    webhook_timeout_secs: Option<u64>,
    log_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub rpc_url: Url,
    pub contract_address: Address,
    pub webhook_url: Url,
    pub token_symbol: String,
    /// Large-transfer boundary in whole tokens.
    pub transfer_threshold: u64,
    pub webhook_max_attempts: u32,
    pub webhook_timeout: Duration,
    pub log_dir: Option<PathBuf>,
}

impl AppConfig {
    /// Reads an optional `config` file, then the process environment on top.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(Environment::default())
    }

    fn load(env: Environment) -> Result<Self, ConfigError> {
        let raw: RawConfig = Config::builder()
            .add_source(File::with_name("config").required(false))
            .add_source(env)
            .build()?
            .try_deserialize()?;
        raw.validate()
    }
}

fn required(value: Option<String>, key: &'static str) -> Result<String, ConfigError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(ConfigError::Missing(key)),
    }
}

fn parse_url(value: &str, key: &'static str, schemes: &[&str]) -> Result<Url, ConfigError> {
    let url = Url::parse(value).map_err(|e| ConfigError::Invalid {
        key,
        reason: e.to_string(),
    })?;
    if !schemes.contains(&url.scheme()) {
        return Err(ConfigError::Invalid {
            key,
            reason: format!("expected one of {schemes:?}, got {}", url.scheme()),
        });
    }
    Ok(url)
}

impl RawConfig {
    fn validate(self) -> Result<AppConfig, ConfigError> {
        let rpc_url = required(self.rpc_url, "RPC_URL")?;
        let contract_address = required(self.contract_address, "CONTRACT_ADDRESS")?;
        let webhook_url = required(self.webhook_url, "WEBHOOK_URL")?;

        let rpc_url = parse_url(&rpc_url, "RPC_URL", &["ws", "wss", "http", "https"])?;
        let webhook_url = parse_url(&webhook_url, "WEBHOOK_URL", &["http", "https"])?;
        let contract_address = contract_address
            .parse::<Address>()
            .map_err(|e| ConfigError::Invalid {
                key: "CONTRACT_ADDRESS",
                reason: e.to_string(),
            })?;

        let transfer_threshold = self.transfer_threshold.unwrap_or(DEFAULT_TRANSFER_THRESHOLD);
        if transfer_threshold == 0 {
            return Err(ConfigError::Invalid {
                key: "TRANSFER_THRESHOLD",
                reason: "must be at least one token".into(),
            });
        }

        let webhook_timeout_secs = self.webhook_timeout_secs.unwrap_or(10);
        if webhook_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "WEBHOOK_TIMEOUT_SECS",
                reason: "must be at least one second".into(),
            });
        }

        Ok(AppConfig {
            rpc_url,
            contract_address,
            webhook_url,
            token_symbol: self
                .token_symbol
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| "AUSD".to_string()),
            transfer_threshold,
            webhook_max_attempts: self.webhook_max_attempts.unwrap_or(1).max(1),
            webhook_timeout: Duration::from_secs(webhook_timeout_secs),
            log_dir: self.log_dir,
        })
    }
}
