//! Configuration management for the lock service.
//!
//! This module handles loading and managing configuration settings
//! from TOML files and environment variables.

use config::{Config as ConfigSource, Environment, File};
use serde::{Deserialize, Serialize};

use crate::errors::{LockError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub lock_manager: LockManagerConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
    pub shell: ShellConfig,
}

/// Tunables for the lock manager itself — §6 "Configuration (enumerated)".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockManagerConfig {
    /// Identifier written into every row. Convention: `<hostname>-<pid>`.
    pub owner: String,
    /// Small positive integer; partitioning hint for the shard attribute.
    pub max_shards: u32,
    /// How long a lease remains valid after the last successful write.
    pub lease_duration_s: u64,
    /// Heartbeat cadence. Must be strictly less than `lease_duration_s`.
    pub heartbeat_interval_s: u64,
    /// How long a single holder may keep renewing before it must give up.
    pub abandonment_threshold_ms: i64,
    /// Reject payloads larger than this many bytes with `Invalid`.
    pub max_payload_bytes: usize,
}

impl Default for LockManagerConfig {
    fn default() -> Self {
        Self {
            owner: default_owner(),
            max_shards: 2,
            lease_duration_s: 10,
            heartbeat_interval_s: 3,
            abandonment_threshold_ms: 300_000,
            max_payload_bytes: 256 * 1024,
        }
    }
}

impl LockManagerConfig {
    /// Validates the heartbeat/lease relationship spec.md §9 requires.
    pub fn validate(&self) -> Result<()> {
        if self.heartbeat_interval_s >= self.lease_duration_s {
            return Err(LockError::Invalid(format!(
                "heartbeat_interval_s ({}) must be strictly less than lease_duration_s ({})",
                self.heartbeat_interval_s, self.lease_duration_s
            )));
        }
        if self.max_shards == 0 {
            return Err(LockError::Invalid("max_shards must be positive".into()));
        }
        Ok(())
    }
}

fn default_owner() -> String {
    let host = std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .unwrap_or_else(|_| "unknown-host".to_string());
    format!("{}-{}", host, std::process::id())
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    pub dynamodb: DynamoDbConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynamoDbConfig {
    pub table_name: String,
    pub region: String,
    /// Optional endpoint override, for DynamoDB Local in development/tests.
    pub endpoint_url: Option<String>,
}

impl Default for DynamoDbConfig {
    fn default() -> Self {
        Self {
            table_name: "advisory_locks".to_string(),
            region: "us-east-1".to_string(),
            endpoint_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub output: String,
}

/// Settings for the thin external-client-shell demo (interface only —
/// the chat transport and completion backend it would front are out of scope).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ShellConfig {
    pub dispatcher_name: String,
}

impl Config {
    /// Loads `CONFIG_FILE` (default `config/default.toml`), then layers
    /// `LOCKKEEPER__*` environment variables on top — e.g.
    /// `LOCKKEEPER__LOCK_MANAGER__OWNER` overrides `lock_manager.owner`.
    pub fn load() -> Result<Self> {
        let config_file_path =
            std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config/default.toml".to_string());

        let source = ConfigSource::builder()
            .add_source(File::with_name(&config_file_path))
            .add_source(Environment::with_prefix("LOCKKEEPER").separator("__"))
            .build()
            .map_err(|e| LockError::Config(format!("failed to build config from {}: {}", config_file_path, e)))?;

        let config: Config = source
            .try_deserialize()
            .map_err(|e| LockError::Config(format!("failed to parse {}: {}", config_file_path, e)))?;

        config.lock_manager.validate()?;
        Ok(config)
    }
}
