use crate::error::{BlockchainError, Result};
use crate::network::{DEFAULT_INBOUND_CAPACITY, DEFAULT_OUTBOUND_CAPACITY};
use crate::storage::DEFAULT_MEMPOOL_CAPACITY;
use log::info;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

static DEFAULT_NODE_ID: &str = "LOCAL";
const DEFAULT_BLOCK_TIME_MS: u64 = 5000;

const NODE_ID_KEY: &str = "NODE_ID";
const BLOCK_TIME_KEY: &str = "BLOCK_TIME_MS";
const VALIDATOR_KEY: &str = "NODE_VALIDATOR";

/// Node settings. Every field has a default, so a config file only needs the
/// keys it wants to change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub id: String,
    pub block_time_ms: u64,
    /// Whether this node holds a key and produces blocks
    pub validator: bool,
    pub mempool_capacity: usize,
    pub inbound_capacity: usize,
    pub outbound_capacity: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            id: String::from(DEFAULT_NODE_ID),
            block_time_ms: DEFAULT_BLOCK_TIME_MS,
            validator: false,
            mempool_capacity: DEFAULT_MEMPOOL_CAPACITY,
            inbound_capacity: DEFAULT_INBOUND_CAPACITY,
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
        }
    }
}

impl NodeConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<NodeConfig> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|e| {
            BlockchainError::Config(format!("Failed to read {}: {e}", path.display()))
        })?;
        let config: NodeConfig = toml::from_str(&raw)?;
        info!("Loaded node configuration from {}", path.display());
        Ok(config)
    }

    /// Apply `NODE_ID`, `BLOCK_TIME_MS` and `NODE_VALIDATOR` from the process environment
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| env::var(key).ok())
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(id) = lookup(NODE_ID_KEY) {
            self.id = id;
        }

        if let Some(raw) = lookup(BLOCK_TIME_KEY) {
            self.block_time_ms = raw.trim().parse().map_err(|_| {
                BlockchainError::Config(format!("{BLOCK_TIME_KEY} must be milliseconds, got {raw:?}"))
            })?;
        }

        if let Some(raw) = lookup(VALIDATOR_KEY) {
            self.validator = match raw.trim().to_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                _ => {
                    return Err(BlockchainError::Config(format!(
                        "{VALIDATOR_KEY} must be true or false, got {raw:?}"
                    )))
                }
            };
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(BlockchainError::Config("Node id must not be empty".to_string()));
        }
        if self.block_time_ms == 0 {
            return Err(BlockchainError::Config("Block time must be positive".to_string()));
        }
        if self.mempool_capacity == 0 || self.inbound_capacity == 0 || self.outbound_capacity == 0 {
            return Err(BlockchainError::Config("Capacities must be positive".to_string()));
        }
        Ok(())
    }

    pub fn block_time(&self) -> Duration {
        Duration::from_millis(self.block_time_ms)
    }
}
