use crate::config::ConsensusParams;
use crate::error::{BlockchainError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

const NODE_ID_KEY: &str = "NODE_ID";
const DATA_DIR_KEY: &str = "DATA_DIR";
const DEFAULT_DATA_DIR: &str = "data";

/// Per-node settings, read from an optional TOML file and then the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub node_id: String,
    pub data_dir: PathBuf,
    #[serde(default)]
    pub params: ConsensusParams,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            node_id: format!("node-{}", uuid::Uuid::new_v4()),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            params: ConsensusParams::default(),
        }
    }
}

impl Settings {
    /// Defaults overridden by `NODE_ID` / `DATA_DIR`.
    pub fn from_env() -> Settings {
        let mut settings = Settings::default();
        settings.apply_env();
        settings
    }

    /// Like `from_env`, but a missing `NODE_ID` falls back to `node_id`
    /// instead of a random one, so repeated runs reopen the same node.
    pub fn from_env_or(node_id: &str) -> Settings {
        let mut settings = Settings {
            node_id: node_id.to_string(),
            ..Settings::default()
        };
        settings.apply_env();
        settings
    }

    /// Load a TOML file, then let the environment override it.
    pub fn load(path: &Path) -> Result<Settings> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            BlockchainError::Config(format!("Failed to read {}: {e}", path.display()))
        })?;
        let mut settings = Self::from_toml(&raw)?;
        settings.apply_env();
        Ok(settings)
    }

    pub fn from_toml(raw: &str) -> Result<Settings> {
        let settings: Settings = toml::from_str(raw)?;
        if settings.node_id.trim().is_empty() {
            return Err(BlockchainError::Config("node_id must not be empty".to_string()));
        }
        settings.params.validate()?;
        Ok(settings)
    }

    fn apply_env(&mut self) {
        if let Ok(node_id) = env::var(NODE_ID_KEY) {
            if !node_id.trim().is_empty() {
                self.node_id = node_id;
            }
        }
        if let Ok(dir) = env::var(DATA_DIR_KEY) {
            self.data_dir = PathBuf::from(dir);
        }
    }

    /// Sled directory for this node (`<data_dir>/node_<id>`), so several nodes
    /// can share one data directory.
    pub fn node_db_path(&self) -> PathBuf {
        self.data_dir.join(format!("node_{}", self.node_id))
    }
}
