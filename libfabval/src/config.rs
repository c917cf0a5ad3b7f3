use std::fs;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::scope::FabricStyle;

pub const DEFAULT_VALIDATION_PATH_PREFIX: &str = "/vnc/fabric-validate";
pub const DEFAULT_VALIDATION_LOCK_PREFIX: &str = "/vnc/fabric-validate-lock";
pub const DEFAULT_ID_ALLOC_PREFIX: &str = "/vnc/id-alloc";
pub const DEFAULT_LOCK_TIMEOUT_SECS: u64 = 60;

/// Settings for the validation subsystem. The lock timeout applies to every
/// reclaim lock; per-scope-kind timeouts are not supported.
#[derive(Debug, Clone, Deserialize)]
pub struct ValidationConfig {
    #[serde(default = "default_path_prefix")]
    pub path_prefix: String,
    #[serde(default = "default_lock_prefix")]
    pub lock_prefix: String,
    #[serde(default = "default_id_alloc_prefix")]
    pub id_alloc_prefix: String,
    #[serde(default = "default_lock_timeout_secs")]
    pub lock_timeout_secs: u64,
}

fn default_path_prefix() -> String {
    DEFAULT_VALIDATION_PATH_PREFIX.to_string()
}

fn default_lock_prefix() -> String {
    DEFAULT_VALIDATION_LOCK_PREFIX.to_string()
}

fn default_id_alloc_prefix() -> String {
    DEFAULT_ID_ALLOC_PREFIX.to_string()
}

fn default_lock_timeout_secs() -> u64 {
    DEFAULT_LOCK_TIMEOUT_SECS
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            path_prefix: default_path_prefix(),
            lock_prefix: default_lock_prefix(),
            id_alloc_prefix: default_id_alloc_prefix(),
            lock_timeout_secs: default_lock_timeout_secs(),
        }
    }
}

impl ValidationConfig {
    /// Root of the validation tree for one fabric style, e.g.
    /// `/vnc/fabric-validate/service-provider`.
    pub fn style_prefix(&self, style: FabricStyle) -> String {
        format!(
            "{}/{}",
            self.path_prefix.trim_end_matches('/'),
            style.as_str()
        )
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }
}

pub fn load_validation_config(path: &str) -> Result<ValidationConfig> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read config from {path}"))?;
    let cfg: ValidationConfig =
        serde_yaml::from_str(&content).context("Failed to parse YAML config")?;
    Ok(cfg)
}
