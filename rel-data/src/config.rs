//! Data-layer configuration, stored as JSON next to the database.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Largest accepted lock threshold
pub const MAX_LOCK_THRESHOLD: u16 = 32767;

/// Change-set processing settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeSetConfig {
    /// Batches with at least this many items escalate to a pessimistic
    /// lock after applying. 0 disables size-based escalation.
    #[serde(rename = "maxOpenSize", default = "default_lock_threshold")]
    pub lock_threshold: u16,
}

fn default_lock_threshold() -> u16 {
    100
}

impl Default for ChangeSetConfig {
    fn default() -> Self {
        Self { lock_threshold: default_lock_threshold() }
    }
}

impl ChangeSetConfig {
    pub fn new(lock_threshold: u16) -> Self {
        Self { lock_threshold }
    }

    pub fn validate(&self) -> Result<()> {
        if self.lock_threshold > MAX_LOCK_THRESHOLD {
            bail!("maxOpenSize must be between 0 and {}, got {}", MAX_LOCK_THRESHOLD, self.lock_threshold);
        }
        Ok(())
    }

    /// Whether a batch of `count` items is big enough to claim the lock.
    pub fn is_of_sufficient_size(&self, count: usize) -> bool {
        self.lock_threshold > 0 && count >= usize::from(self.lock_threshold)
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataConfig {
    #[serde(default)]
    pub change_sets: ChangeSetConfig,
}

impl DataConfig {
    /// Load from `path`; a missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read_to_string(path).with_context(|| format!("Failed to read config from {:?}", path))?;
        let config: DataConfig =
            serde_json::from_str(&data).with_context(|| format!("Failed to parse config JSON in {:?}", path))?;
        config.change_sets.validate().with_context(|| format!("Invalid config in {:?}", path))?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        self.change_sets.validate()?;
        let tmp_path = path.with_extension("tmp");
        let data = serde_json::to_string_pretty(self)?;
        fs::write(&tmp_path, &data)?;
        fs::rename(&tmp_path, path)?;
        Ok(())
    }
}
