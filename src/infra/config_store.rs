// ============================================================
// Layer 6 — Config Store
// ============================================================
// Reads and writes TrainConfig as pretty-printed JSON.
//
// A config file only needs the keys it changes: TrainConfig is
// #[serde(default)], so missing fields keep their defaults.
// Unknown keys are a hard error so typos do not silently fall
// back to a default.

use anyhow::{Context, Result};
use std::{fs, path::Path};

use crate::application::train_use_case::TrainConfig;

pub struct ConfigStore;

impl ConfigStore {
    /// Load a training configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<TrainConfig> {
        let path = path.as_ref();

        let json = fs::read_to_string(path)
            .with_context(|| format!("Cannot read config from '{}'", path.display()))?;

        let cfg = serde_json::from_str(&json)
            .with_context(|| format!("Invalid config in '{}'", path.display()))?;

        tracing::debug!("Loaded training config from '{}'", path.display());
        Ok(cfg)
    }

    /// Write a training configuration, creating parent directories.
    pub fn save(path: impl AsRef<Path>, cfg: &TrainConfig) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Cannot create '{}'", parent.display()))?;
        }

        let json = serde_json::to_string_pretty(cfg)?;
        fs::write(path, json)
            .with_context(|| format!("Cannot write config to '{}'", path.display()))?;

        tracing::debug!("Saved training config to '{}'", path.display());
        Ok(())
    }
}
