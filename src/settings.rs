//! Persisted user preferences
//!
//! Stores defaults in `<config dir>/ccpack/settings.json`. Command line
//! flags always win over these.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::packer::PackerConfig;

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Settings {
    /// Fallout 4 installation directory
    #[serde(default)]
    pub game_dir: String,

    /// BSArch executable
    #[serde(default)]
    pub bsarch_path: String,

    /// Override for the game's plugins.txt
    #[serde(default)]
    pub plugins_txt: String,

    /// Texture archive size limit in GiB (None = default)
    #[serde(default)]
    pub texture_split_gib: Option<f64>,

    /// Disable BSArch multithreading
    #[serde(default)]
    pub single_threaded: bool,
}

fn non_empty(value: &str) -> Option<PathBuf> {
    (!value.trim().is_empty()).then(|| PathBuf::from(value))
}

impl Settings {
    /// Get the config directory path (~/.config/ccpack)
    fn config_dir() -> Result<PathBuf> {
        Ok(dirs::config_dir()
            .context("Could not determine config directory")?
            .join("ccpack"))
    }

    /// Get the settings file path
    pub fn settings_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("settings.json"))
    }

    /// Load settings from disk, or return defaults if not found
    pub fn load() -> Self {
        match Self::settings_path().and_then(|p| Self::load_from(&p)) {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Could not load settings: {:#}. Using defaults.", e);
                Self::default()
            }
        }
    }

    /// Load from an explicit file; a missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content =
            std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
        serde_json::from_str(&content).with_context(|| format!("Failed to parse {:?}", path))
    }

    /// Save settings to disk
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::settings_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {:?}", dir))?;
        }
        let content = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        std::fs::write(path, content).with_context(|| format!("Failed to write {:?}", path))
    }

    pub fn game_dir(&self) -> Option<PathBuf> {
        non_empty(&self.game_dir)
    }

    /// Apply stored defaults on top of `config`.
    pub fn apply(&self, config: &mut PackerConfig) {
        if let Some(path) = non_empty(&self.bsarch_path) {
            config.bsarch_path = Some(path);
        }
        if let Some(path) = non_empty(&self.plugins_txt) {
            config.plugins_txt = Some(path);
        }
        if let Some(gib) = self.texture_split_gib.filter(|g| *g > 0.0) {
            config.texture_split_bytes = (gib * 1024.0 * 1024.0 * 1024.0) as u64;
        }
        if self.single_threaded {
            config.multithreaded = false;
        }
    }
}
