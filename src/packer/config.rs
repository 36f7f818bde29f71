//! Packer configuration
//!
//! Everything a merge or restore needs to know about the installation and
//! the external tool, resolved once before either pipeline starts.

use std::path::PathBuf;
use std::time::Duration;

use crate::archive::bsarch::{DEFAULT_LIST_TIMEOUT, DEFAULT_PACK_TIMEOUT};
use crate::content::{is_cc_name, DEFAULT_TEXTURE_SPLIT_BYTES};
use crate::load_order::LoadOrderRegistry;
use crate::paths::DataLayout;
use crate::plugin::{DEFAULT_CREATOR, DEFAULT_SUMMARY};

/// Prefix of every archive and plugin the packer creates.
pub const OUTPUT_PREFIX: &str = "CCPacked";

/// Prefixes used by earlier releases. Swept by merge and restore.
pub const LEGACY_PREFIXES: &[&str] = &["CCMerged"];

/// Configuration for merge and restore
#[derive(Debug, Clone)]
pub struct PackerConfig {
    /// Game installation directory (contains `Data`)
    pub game_dir: PathBuf,

    /// Explicit BSArch executable, or `None` to search for it
    pub bsarch_path: Option<PathBuf>,

    /// The game's `plugins.txt`, or `None` to leave load order untouched
    pub plugins_txt: Option<PathBuf>,

    /// Maximum uncompressed size of one texture archive
    pub texture_split_bytes: u64,

    /// Timeout for pack and unpack
    pub pack_timeout: Duration,

    /// Timeout for listing
    pub list_timeout: Duration,

    /// Pass `-mt` to BSArch
    pub multithreaded: bool,

    /// Prefix for generated archives and plugins
    pub output_prefix: String,

    /// Earlier output prefixes, treated as merged content
    pub legacy_prefixes: Vec<String>,

    /// CNAM of generated plugin stubs
    pub stub_creator: String,

    /// SNAM of generated plugin stubs
    pub stub_summary: String,
}

impl PackerConfig {
    /// Defaults for a game directory.
    pub fn new(game_dir: impl Into<PathBuf>) -> Self {
        Self {
            game_dir: game_dir.into(),
            bsarch_path: None,
            plugins_txt: LoadOrderRegistry::default_path(),
            texture_split_bytes: DEFAULT_TEXTURE_SPLIT_BYTES,
            pack_timeout: DEFAULT_PACK_TIMEOUT,
            list_timeout: DEFAULT_LIST_TIMEOUT,
            multithreaded: true,
            output_prefix: OUTPUT_PREFIX.to_string(),
            legacy_prefixes: LEGACY_PREFIXES.iter().map(|p| p.to_string()).collect(),
            stub_creator: DEFAULT_CREATOR.to_string(),
            stub_summary: DEFAULT_SUMMARY.to_string(),
        }
    }

    pub fn layout(&self) -> DataLayout {
        DataLayout::new(&self.game_dir)
    }

    pub fn registry(&self) -> Option<LoadOrderRegistry> {
        self.plugins_txt.clone().map(LoadOrderRegistry::new)
    }

    /// Current and legacy prefixes together.
    pub fn merged_prefixes(&self) -> Vec<String> {
        let mut prefixes = vec![self.output_prefix.clone()];
        prefixes.extend(self.legacy_prefixes.iter().cloned());
        prefixes
    }

    /// `CCPacked_Sounds`
    pub fn sounds_name(&self) -> String {
        format!("{}_Sounds", self.output_prefix)
    }

    /// `CCPacked_Main`
    pub fn main_name(&self) -> String {
        format!("{}_Main", self.output_prefix)
    }

    /// `CCPacked_Main_Textures<number>`, numbered from 1
    pub fn textures_name(&self, number: usize) -> String {
        format!("{}_Main_Textures{}", self.output_prefix, number)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.game_dir.is_dir() {
            return Err(ConfigError::GameDirNotFound(self.game_dir.clone()));
        }

        let data_dir = self.layout().data_dir;
        if !data_dir.is_dir() {
            return Err(ConfigError::DataDirNotFound(data_dir));
        }

        if self.texture_split_bytes == 0 {
            return Err(ConfigError::InvalidSplitSize);
        }

        if self.pack_timeout.is_zero() || self.list_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout);
        }

        if self.output_prefix.trim().is_empty() {
            return Err(ConfigError::EmptyPrefix);
        }

        // A CC-style prefix would make the integrity scan pick up our own outputs
        if is_cc_name(&format!("{}_", self.output_prefix)) {
            return Err(ConfigError::AmbiguousPrefix(self.output_prefix.clone()));
        }

        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Game directory not found: {0}")]
    GameDirNotFound(PathBuf),

    #[error("Data folder not found: {0}")]
    DataDirNotFound(PathBuf),

    #[error("Texture split size must be greater than zero")]
    InvalidSplitSize,

    #[error("Tool timeouts must be greater than zero")]
    InvalidTimeout,

    #[error("Output prefix must not be empty")]
    EmptyPrefix,

    #[error("Output prefix '{0}' looks like Creation Club content")]
    AmbiguousPrefix(String),
}
