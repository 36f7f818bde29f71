//! Merge and restore pipelines
//!
//! Merge runs these stages in order:
//! 1. Validating         : integrity check, orphans excluded
//! 2. BackingUp          : snapshot consumed archives, sweep previous outputs
//! 3. Extracting         : unpack and verify every source archive
//! 4. Classifying        : relocate strings, separate sounds
//! 5. Repacking          : sounds, general and split texture archives + stubs
//! 6. RegisteringPlugins : add stubs to `plugins.txt`
//! 7. CleaningUp         : delete consumed archives and staging
//!
//! A failure at any stage stops the merge and leaves the snapshot and any
//! partial output in place. Restore puts the newest snapshot back.

pub mod config;
pub mod merge;
pub mod restore;
pub mod status;

pub use config::{ConfigError, PackerConfig, LEGACY_PREFIXES, OUTPUT_PREFIX};
pub use merge::{MergeOrchestrator, MergeSummary};
pub use restore::{RestoreOrchestrator, RestoreSummary};
pub use status::{scan_status, InstallStatus};

use std::fmt;
use std::fs;
use std::path::Path;

use tracing::{debug, warn};

use crate::error::{io_err, PackError};
use crate::paths::{extension_lower, file_name_string, has_any_prefix};

/// Merge pipeline position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStage {
    Validating,
    BackingUp,
    Extracting,
    Classifying,
    Repacking,
    RegisteringPlugins,
    CleaningUp,
    Done,
    Failed,
}

impl MergeStage {
    pub fn name(&self) -> &'static str {
        match self {
            MergeStage::Validating => "Validating",
            MergeStage::BackingUp => "Backing Up",
            MergeStage::Extracting => "Extracting",
            MergeStage::Classifying => "Classifying",
            MergeStage::Repacking => "Repacking",
            MergeStage::RegisteringPlugins => "Registering Plugins",
            MergeStage::CleaningUp => "Cleaning Up",
            MergeStage::Done => "Done",
            MergeStage::Failed => "Failed",
        }
    }
}

impl fmt::Display for MergeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Files removed by [`remove_prefixed_files`].
#[derive(Debug, Default)]
pub(crate) struct Sweep {
    pub removed: Vec<String>,
    pub failed: Vec<String>,
}

impl Sweep {
    /// Removed plugin stubs (`.esl`).
    pub fn plugin_names(&self) -> Vec<String> {
        self.removed
            .iter()
            .filter(|name| extension_lower(Path::new(name)).as_deref() == Some("esl"))
            .cloned()
            .collect()
    }
}

/// Delete every file directly in `dir` whose name starts with one of
/// `prefixes` (ASCII case-insensitive). Per-file failures are reported and
/// skipped; a missing `dir` is empty.
pub(crate) fn remove_prefixed_files(
    dir: &Path,
    prefixes: &[String],
    progress: &dyn Fn(&str),
) -> Result<Sweep, PackError> {
    let mut sweep = Sweep::default();
    if !dir.is_dir() {
        return Ok(sweep);
    }

    let mut targets = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_err("read", dir))? {
        let path = entry.map_err(io_err("read", dir))?.path();
        if path.is_file() && has_any_prefix(&file_name_string(&path), prefixes) {
            targets.push(path);
        }
    }
    targets.sort();

    for path in targets {
        let name = file_name_string(&path);
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!("Removed {}", path.display());
                sweep.removed.push(name);
            }
            Err(e) => {
                warn!("Could not delete {}: {}", path.display(), e);
                progress(&format!("Warning: Could not delete {}: {}", name, e));
                sweep.failed.push(name);
            }
        }
    }
    Ok(sweep)
}
