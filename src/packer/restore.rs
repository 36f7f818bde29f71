//! Restore pipeline
//!
//! Reverses a merge using the newest snapshot: merged outputs and their
//! relocated strings are deleted, the stubs leave `plugins.txt`, and the
//! original archives are copied back.

use std::fs;
use std::path::PathBuf;

use tracing::{info, warn};

use super::{remove_prefixed_files, PackerConfig, Sweep};
use crate::backup::{BackupManager, MANIFEST_NAME};
use crate::error::PackError;
use crate::paths::DataLayout;

/// What a successful restore did.
#[derive(Debug, Clone, Default)]
pub struct RestoreSummary {
    /// Snapshot the originals came from.
    pub snapshot: PathBuf,
    /// Archives copied back into Data.
    pub files_restored: usize,
    /// Merged archives, stubs and strings files deleted.
    pub merged_removed: usize,
    /// Lines removed from `plugins.txt`.
    pub registry_removed: usize,
    /// Older snapshots deleted.
    pub snapshots_pruned: usize,
}

pub struct RestoreOrchestrator<'a> {
    config: &'a PackerConfig,
    layout: DataLayout,
}

impl<'a> RestoreOrchestrator<'a> {
    pub fn new(config: &'a PackerConfig) -> Self {
        Self {
            config,
            layout: config.layout(),
        }
    }

    /// Restore the newest snapshot.
    pub fn run(&self, progress: &dyn Fn(&str)) -> Result<RestoreSummary, PackError> {
        let data_dir = &self.layout.data_dir;
        if !data_dir.is_dir() {
            return Err(PackError::DataDirMissing(data_dir.clone()));
        }

        let backup = BackupManager::new(&self.layout.backup_dir);
        let snapshot = backup.latest().map_err(PackError::NoBackup)?;
        progress(&format!("Restoring from {}...", snapshot.name));

        let mut summary = RestoreSummary {
            snapshot: snapshot.path.clone(),
            ..Default::default()
        };

        let prefixes = self.config.merged_prefixes();
        let data_sweep = remove_prefixed_files(data_dir, &prefixes, progress)?;
        ensure_swept(&data_sweep)?;
        summary.merged_removed += data_sweep.removed.len();
        let merged_plugins = data_sweep.plugin_names();

        let strings_dir = &self.layout.strings_dir;
        let strings_sweep = remove_prefixed_files(strings_dir, &prefixes, progress)?;
        ensure_swept(&strings_sweep)?;
        for name in &strings_sweep.removed {
            progress(&format!("Removed STRINGS file: {}", name));
        }
        summary.merged_removed += strings_sweep.removed.len();

        let relocated = match backup.read_manifest(&snapshot) {
            Ok(names) => names,
            Err(e) => {
                warn!("Could not read strings manifest: {}", e);
                progress(&format!("Warning: Could not read {}: {}", MANIFEST_NAME, e));
                Vec::new()
            }
        };
        if !relocated.is_empty() {
            progress("Cleaning up extracted STRINGS files...");
        }
        for name in &relocated {
            let path = strings_dir.join(name);
            if !path.is_file() {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => summary.merged_removed += 1,
                Err(e) => {
                    warn!("Could not delete {}: {}", path.display(), e);
                    progress(&format!("Warning: Could not delete {}: {}", name, e));
                }
            }
        }

        if let Some(registry) = self.config.registry() {
            match registry.remove(&merged_plugins) {
                Ok(removed) => summary.registry_removed = removed,
                Err(e) => {
                    warn!("Failed to update plugins.txt: {}", e);
                    progress(&format!("Warning: {}", e));
                }
            }
        }

        let outcome = backup.restore(&snapshot, data_dir, progress)?;
        summary.files_restored = outcome.restored;
        summary.snapshots_pruned = outcome.pruned;

        info!(
            "Restore complete: {} restored, {} merged files removed, {} snapshots pruned",
            summary.files_restored, summary.merged_removed, summary.snapshots_pruned
        );
        Ok(summary)
    }
}

/// Merged files that survive the sweep would sit next to the restored
/// originals, so restore stops before copying or pruning anything.
fn ensure_swept(sweep: &Sweep) -> Result<(), PackError> {
    if sweep.failed.is_empty() {
        return Ok(());
    }
    Err(PackError::SweepIncomplete {
        files: sweep.failed.clone(),
    })
}
