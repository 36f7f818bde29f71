//! Installation status
//!
//! Read-only view of which CC archives are merged, which are still loose,
//! and how many snapshots exist.

use std::fs;

use anyhow::{Context, Result};

use crate::backup::BackupManager;
use crate::paths::{extension_lower, has_any_prefix, starts_with_ignore_case, DataLayout};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallStatus {
    /// Archives carrying a current or legacy merged prefix.
    pub merged: Vec<String>,
    /// Other `cc*.ba2` archives.
    pub unmerged: Vec<String>,
    pub backup_count: usize,
}

impl InstallStatus {
    /// Merged archives exist and nothing is left to merge.
    pub fn all_merged(&self) -> bool {
        !self.merged.is_empty() && self.unmerged.is_empty()
    }

    /// Both merged and unmerged archives are present.
    pub fn is_mixed(&self) -> bool {
        !self.merged.is_empty() && !self.unmerged.is_empty()
    }

    pub fn has_backups(&self) -> bool {
        self.backup_count > 0
    }
}

/// Scan `Data` for `cc*.ba2` archives and count snapshots.
pub fn scan_status(layout: &DataLayout, merged_prefixes: &[String]) -> Result<InstallStatus> {
    let mut status = InstallStatus::default();

    let entries = fs::read_dir(&layout.data_dir)
        .with_context(|| format!("Failed to read {}", layout.data_dir.display()))?;
    for entry in entries {
        let path = entry?.path();
        if !path.is_file() || extension_lower(&path).as_deref() != Some("ba2") {
            continue;
        }
        let Some(name) = path.file_name().map(|n| n.to_string_lossy().to_string()) else {
            continue;
        };
        if !starts_with_ignore_case(&name, "cc") {
            continue;
        }
        if has_any_prefix(&name, merged_prefixes) {
            status.merged.push(name);
        } else {
            status.unmerged.push(name);
        }
    }

    status.merged.sort();
    status.unmerged.sort();
    status.backup_count = BackupManager::new(&layout.backup_dir).count();
    Ok(status)
}
