//! Creation Club content integrity.
//!
//! A CC item is identified by its plugin file (`.esl`, `.esp` or `.esm`).
//! It is complete only when both `<base> - Main.ba2` and
//! `<base> - Textures.ba2` sit next to it in Data.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::error::IntegrityError;
use crate::paths::{
    extension_lower, file_name_string, main_archive_name, texture_archive_name, PLUGIN_EXTENSIONS,
};

/// Creation Club naming convention: `cc<vendor>fo4<digits><sep><name>`.
/// e.g. `ccbgsfo4001-pipboy(black).esl`, `cctosfo4002_neonflats.esm`
static CC_FILENAME_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^cc[a-z]{2,}fo4\d+[-_]").expect("CC filename pattern is valid")
});

/// True if `file_name` follows the Creation Club naming convention.
pub fn is_cc_name(file_name: &str) -> bool {
    CC_FILENAME_PATTERN.is_match(file_name)
}

/// One CC item and its archive pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentItem {
    /// Plugin stem, e.g. `ccBGSFO4001-PipBoy(Black)`.
    pub base_name: String,
    pub main_archive: Option<PathBuf>,
    pub texture_archive: Option<PathBuf>,
}

impl ContentItem {
    /// Look up the archive pair for `base_name` in `data_dir`.
    pub fn locate(data_dir: &Path, base_name: &str) -> Self {
        let main = data_dir.join(main_archive_name(base_name));
        let textures = data_dir.join(texture_archive_name(base_name));
        Self {
            base_name: base_name.to_string(),
            main_archive: main.is_file().then_some(main),
            texture_archive: textures.is_file().then_some(textures),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.main_archive.is_some() && self.texture_archive.is_some()
    }

    /// Archive roles that are absent.
    pub fn missing(&self) -> Vec<String> {
        let mut missing = Vec::new();
        if self.main_archive.is_none() {
            missing.push("Main".to_string());
        }
        if self.texture_archive.is_none() {
            missing.push("Textures".to_string());
        }
        missing
    }

    /// Both archives, or the reason the item cannot be packed.
    pub fn archives(&self) -> Result<(PathBuf, PathBuf), IntegrityError> {
        match (&self.main_archive, &self.texture_archive) {
            (Some(main), Some(textures)) => Ok((main.clone(), textures.clone())),
            _ => Err(IntegrityError::Orphaned {
                name: self.base_name.clone(),
                missing: self.missing(),
            }),
        }
    }
}

/// Result of an integrity scan. Both lists are sorted and disjoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntegrityReport {
    pub valid: Vec<String>,
    pub orphaned: Vec<String>,
}

/// Find all Creation Club plugin files in the Data folder.
///
/// Merged output plugins never match the naming convention, so they are
/// excluded automatically.
pub fn find_cc_plugins(data_dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut plugins = Vec::new();
    for entry in fs::read_dir(data_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let path = entry.path();
        let is_plugin = extension_lower(&path)
            .map(|ext| PLUGIN_EXTENSIONS.contains(&ext.as_str()))
            .unwrap_or(false);
        if is_plugin && is_cc_name(&file_name_string(&path)) {
            plugins.push(path);
        }
    }
    plugins.sort();
    Ok(plugins)
}

/// Check every CC plugin for its required archives.
///
/// Read-only. `progress` receives one line per item.
pub fn check_integrity(
    data_dir: &Path,
    progress: &dyn Fn(&str),
) -> std::io::Result<IntegrityReport> {
    let plugins = find_cc_plugins(data_dir)?;
    progress(&format!("Found {} Creation Club plugin(s).", plugins.len()));

    let mut seen = BTreeSet::new();
    let mut report = IntegrityReport::default();

    for plugin in &plugins {
        let Some(base_name) = plugin.file_stem().map(|s| s.to_string_lossy().to_string()) else {
            continue;
        };
        if !seen.insert(base_name.clone()) {
            continue;
        }

        let item = ContentItem::locate(data_dir, &base_name);
        if item.is_valid() {
            progress(&format!("  ✓ {} - Complete", file_name_string(plugin)));
            report.valid.push(base_name);
        } else {
            progress(&format!(
                "  ✗ {} - Missing: {}",
                file_name_string(plugin),
                item.missing().join(", ")
            ));
            report.orphaned.push(base_name);
        }
    }

    report.valid.sort();
    report.orphaned.sort();
    info!(
        "Integrity check: {} valid, {} orphaned",
        report.valid.len(),
        report.orphaned.len()
    );
    Ok(report)
}

/// Outcome of deleting orphaned content.
#[derive(Debug, Clone, Default)]
pub struct OrphanCleanup {
    pub deleted: usize,
    /// `"<file>: <error>"` for each file that could not be removed.
    pub failures: Vec<String>,
}

impl OrphanCleanup {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Delete every file belonging to the named orphaned items.
///
/// Removes the plugin (any of the three extensions) and whichever archives
/// still exist. Failures are collected, not raised.
pub fn delete_orphans(
    data_dir: &Path,
    orphaned: &[String],
    progress: &dyn Fn(&str),
) -> OrphanCleanup {
    let mut cleanup = OrphanCleanup::default();

    for base_name in orphaned {
        let mut files: Vec<PathBuf> = PLUGIN_EXTENSIONS
            .iter()
            .map(|ext| data_dir.join(format!("{}.{}", base_name, ext)))
            .collect();
        files.push(data_dir.join(main_archive_name(base_name)));
        files.push(data_dir.join(texture_archive_name(base_name)));

        for path in files.into_iter().filter(|p| p.is_file()) {
            let name = file_name_string(&path);
            match fs::remove_file(&path) {
                Ok(()) => {
                    cleanup.deleted += 1;
                    debug!("Deleted orphaned file {}", path.display());
                    progress(&format!("  Deleted: {}", name));
                }
                Err(e) => {
                    warn!("Failed to delete {}: {}", path.display(), e);
                    progress(&format!("  Failed to delete {}: {}", name, e));
                    cleanup.failures.push(format!("{}: {}", name, e));
                }
            }
        }
    }

    cleanup
}
