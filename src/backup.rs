//! Timestamped snapshots of consumed archives.
//!
//! Each merge copies the archives it is about to consume into
//! `CC_Backup/<YYYYMMDD_HHMMSS>/` before anything is deleted. Restoring a
//! snapshot copies it back and prunes every other snapshot, so after a
//! successful restore exactly one remains.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::Local;
use tracing::{debug, info, warn};

use crate::error::BackupError;
use crate::paths::file_name_string;

/// Names of strings files relocated during a merge, one per line.
pub const MANIFEST_NAME: &str = "moved_strings.txt";

/// One snapshot directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupSnapshot {
    pub path: PathBuf,
    pub name: String,
    pub modified: SystemTime,
}

impl BackupSnapshot {
    fn from_dir(path: PathBuf) -> io::Result<Self> {
        let modified = fs::metadata(&path)?.modified()?;
        Ok(Self {
            name: file_name_string(&path),
            path,
            modified,
        })
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.path.join(MANIFEST_NAME)
    }

    /// Backed-up files, excluding the manifest, sorted by name.
    pub fn files(&self) -> Result<Vec<PathBuf>, BackupError> {
        let mut files = Vec::new();
        let entries = fs::read_dir(&self.path).map_err(backup_io("read", &self.path))?;
        for entry in entries {
            let entry = entry.map_err(backup_io("read", &self.path))?;
            let path = entry.path();
            if path.is_file() && entry.file_name() != MANIFEST_NAME {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

/// Result of restoring a snapshot.
#[derive(Debug, Clone, Default)]
pub struct RestoreOutcome {
    pub restored: usize,
    pub pruned: usize,
}

/// Owner of the snapshot root.
#[derive(Debug, Clone)]
pub struct BackupManager {
    root: PathBuf,
}

fn backup_io(action: &'static str, path: &Path) -> impl FnOnce(io::Error) -> BackupError {
    let path = path.to_path_buf();
    move |source| BackupError::Io {
        action,
        path,
        source,
    }
}

/// Copy `src` to `dst`, replacing `dst`, and carry over the modification time.
pub fn copy_preserving_mtime(src: &Path, dst: &Path) -> io::Result<()> {
    if dst.exists() {
        fs::remove_file(dst)?;
    }
    reflink_copy::reflink_or_copy(src, dst)?;

    let modified = fs::metadata(src)?.modified()?;
    let file = File::options().write(true).open(dst)?;
    file.set_modified(modified)?;
    Ok(())
}

impl BackupManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create a fresh snapshot directory and copy `files` into it.
    ///
    /// Modification times are preserved. On a same-second collision the
    /// directory name gets a `_<n>` suffix.
    pub fn snapshot(&self, files: &[PathBuf]) -> Result<BackupSnapshot, BackupError> {
        let stamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
        let dir = self.create_snapshot_dir(&stamp)?;

        for file in files {
            let target = dir.join(file_name_string(file));
            copy_preserving_mtime(file, &target).map_err(backup_io("back up", file))?;
            debug!("Backed up {}", file.display());
        }

        info!("Created backup {} ({} files)", dir.display(), files.len());
        BackupSnapshot::from_dir(dir.clone()).map_err(backup_io("read", &dir))
    }

    fn create_snapshot_dir(&self, stamp: &str) -> Result<PathBuf, BackupError> {
        fs::create_dir_all(&self.root).map_err(backup_io("create", &self.root))?;

        let mut candidate = self.root.join(stamp);
        let mut suffix = 0;
        loop {
            match fs::create_dir(&candidate) {
                Ok(()) => return Ok(candidate),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    suffix += 1;
                    candidate = self.root.join(format!("{}_{}", stamp, suffix));
                }
                Err(e) => return Err(backup_io("create", &candidate)(e)),
            }
        }
    }

    /// All snapshots, newest first (by modification time, then name).
    pub fn list(&self) -> Result<Vec<BackupSnapshot>, BackupError> {
        if !self.root.is_dir() {
            return Err(BackupError::NoBackupDir);
        }

        let mut snapshots = Vec::new();
        for entry in fs::read_dir(&self.root).map_err(backup_io("read", &self.root))? {
            let entry = entry.map_err(backup_io("read", &self.root))?;
            let path = entry.path();
            if path.is_dir() {
                snapshots.push(BackupSnapshot::from_dir(path.clone()).map_err(backup_io("read", &path))?);
            }
        }

        snapshots.sort_by(|a, b| {
            b.modified
                .cmp(&a.modified)
                .then_with(|| b.name.cmp(&a.name))
        });
        Ok(snapshots)
    }

    /// The most recently modified snapshot.
    pub fn latest(&self) -> Result<BackupSnapshot, BackupError> {
        self.list()?
            .into_iter()
            .next()
            .ok_or(BackupError::NoSnapshots)
    }

    /// Number of snapshots, zero if the root does not exist.
    pub fn count(&self) -> usize {
        self.list().map(|s| s.len()).unwrap_or(0)
    }

    /// Append names to the snapshot's strings manifest.
    pub fn append_manifest<S: AsRef<str>>(
        &self,
        snapshot: &BackupSnapshot,
        names: &[S],
    ) -> Result<(), BackupError> {
        let path = snapshot.manifest_path();
        let mut file = File::options()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(backup_io("write", &path))?;
        for name in names {
            writeln!(file, "{}", name.as_ref()).map_err(backup_io("write", &path))?;
        }
        Ok(())
    }

    /// Names listed in the snapshot's manifest; empty if there is none.
    pub fn read_manifest(&self, snapshot: &BackupSnapshot) -> Result<Vec<String>, BackupError> {
        let path = snapshot.manifest_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&path).map_err(backup_io("read", &path))?;
        Ok(content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Copy every backed-up file into `dest`, then prune other snapshots.
    ///
    /// Overwrites existing files, so an interrupted restore can be rerun.
    pub fn restore(
        &self,
        snapshot: &BackupSnapshot,
        dest: &Path,
        progress: &dyn Fn(&str),
    ) -> Result<RestoreOutcome, BackupError> {
        let mut outcome = RestoreOutcome::default();

        for file in snapshot.files()? {
            let target = dest.join(file_name_string(&file));
            copy_preserving_mtime(&file, &target).map_err(backup_io("restore", &file))?;
            debug!("Restored {}", target.display());
            outcome.restored += 1;
        }
        progress(&format!("Restored {} file(s) from {}", outcome.restored, snapshot.name));

        outcome.pruned = self.prune_except(snapshot, progress);
        Ok(outcome)
    }

    /// Delete every snapshot other than `keep`. Failures are reported and skipped.
    pub fn prune_except(&self, keep: &BackupSnapshot, progress: &dyn Fn(&str)) -> usize {
        let Ok(snapshots) = self.list() else {
            return 0;
        };

        let mut pruned = 0;
        for old in snapshots.iter().filter(|s| s.path != keep.path) {
            match fs::remove_dir_all(&old.path) {
                Ok(()) => {
                    pruned += 1;
                    progress(&format!("Removed old backup: {}", old.name));
                }
                Err(e) => {
                    warn!("Could not remove backup {}: {}", old.path.display(), e);
                    progress(&format!("Warning: Could not remove {}: {}", old.name, e));
                }
            }
        }
        pruned
    }
}
