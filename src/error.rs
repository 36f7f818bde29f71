//! Error taxonomy for merge and restore operations.
//!
//! Every error renders as a single message suitable for direct display.
//! Tool failures additionally keep the raw tool output for diagnosis.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// BA2 header validation failures.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("Invalid BA2 header (expected 'BTDX'): {name}")]
    BadMagic { name: String },

    #[error("Unexpected BA2 version {version} (expected 1 or 8): {name}")]
    UnsupportedVersion { name: String, version: u32 },

    #[error("Unknown archive type '{tag}' (expected GNRL or DX10): {name}")]
    UnknownType { name: String, tag: String },

    #[error("Corrupted archive ({reason}): {name}")]
    TruncatedOrCorrupt { name: String, reason: String },

    #[error("Cannot read archive {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: io::Error,
    },
}

/// Best-effort category derived from the tool's output text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolErrorKind {
    AccessDenied,
    DiskFull,
    NotFound,
    Corrupt,
    Locked,
    Generic,
}

impl ToolErrorKind {
    /// Classify combined stdout/stderr text.
    pub fn classify(stdout: &str, stderr: &str) -> Self {
        let combined = format!("{} {}", stderr, stdout).to_lowercase();

        if combined.contains("access") && combined.contains("denied") {
            ToolErrorKind::AccessDenied
        } else if combined.contains("disk")
            && (combined.contains("full") || combined.contains("space"))
        {
            ToolErrorKind::DiskFull
        } else if combined.contains("not found") || combined.contains("cannot find") {
            ToolErrorKind::NotFound
        } else if combined.contains("corrupt") || combined.contains("invalid") {
            ToolErrorKind::Corrupt
        } else if combined.contains("in use") || combined.contains("locked") {
            ToolErrorKind::Locked
        } else {
            ToolErrorKind::Generic
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            ToolErrorKind::AccessDenied => {
                "Access denied - the file may be in use or you need Administrator privileges"
            }
            ToolErrorKind::DiskFull => "Insufficient disk space to complete operation",
            ToolErrorKind::NotFound => "Source file or directory not found",
            ToolErrorKind::Corrupt => "Archive appears to be corrupted or in an invalid format",
            ToolErrorKind::Locked => {
                "File is locked by another process (possibly the game or another tool)"
            }
            ToolErrorKind::Generic => "BSArch reported an error",
        }
    }
}

/// External archive tool failures. Never retried.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("{}", failure_message(.operation, .archive, .exit_code, .kind, .stdout, .stderr))]
    Failed {
        operation: String,
        archive: String,
        exit_code: Option<i32>,
        kind: ToolErrorKind,
        stdout: String,
        stderr: String,
    },

    #[error("BSArch {operation} failed\nArchive: {archive}\nDetails: Operation timed out after {seconds} seconds")]
    Timeout {
        operation: String,
        archive: String,
        seconds: u64,
    },

    #[error("BSArch executable not found: {}", .path.display())]
    NotFound { path: PathBuf },

    #[error("BSArch {operation} could not be started for {archive}: {source}")]
    Spawn {
        operation: String,
        archive: String,
        #[source]
        source: io::Error,
    },
}

impl ToolError {
    /// Category of a nonzero-exit failure, if this is one.
    pub fn kind(&self) -> Option<ToolErrorKind> {
        match self {
            ToolError::Failed { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

fn failure_message(
    operation: &str,
    archive: &str,
    exit_code: &Option<i32>,
    kind: &ToolErrorKind,
    stdout: &str,
    stderr: &str,
) -> String {
    let mut details = vec![format!("BSArch {} failed", operation)];
    if !archive.is_empty() {
        details.push(format!("Archive: {}", archive));
    }
    if let Some(code) = exit_code {
        details.push(format!("Exit code: {}", code));
    }
    if !stderr.trim().is_empty() {
        details.push(format!("Error output: {}", stderr.trim()));
    }
    if !stdout.trim().is_empty() {
        details.push(format!("Output: {}", stdout.trim()));
    }
    details.push(format!("Details: {}", kind.describe()));
    details.join("\n")
}

/// Content integrity problems.
#[derive(Debug, Error)]
pub enum IntegrityError {
    #[error("{}", no_content_message(.previously_merged))]
    NoContent {
        previously_merged: bool,
        orphaned: usize,
    },

    #[error("{name} is incomplete (missing: {})", .missing.join(", "))]
    Orphaned { name: String, missing: Vec<String> },

    #[error(
        "Found {merged} merged archive(s) alongside {new_items} new CC item(s). \
         Restore the previous merge first so everything is repacked together."
    )]
    MixedState { merged: usize, new_items: usize },
}

fn no_content_message(previously_merged: &bool) -> &'static str {
    if *previously_merged {
        "Only previously merged (CCPacked) archives found. No new CC files to merge."
    } else {
        "No Creation Club content found."
    }
}

/// Snapshot tree problems.
#[derive(Debug, Error)]
pub enum BackupError {
    #[error("No backup folder found.")]
    NoBackupDir,

    #[error("No backups found.")]
    NoSnapshots,

    #[error("Failed to {action} {}: {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Load-order file problems. Logged by callers, never fatal.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Plugin stub construction problems.
#[derive(Debug, Error)]
pub enum StubError {
    #[error("Plugin {field} field is too long ({len} bytes)")]
    FieldTooLong { field: &'static str, len: usize },

    #[error("Failed to write plugin {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Final failure of a merge or restore.
#[derive(Debug, Error)]
pub enum PackError {
    #[error("Data folder not found: {}", .0.display())]
    DataDirMissing(PathBuf),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error(transparent)]
    Integrity(#[from] IntegrityError),

    #[error(transparent)]
    Backup(#[from] BackupError),

    #[error(transparent)]
    Stub(#[from] StubError),

    #[error("Nothing to restore: {0}")]
    NoBackup(#[source] BackupError),

    #[error("Could not remove merged files, nothing was restored: {}", .files.join(", "))]
    SweepIncomplete { files: Vec<String> },

    #[error("Verification failed for {archive}: {reason}")]
    Verification { archive: String, reason: String },

    #[error("Failed to {action} {}: {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Build a `map_err` adapter attaching an action and path to an I/O error.
pub(crate) fn io_err(
    action: &'static str,
    path: impl Into<PathBuf>,
) -> impl FnOnce(io::Error) -> PackError {
    let path = path.into();
    move |source| PackError::Io {
        action,
        path,
        source,
    }
}
