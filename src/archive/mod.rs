//! External archive tool integration.
//!
//! BA2 compression is never done in-process. The orchestrators drive a packer
//! through the [`ArchiveTool`] trait; [`BsArch`] is the real implementation
//! that shells out to BSArch.
//!
//! # BSArch Commands Reference
//!
//! - Unpack: `bsarch unpack <archive> <folder> [-mt]`
//! - Pack: `bsarch pack . <archive> -fo4|-fo4dds [-z] [-mt]` (run from inside
//!   the source folder, BSArch keeps relative path components)
//! - List: `bsarch <archive> -list`

pub mod bsarch;

pub use bsarch::{locate_bsarch, BsArch};

use std::path::Path;

use crate::bsa::ArchiveKind;
use crate::error::ToolError;

/// Contents reported by a tool listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveListing {
    /// `Files: <n>` from the header summary, if present.
    pub declared_files: Option<usize>,
    /// Relative paths, lowercase with backslash separators.
    pub entries: Vec<String>,
}

/// Packer operations needed by merge and restore.
pub trait ArchiveTool {
    /// Extract every file of `archive` into `dest`.
    fn unpack(&self, archive: &Path, dest: &Path) -> Result<(), ToolError>;

    /// Build `archive` from the contents of `source_dir`.
    ///
    /// Entries must be rooted at `source_dir`. Texture archives are always
    /// compressed regardless of `compressed`.
    fn pack(
        &self,
        source_dir: &Path,
        archive: &Path,
        kind: ArchiveKind,
        compressed: bool,
    ) -> Result<(), ToolError>;

    /// List the contents of `archive`.
    fn list(&self, archive: &Path) -> Result<ArchiveListing, ToolError>;
}

/// Normalize an archive entry path for comparison.
/// `Meshes/Foo.NIF` -> `meshes\foo.nif`
pub fn to_archive_path(path: &str) -> String {
    path.replace('/', "\\").to_lowercase()
}

/// Parse BSArch `-list` output.
///
/// BSArch prints a banner and `Key: value` header lines, a blank line, then
/// one relative path per line.
pub fn parse_listing(output: &str) -> ArchiveListing {
    let mut listing = ArchiveListing::default();
    let mut in_file_list = false;

    for line in output.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            in_file_list = true;
            continue;
        }

        if let Some(count) = trimmed.strip_prefix("Files:") {
            if let Ok(n) = count.trim().parse::<usize>() {
                listing.declared_files = Some(n);
            }
            continue;
        }

        if !in_file_list {
            continue;
        }

        if trimmed.starts_with("BSArch")
            || trimmed.starts_with("The Source")
            || trimmed.starts_with("https:")
            || trimmed.starts_with("Packer and unpacker")
            || line.starts_with(' ')
        {
            continue;
        }

        listing.entries.push(to_archive_path(trimmed));
    }

    listing
}
