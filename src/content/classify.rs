//! Asset classification for extracted archive content.
//!
//! The tag of a file depends only on its extension and on the kind of
//! archive it came out of. String tables leave the archives entirely,
//! sounds go into their own uncompressed archive.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::bsa::ArchiveKind;
use crate::error::{io_err, PackError};
use crate::paths::{ensure_parent_dirs, extension_lower, file_name_string};

/// Localization tables, kept loose in `Data/Strings`.
pub const STRING_EXTENSIONS: &[&str] = &["strings", "dlstrings", "ilstrings"];

/// Audio and lip-sync data, packed without compression.
pub const SOUND_EXTENSIONS: &[&str] = &["xwm", "wav", "fuz", "lip"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetTag {
    General,
    Sound,
    Texture,
    String,
}

/// A file in a staging tree, relative to the tree root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedAsset {
    pub path: PathBuf,
    pub size: u64,
    pub tag: AssetTag,
}

/// Tag a file by extension and originating archive kind.
pub fn classify_file(path: &Path, origin: ArchiveKind) -> AssetTag {
    if origin == ArchiveKind::Texture {
        return AssetTag::Texture;
    }
    match extension_lower(path) {
        Some(ext) if STRING_EXTENSIONS.contains(&ext.as_str()) => AssetTag::String,
        Some(ext) if SOUND_EXTENSIONS.contains(&ext.as_str()) => AssetTag::Sound,
        _ => AssetTag::General,
    }
}

/// Walk `root` in file-name order and tag every file.
pub fn classify_tree(root: &Path, origin: ArchiveKind) -> io::Result<Vec<ExtractedAsset>> {
    let mut assets = Vec::new();
    if !root.exists() {
        return Ok(assets);
    }

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(io::Error::other)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(io::Error::other)?
            .to_path_buf();
        let size = entry.metadata().map_err(io::Error::other)?.len();
        let tag = classify_file(&relative, origin);
        assets.push(ExtractedAsset {
            path: relative,
            size,
            tag,
        });
    }

    Ok(assets)
}

/// Number of regular files below `root`.
pub fn count_files(root: &Path) -> usize {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .count()
}

/// Move a file, falling back to copy + delete across filesystems.
pub(crate) fn move_file(src: &Path, dst: &Path) -> io::Result<()> {
    ensure_parent_dirs(dst)?;
    if dst.exists() {
        fs::remove_file(dst)?;
    }
    if fs::rename(src, dst).is_err() {
        fs::copy(src, dst)?;
        fs::remove_file(src)?;
    }
    Ok(())
}

/// Move everything below `src_root` into `dst_root`, keeping relative paths.
///
/// Existing files at the destination are overwritten, so the last archive
/// absorbed wins on a path collision. Returns the number of files moved.
pub fn absorb_tree(src_root: &Path, dst_root: &Path) -> Result<usize, PackError> {
    let files = classify_tree(src_root, ArchiveKind::General)
        .map_err(io_err("scan", src_root))?;

    for asset in &files {
        let src = src_root.join(&asset.path);
        let dst = dst_root.join(&asset.path);
        if dst.exists() {
            debug!("Overwriting {}", asset.path.display());
        }
        move_file(&src, &dst).map_err(io_err("move", &src))?;
    }

    Ok(files.len())
}

/// Copy string tables from the general tree into `strings_dir`, flattening
/// their directories, then remove them from the tree.
///
/// A plain copy is used so the relocated files get fresh timestamps.
/// Per-file failures are reported and skipped. When the same name appears
/// in several folders the last one in walk order wins and the name is
/// listed once. Returns the relocated names.
pub fn relocate_strings(
    general_dir: &Path,
    strings_dir: &Path,
    progress: &dyn Fn(&str),
) -> Result<Vec<String>, PackError> {
    fs::create_dir_all(strings_dir).map_err(io_err("create", strings_dir))?;

    let assets = classify_tree(general_dir, ArchiveKind::General)
        .map_err(io_err("scan", general_dir))?;

    let mut moved: Vec<String> = Vec::new();
    for asset in assets.iter().filter(|a| a.tag == AssetTag::String) {
        let src = general_dir.join(&asset.path);
        let name = file_name_string(&src);
        let target = strings_dir.join(&name);
        let duplicate = moved.contains(&name);
        if duplicate {
            warn!("Duplicate strings file {} replaces an earlier copy", asset.path.display());
            progress(&format!(
                "Warning: {} found in more than one folder, keeping {}",
                name,
                asset.path.display()
            ));
        }

        let result = fs::read(&src)
            .and_then(|bytes| fs::write(&target, bytes))
            .and_then(|_| fs::remove_file(&src));
        match result {
            Ok(()) => {
                debug!("Relocated {} to {}", asset.path.display(), target.display());
                if !duplicate {
                    moved.push(name);
                }
            }
            Err(e) => {
                warn!("Failed to move {}: {}", name, e);
                progress(&format!("Warning: Failed to move {}: {}", name, e));
            }
        }
    }

    Ok(moved)
}

/// Move sound files out of the general tree into `sounds_dir`.
/// Returns the number of files moved.
pub fn separate_sounds(general_dir: &Path, sounds_dir: &Path) -> Result<usize, PackError> {
    let assets = classify_tree(general_dir, ArchiveKind::General)
        .map_err(io_err("scan", general_dir))?;

    let mut moved = 0;
    for asset in assets.iter().filter(|a| a.tag == AssetTag::Sound) {
        let src = general_dir.join(&asset.path);
        move_file(&src, &sounds_dir.join(&asset.path)).map_err(io_err("move", &src))?;
        moved += 1;
    }
    Ok(moved)
}
