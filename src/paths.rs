//! Data folder layout and file naming conventions.
//!
//! Everything the packer touches lives under the game's `Data` folder:
//! - `CC_Backup/<YYYYMMDD_HHMMSS>/` snapshots of consumed archives
//! - `CC_Temp/` staging tree (recreated per merge)
//! - `Strings/` loose localization files

use std::path::{Path, PathBuf};

/// Archive role suffix for general content.
pub const MAIN_ARCHIVE_SUFFIX: &str = " - Main.ba2";

/// Archive role suffix for DX10 texture content.
pub const TEXTURES_ARCHIVE_SUFFIX: &str = " - Textures.ba2";

/// Plugin extensions recognized as item stubs.
pub const PLUGIN_EXTENSIONS: &[&str] = &["esl", "esp", "esm"];

/// Paths inside a game installation.
#[derive(Debug, Clone)]
pub struct DataLayout {
    /// Game installation root.
    pub game_dir: PathBuf,
    /// `<game>/Data`.
    pub data_dir: PathBuf,
    /// Snapshot root.
    pub backup_dir: PathBuf,
    /// Staging root.
    pub temp_dir: PathBuf,
    /// Loose strings folder.
    pub strings_dir: PathBuf,
}

impl DataLayout {
    pub fn new(game_dir: &Path) -> Self {
        let data_dir = game_dir.join("Data");
        Self {
            game_dir: game_dir.to_path_buf(),
            backup_dir: data_dir.join("CC_Backup"),
            temp_dir: data_dir.join("CC_Temp"),
            strings_dir: data_dir.join("Strings"),
            data_dir,
        }
    }

    /// Staging tree for general (non-texture) content.
    pub fn general_dir(&self) -> PathBuf {
        self.temp_dir.join("General")
    }

    /// Staging tree for texture content.
    pub fn textures_dir(&self) -> PathBuf {
        self.temp_dir.join("Textures")
    }

    /// Staging tree for uncompressed sound content.
    pub fn sounds_dir(&self) -> PathBuf {
        self.temp_dir.join("Sounds")
    }

    /// Scratch directory a single archive is unpacked into before verification.
    pub fn unpack_dir(&self) -> PathBuf {
        self.temp_dir.join("unpack")
    }

    /// Staging directory for texture group `number` (1-based).
    pub fn split_dir(&self, number: usize) -> PathBuf {
        self.temp_dir.join(format!("split_{}", number))
    }

    /// Main archive path of an item or merged output.
    pub fn main_archive(&self, base_name: &str) -> PathBuf {
        self.data_dir.join(main_archive_name(base_name))
    }

    /// Texture archive path of an item or merged output.
    pub fn texture_archive(&self, base_name: &str) -> PathBuf {
        self.data_dir.join(texture_archive_name(base_name))
    }
}

/// `<base> - Main.ba2`
pub fn main_archive_name(base_name: &str) -> String {
    format!("{}{}", base_name, MAIN_ARCHIVE_SUFFIX)
}

/// `<base> - Textures.ba2`
pub fn texture_archive_name(base_name: &str) -> String {
    format!("{}{}", base_name, TEXTURES_ARCHIVE_SUFFIX)
}

/// ASCII case-insensitive prefix test.
pub fn starts_with_ignore_case(name: &str, prefix: &str) -> bool {
    name.len() >= prefix.len()
        && name.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}

/// True if any of the prefixes matches `name` case-insensitively.
pub fn has_any_prefix<S: AsRef<str>>(name: &str, prefixes: &[S]) -> bool {
    prefixes
        .iter()
        .any(|p| starts_with_ignore_case(name, p.as_ref()))
}

/// Get file extension (lowercase)
pub fn extension_lower(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Get the file name as an owned string (lossy).
pub fn file_name_string(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Create parent directories for a path if they don't exist
pub fn ensure_parent_dirs(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
