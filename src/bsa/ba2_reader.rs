//! Native BA2 inspection
//!
//! Reads the full name table through the ba2 crate so merged output can be
//! examined without the external packer.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use ba2::fo4::{Archive, FileHeader};
use ba2::prelude::*;
use ba2::ByteSlice;
use tracing::debug;

use super::ArchiveKind;

/// One file stored in an archive.
#[derive(Debug, Clone)]
pub struct Ba2FileEntry {
    /// Stored path, lowercase with backslashes.
    pub path: String,
    /// Decompressed size summed over all chunks.
    pub size: u64,
}

/// Everything listed in an archive.
#[derive(Debug, Clone)]
pub struct ArchiveContents {
    pub kind: ArchiveKind,
    pub entries: Vec<Ba2FileEntry>,
}

impl ArchiveContents {
    pub fn total_size(&self) -> u64 {
        self.entries.iter().map(|e| e.size).sum()
    }

    /// File count per top-level folder (`meshes`, `sound`, ...).
    pub fn by_top_level(&self) -> BTreeMap<String, usize> {
        let mut folders = BTreeMap::new();
        for entry in &self.entries {
            let top = match entry.path.split_once('\\') {
                Some((top, _)) => top.to_string(),
                None => String::new(),
            };
            *folders.entry(top).or_insert(0) += 1;
        }
        folders
    }
}

/// Read the name table of a Fallout 4 archive.
pub fn read_contents(ba2_path: &Path) -> Result<ArchiveContents> {
    let (archive, _options): (Archive, _) = Archive::read(ba2_path)
        .with_context(|| format!("Failed to open BA2: {}", ba2_path.display()))?;

    let mut kind = ArchiveKind::General;
    let mut entries = Vec::new();

    for (key, file) in archive.iter() {
        let path = String::from_utf8_lossy(key.name().as_bytes())
            .replace('/', "\\")
            .to_lowercase();
        let size: u64 = file
            .iter()
            .map(|chunk| chunk.decompressed_len().unwrap_or(chunk.len()) as u64)
            .sum();
        if matches!(file.header, FileHeader::DX10(_)) {
            kind = ArchiveKind::Texture;
        }
        entries.push(Ba2FileEntry { path, size });
    }

    entries.sort_by(|a, b| a.path.cmp(&b.path));
    debug!("Listed {} files in BA2 {}", entries.len(), ba2_path.display());
    Ok(ArchiveContents { kind, entries })
}
