//! BA2 header validation
//!
//! Reads the fixed 24-byte FO4 header without involving the external tool:
//!
//! | Offset | Size | Field             |
//! |--------|------|-------------------|
//! | 0      | 4    | magic `BTDX`      |
//! | 4      | 4    | version (1 or 8)  |
//! | 8      | 4    | type `GNRL`/`DX10`|
//! | 12     | 4    | file count        |
//! | 16     | 8    | name table offset |

use std::fs::File;
use std::io::{Cursor, Read};
use std::path::Path;

use binrw::BinRead;
use tracing::debug;

use super::ArchiveKind;
use crate::error::FormatError;
use crate::paths::file_name_string;

/// BA2 magic bytes
pub const BA2_MAGIC: [u8; 4] = *b"BTDX";

/// Size of the fixed header; also the smallest valid archive.
pub const HEADER_LEN: usize = 24;

/// Versions accepted for Fallout 4 (original release and the next-gen update).
pub const SUPPORTED_VERSIONS: &[u32] = &[1, 8];

#[derive(Debug, BinRead)]
#[br(little)]
struct RawHeader {
    magic: [u8; 4],
    version: u32,
    kind: [u8; 4],
    file_count: u32,
    name_table_offset: u64,
}

/// Validated archive header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveHeader {
    pub version: u32,
    pub kind: ArchiveKind,
    pub file_count: u32,
    pub name_table_offset: u64,
}

impl ArchiveHeader {
    /// Parse and validate a header from the start of `bytes`.
    ///
    /// `file_len` is the full length of the archive, used to bound the
    /// name table offset. `name` only appears in error messages.
    pub fn parse(bytes: &[u8], file_len: u64, name: &str) -> Result<Self, FormatError> {
        if bytes.len() < HEADER_LEN || file_len < HEADER_LEN as u64 {
            return Err(FormatError::TruncatedOrCorrupt {
                name: name.to_string(),
                reason: format!("archive too small, {} bytes", file_len),
            });
        }

        let raw = RawHeader::read(&mut Cursor::new(&bytes[..HEADER_LEN])).map_err(|e| {
            FormatError::TruncatedOrCorrupt {
                name: name.to_string(),
                reason: e.to_string(),
            }
        })?;

        if raw.magic != BA2_MAGIC {
            return Err(FormatError::BadMagic {
                name: name.to_string(),
            });
        }

        if !SUPPORTED_VERSIONS.contains(&raw.version) {
            return Err(FormatError::UnsupportedVersion {
                name: name.to_string(),
                version: raw.version,
            });
        }

        let kind = ArchiveKind::from_tag(&raw.kind).ok_or_else(|| FormatError::UnknownType {
            name: name.to_string(),
            tag: String::from_utf8_lossy(&raw.kind)
                .trim_end_matches('\0')
                .to_string(),
        })?;

        if raw.name_table_offset > file_len {
            return Err(FormatError::TruncatedOrCorrupt {
                name: name.to_string(),
                reason: "name table beyond EOF".to_string(),
            });
        }

        Ok(Self {
            version: raw.version,
            kind,
            file_count: raw.file_count,
            name_table_offset: raw.name_table_offset,
        })
    }

    /// Read and validate the header of an archive on disk.
    pub fn read_from(path: &Path) -> Result<Self, FormatError> {
        let name = file_name_string(path);
        let io_err = |source| FormatError::Io {
            name: name.clone(),
            source,
        };

        let mut file = File::open(path).map_err(io_err)?;
        let file_len = file.metadata().map_err(io_err)?.len();

        let mut buf = Vec::with_capacity(HEADER_LEN);
        file.by_ref()
            .take(HEADER_LEN as u64)
            .read_to_end(&mut buf)
            .map_err(io_err)?;

        let header = Self::parse(&buf, file_len, &name)?;
        debug!(
            "BA2 header {}: v{} {} {} files",
            name,
            header.version,
            header.kind.tag_str(),
            header.file_count
        );
        Ok(header)
    }

    /// Serialize back to the 24-byte on-disk form.
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0..4].copy_from_slice(&BA2_MAGIC);
        out[4..8].copy_from_slice(&self.version.to_le_bytes());
        out[8..12].copy_from_slice(self.kind.tag());
        out[12..16].copy_from_slice(&self.file_count.to_le_bytes());
        out[16..24].copy_from_slice(&self.name_table_offset.to_le_bytes());
        out
    }
}

/// Validate an archive and describe it for display.
///
/// Returns e.g. `"CCPacked_Main - Main.ba2 (120 files, 35.2 MB)"`.
pub fn verify_archive(path: &Path) -> Result<(ArchiveHeader, String), FormatError> {
    let header = ArchiveHeader::read_from(path)?;
    let size = path
        .metadata()
        .map_err(|source| FormatError::Io {
            name: file_name_string(path),
            source,
        })?
        .len();
    let report = format!(
        "{} ({} files, {:.1} MB)",
        file_name_string(path),
        header.file_count,
        size as f64 / (1024.0 * 1024.0)
    );
    Ok((header, report))
}
