//! BA2 (Bethesda Archive) handling
//!
//! - `header`: fixed-layout header validation (magic, version, type, counts)
//! - `ba2_reader`: native listing through the ba2 crate
//!
//! Packing and unpacking is done by the external BSArch tool, see `archive`.

mod ba2_reader;
mod header;

pub use ba2_reader::{read_contents, ArchiveContents, Ba2FileEntry};
pub use header::{verify_archive, ArchiveHeader, BA2_MAGIC, HEADER_LEN, SUPPORTED_VERSIONS};

/// BA2 container type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveKind {
    /// General archive (GNRL) - meshes, scripts, sounds, etc.
    General,
    /// DirectX 10 textures (DX10)
    Texture,
}

impl ArchiveKind {
    /// Four-byte type tag as stored in the header.
    pub fn tag(&self) -> &'static [u8; 4] {
        match self {
            ArchiveKind::General => b"GNRL",
            ArchiveKind::Texture => b"DX10",
        }
    }

    pub fn tag_str(&self) -> &'static str {
        match self {
            ArchiveKind::General => "GNRL",
            ArchiveKind::Texture => "DX10",
        }
    }

    pub fn from_tag(tag: &[u8; 4]) -> Option<Self> {
        match tag {
            b"GNRL" => Some(ArchiveKind::General),
            b"DX10" => Some(ArchiveKind::Texture),
            _ => None,
        }
    }

    /// BSArch format flag selecting this container type.
    pub fn bsarch_flag(&self) -> &'static str {
        match self {
            ArchiveKind::General => "-fo4",
            ArchiveKind::Texture => "-fo4dds",
        }
    }
}
