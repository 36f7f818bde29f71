//! Minimal light-master plugin stubs.
//!
//! The game only loads an archive when a plugin with a matching name is
//! active, so every merged archive gets an empty ESL next to it. The stub is
//! a lone TES4 header record:
//!
//! ```text
//! TES4 <size> <flags 0x201> <form id 0> <vc 0> <form version 0>
//!   HEDR (12) 1.0f32 0 0
//!   CNAM (n)  creator\0
//!   SNAM (n)  summary\0
//!   INTV (4)  0
//! ```

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::error::StubError;

/// Header record size preceding the subrecords.
const RECORD_HEADER_LEN: usize = 24;

const FLAG_MASTER: u32 = 0x0000_0001;
const FLAG_LIGHT: u32 = 0x0000_0200;

/// Plugin format version written to HEDR.
const HEDR_VERSION: f32 = 1.0;

pub const DEFAULT_CREATOR: &str = "CC-Packer";
pub const DEFAULT_SUMMARY: &str = "Merged Creation Club Content - Localization Ready";

/// Builder for the stub plugin bytes.
#[derive(Debug, Clone)]
pub struct PluginStubBuilder {
    creator: String,
    summary: String,
}

impl Default for PluginStubBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_CREATOR, DEFAULT_SUMMARY)
    }
}

impl PluginStubBuilder {
    pub fn new(creator: &str, summary: &str) -> Self {
        Self {
            creator: creator.to_string(),
            summary: summary.to_string(),
        }
    }

    /// Serialize the stub. Output depends only on creator and summary.
    pub fn build(&self) -> Result<Vec<u8>, StubError> {
        let mut data = Vec::with_capacity(128);

        data.extend_from_slice(b"TES4");
        data.extend_from_slice(&0u32.to_le_bytes()); // patched below
        data.extend_from_slice(&(FLAG_MASTER | FLAG_LIGHT).to_le_bytes());
        data.extend_from_slice(&0u32.to_le_bytes()); // form id
        data.extend_from_slice(&0u32.to_le_bytes()); // timestamp / version control
        data.extend_from_slice(&0u32.to_le_bytes()); // form version

        let mut hedr = Vec::with_capacity(12);
        hedr.extend_from_slice(&HEDR_VERSION.to_le_bytes());
        hedr.extend_from_slice(&0u32.to_le_bytes()); // record count
        hedr.extend_from_slice(&0u32.to_le_bytes()); // next object id
        push_subrecord(&mut data, b"HEDR", "HEDR", &hedr)?;

        push_subrecord(&mut data, b"CNAM", "creator", &zstring(&self.creator))?;
        push_subrecord(&mut data, b"SNAM", "summary", &zstring(&self.summary))?;
        push_subrecord(&mut data, b"INTV", "INTV", &0u32.to_le_bytes())?;

        let record_size = (data.len() - RECORD_HEADER_LEN) as u32;
        data[4..8].copy_from_slice(&record_size.to_le_bytes());
        Ok(data)
    }

    /// Build and write the stub to `path`, replacing any existing file.
    pub fn write_to(&self, path: &Path) -> Result<(), StubError> {
        let data = self.build()?;
        fs::write(path, &data).map_err(|source| StubError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Wrote plugin stub {} ({} bytes)", path.display(), data.len());
        Ok(())
    }
}

/// Stub bytes for the given creator and summary.
pub fn build_stub(creator: &str, summary: &str) -> Result<Vec<u8>, StubError> {
    PluginStubBuilder::new(creator, summary).build()
}

/// Write a stub with the given creator and summary to `path`.
pub fn write_stub(path: &Path, creator: &str, summary: &str) -> Result<(), StubError> {
    PluginStubBuilder::new(creator, summary).write_to(path)
}

fn zstring(s: &str) -> Vec<u8> {
    let mut bytes = s.as_bytes().to_vec();
    bytes.push(0);
    bytes
}

fn push_subrecord(
    out: &mut Vec<u8>,
    tag: &[u8; 4],
    field: &'static str,
    payload: &[u8],
) -> Result<(), StubError> {
    let len = u16::try_from(payload.len()).map_err(|_| StubError::FieldTooLong {
        field,
        len: payload.len(),
    })?;
    out.extend_from_slice(tag);
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(payload);
    Ok(())
}
