//! Shared fixtures: a scripted archive tool and a fake game install.
//!
//! Fake archives are a real 24-byte BA2 header followed by a JSON map of
//! relative path to file bytes, so header validation runs unmodified.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use ccpack::archive::{ArchiveListing, ArchiveTool};
use ccpack::bsa::{ArchiveHeader, ArchiveKind, HEADER_LEN};
use ccpack::error::{ToolError, ToolErrorKind};
use ccpack::packer::PackerConfig;
use tempfile::TempDir;
use walkdir::WalkDir;

pub type Payload = BTreeMap<String, Vec<u8>>;

/// Write a fake archive whose header declares `declared` files.
pub fn write_archive_with_count(path: &Path, kind: ArchiveKind, files: &Payload, declared: u32) {
    let header = ArchiveHeader {
        version: 1,
        kind,
        file_count: declared,
        name_table_offset: HEADER_LEN as u64,
    };
    let mut data = header.to_bytes().to_vec();
    data.extend_from_slice(&serde_json::to_vec(files).unwrap());
    fs::write(path, data).unwrap();
}

pub fn write_archive(path: &Path, kind: ArchiveKind, files: &[(&str, &[u8])]) {
    let payload: Payload = files
        .iter()
        .map(|(name, data)| (name.to_string(), data.to_vec()))
        .collect();
    write_archive_with_count(path, kind, &payload, payload.len() as u32);
}

/// Payload of a fake archive. The header is skipped, not validated.
pub fn read_payload(path: &Path) -> Payload {
    let data = fs::read(path).unwrap();
    serde_json::from_slice(&data[HEADER_LEN..]).unwrap()
}

pub fn read_kind(path: &Path) -> ArchiveKind {
    ArchiveHeader::read_from(path).unwrap().kind
}

/// One recorded pack call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackCall {
    pub archive: String,
    pub kind: ArchiveKind,
    pub compressed: bool,
}

/// In-process stand-in for BSArch.
#[derive(Default)]
pub struct FakeTool {
    /// Leave out one file when unpacking this archive name.
    pub drop_file_from: Option<String>,
    /// Fail unpacking this archive name.
    pub fail_unpack_of: Option<String>,
    /// Fail every pack call.
    pub fail_pack: bool,
    pub unpacked: RefCell<Vec<String>>,
    pub packed: RefCell<Vec<PackCall>>,
}

fn name_of(path: &Path) -> String {
    path.file_name().unwrap().to_string_lossy().to_string()
}

fn failure(operation: &str, archive: &Path) -> ToolError {
    ToolError::Failed {
        operation: operation.to_string(),
        archive: name_of(archive),
        exit_code: Some(1),
        kind: ToolErrorKind::AccessDenied,
        stdout: String::new(),
        stderr: "Access is denied.".to_string(),
    }
}

impl ArchiveTool for FakeTool {
    fn unpack(&self, archive: &Path, dest: &Path) -> Result<(), ToolError> {
        let name = name_of(archive);
        if self.fail_unpack_of.as_deref() == Some(name.as_str()) {
            return Err(failure("unpack", archive));
        }

        let mut payload = read_payload(archive);
        if self.drop_file_from.as_deref() == Some(name.as_str()) {
            let first = payload.keys().next().cloned();
            if let Some(key) = first {
                payload.remove(&key);
            }
        }

        for (rel, bytes) in payload {
            let target = dest.join(rel);
            fs::create_dir_all(target.parent().unwrap()).unwrap();
            fs::write(target, bytes).unwrap();
        }
        self.unpacked.borrow_mut().push(name);
        Ok(())
    }

    fn pack(
        &self,
        source_dir: &Path,
        archive: &Path,
        kind: ArchiveKind,
        compressed: bool,
    ) -> Result<(), ToolError> {
        if self.fail_pack {
            return Err(failure("pack", archive));
        }

        let mut payload = Payload::new();
        for entry in WalkDir::new(source_dir).sort_by_file_name() {
            let entry = entry.unwrap();
            if entry.file_type().is_file() {
                let rel = entry.path().strip_prefix(source_dir).unwrap();
                let key = rel.to_string_lossy().replace('\\', "/");
                payload.insert(key, fs::read(entry.path()).unwrap());
            }
        }
        write_archive_with_count(archive, kind, &payload, payload.len() as u32);

        self.packed.borrow_mut().push(PackCall {
            archive: name_of(archive),
            kind,
            compressed,
        });
        Ok(())
    }

    fn list(&self, archive: &Path) -> Result<ArchiveListing, ToolError> {
        let payload = read_payload(archive);
        Ok(ArchiveListing {
            declared_files: Some(payload.len()),
            entries: payload.keys().map(|k| k.replace('/', "\\")).collect(),
        })
    }
}

/// A temporary game install with a `Data` folder and a `plugins.txt`.
pub struct Game {
    pub temp: TempDir,
    pub config: PackerConfig,
}

impl Game {
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("Data").join("Strings")).unwrap();
        let appdata = temp.path().join("AppData").join("Fallout4");
        fs::create_dir_all(&appdata).unwrap();
        let plugins = appdata.join("plugins.txt");
        fs::write(&plugins, "*Fallout4.esm\r\n*ccBGSFO4001-PipBoy(Black).esl\r\n").unwrap();

        let mut config = PackerConfig::new(temp.path());
        config.plugins_txt = Some(plugins);
        Self { temp, config }
    }

    pub fn data(&self) -> PathBuf {
        self.temp.path().join("Data")
    }

    pub fn plugins_txt(&self) -> PathBuf {
        self.config.plugins_txt.clone().unwrap()
    }

    /// Add a complete CC item: plugin plus both archives.
    pub fn add_item(&self, base: &str, main: &[(&str, &[u8])], textures: &[(&str, &[u8])]) {
        fs::write(self.data().join(format!("{}.esl", base)), b"plugin").unwrap();
        write_archive(
            &self.data().join(format!("{} - Main.ba2", base)),
            ArchiveKind::General,
            main,
        );
        write_archive(
            &self.data().join(format!("{} - Textures.ba2", base)),
            ArchiveKind::Texture,
            textures,
        );
    }

    /// Every regular file below Data, excluding backups, with its bytes.
    pub fn data_files(&self) -> BTreeMap<String, Vec<u8>> {
        let data = self.data();
        let mut files = BTreeMap::new();
        for entry in WalkDir::new(&data) {
            let entry = entry.unwrap();
            let rel = entry.path().strip_prefix(&data).unwrap().to_path_buf();
            if rel.starts_with("CC_Backup") || !entry.file_type().is_file() {
                continue;
            }
            files.insert(
                rel.to_string_lossy().replace('\\', "/"),
                fs::read(entry.path()).unwrap(),
            );
        }
        files
    }
}

/// Collects progress lines.
#[derive(Default)]
pub struct Progress {
    pub lines: RefCell<Vec<String>>,
}

impl Progress {
    pub fn push(&self, msg: &str) {
        self.lines.borrow_mut().push(msg.to_string());
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines.borrow().iter().any(|l| l.contains(needle))
    }
}
