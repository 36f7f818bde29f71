//! `plugins.txt` maintenance.
//!
//! One plugin per line, `*` marks an enabled plugin. Entries are compared by
//! their name without the `*`, ignoring ASCII case. The file is rewritten
//! only when an entry is actually added or removed, keeping its BOM, line
//! ending style and trailing newline.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::RegistryError;

const UTF8_BOM: &str = "\u{feff}";

/// The game's `plugins.txt`.
#[derive(Debug, Clone)]
pub struct LoadOrderRegistry {
    path: PathBuf,
}

/// Parsed file contents plus the formatting to write them back with.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PluginsFile {
    bom: bool,
    crlf: bool,
    trailing_newline: bool,
    lines: Vec<String>,
}

impl PluginsFile {
    fn empty() -> Self {
        Self {
            bom: false,
            crlf: false,
            trailing_newline: false,
            lines: Vec::new(),
        }
    }

    fn parse(raw: &str) -> Self {
        let (bom, text) = match raw.strip_prefix(UTF8_BOM) {
            Some(rest) => (true, rest),
            None => (false, raw),
        };
        Self {
            bom,
            crlf: text.contains("\r\n"),
            trailing_newline: text.ends_with('\n'),
            lines: text.lines().map(str::to_string).collect(),
        }
    }

    fn render(&self) -> String {
        let newline = if self.crlf { "\r\n" } else { "\n" };
        let mut out = String::new();
        if self.bom {
            out.push_str(UTF8_BOM);
        }
        out.push_str(&self.lines.join(newline));
        if self.trailing_newline && !self.lines.is_empty() {
            out.push_str(newline);
        }
        out
    }

    fn contains(&self, name: &str) -> bool {
        let wanted = identity(name);
        self.lines.iter().any(|line| identity(line) == wanted)
    }
}

/// Plugin name without the enabled marker, lowercased.
fn identity(line: &str) -> String {
    line.trim().trim_start_matches('*').to_ascii_lowercase()
}

impl LoadOrderRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `%LOCALAPPDATA%/Fallout4/plugins.txt`, if `LOCALAPPDATA` is set.
    pub fn default_path() -> Option<PathBuf> {
        std::env::var_os("LOCALAPPDATA")
            .filter(|v| !v.is_empty())
            .map(|dir| PathBuf::from(dir).join("Fallout4").join("plugins.txt"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<PluginsFile, RegistryError> {
        let bytes = fs::read(&self.path).map_err(|source| RegistryError::Read {
            path: self.path.clone(),
            source,
        })?;
        Ok(PluginsFile::parse(&String::from_utf8_lossy(&bytes)))
    }

    fn write(&self, file: &PluginsFile) -> Result<(), RegistryError> {
        fs::write(&self.path, file.render()).map_err(|source| RegistryError::Write {
            path: self.path.clone(),
            source,
        })
    }

    /// Current lines, in file order. A missing file has no entries.
    pub fn entries(&self) -> Result<Vec<String>, RegistryError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        Ok(self.read()?.lines)
    }

    /// Append `*<name>` for every name not already listed in either form.
    ///
    /// Does nothing when the containing folder does not exist. Returns the
    /// number of entries added.
    pub fn add<S: AsRef<str>>(&self, names: &[S]) -> Result<usize, RegistryError> {
        if !self.path.parent().is_some_and(Path::exists) {
            debug!(
                "Skipping plugins.txt update, {} has no parent folder",
                self.path.display()
            );
            return Ok(0);
        }

        let mut file = if self.path.exists() {
            self.read()?
        } else {
            PluginsFile::empty()
        };

        let mut added = 0;
        for name in names {
            let name = name.as_ref();
            if !file.contains(name) {
                file.lines.push(format!("*{}", name));
                added += 1;
            }
        }

        if added > 0 {
            self.write(&file)?;
            info!("Added {} plugin(s) to {}", added, self.path.display());
        }
        Ok(added)
    }

    /// Drop every line whose name matches one of `names`.
    ///
    /// Does nothing when the file does not exist. Returns the number of
    /// lines removed.
    pub fn remove<S: AsRef<str>>(&self, names: &[S]) -> Result<usize, RegistryError> {
        if !self.path.exists() {
            return Ok(0);
        }

        let targets: Vec<String> = names.iter().map(|n| identity(n.as_ref())).collect();
        let mut file = self.read()?;
        let before = file.lines.len();
        file.lines
            .retain(|line| !targets.contains(&identity(line)) || line.trim().is_empty());
        let removed = before - file.lines.len();

        if removed > 0 {
            self.write(&file)?;
            info!("Removed {} plugin(s) from {}", removed, self.path.display());
        }
        Ok(removed)
    }
}
