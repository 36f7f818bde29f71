//! BSArch binary integration.
//!
//! Every operation runs under an explicit timeout. Nonzero exits are turned
//! into [`ToolError::Failed`] with a best-effort category and the raw output;
//! nothing is retried because the disk may already have been modified.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::{parse_listing, ArchiveListing, ArchiveTool};
use crate::bsa::ArchiveKind;
use crate::error::{ToolError, ToolErrorKind};
use crate::packer::PackerConfig;
use crate::paths::file_name_string;

/// Default timeout for pack and unpack.
pub const DEFAULT_PACK_TIMEOUT: Duration = Duration::from_secs(600);

/// Default timeout for listing.
pub const DEFAULT_LIST_TIMEOUT: Duration = Duration::from_secs(120);

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Executable names searched for next to the running binary and in the working directory.
const BSARCH_NAMES: &[&str] = &["bsarch.exe", "BSArch.exe", "bsarch"];

/// Find the BSArch executable.
///
/// Looks in the following locations:
/// 1. The explicitly configured path
/// 2. Next to the running executable (and its `bin/` folder)
/// 3. The current directory
/// 4. System PATH
pub fn locate_bsarch(configured: Option<&Path>) -> Result<PathBuf, ToolError> {
    if let Some(path) = configured {
        if path.is_file() {
            return Ok(path.to_path_buf());
        }
        return Err(ToolError::NotFound {
            path: path.to_path_buf(),
        });
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            for dir in [exe_dir.to_path_buf(), exe_dir.join("bin")] {
                for name in BSARCH_NAMES {
                    let candidate = dir.join(name);
                    if candidate.is_file() {
                        return Ok(candidate);
                    }
                }
            }
        }
    }

    for name in BSARCH_NAMES {
        let candidate = PathBuf::from(name);
        if candidate.is_file() {
            return Ok(candidate.canonicalize().unwrap_or(candidate));
        }
    }

    for name in ["bsarch", "BSArch"] {
        if let Ok(path) = which::which(name) {
            return Ok(path);
        }
    }

    Err(ToolError::NotFound {
        path: PathBuf::from("bsarch.exe"),
    })
}

/// Process runner for the BSArch command line tool.
#[derive(Debug, Clone)]
pub struct BsArch {
    path: PathBuf,
    multithreaded: bool,
    pack_timeout: Duration,
    list_timeout: Duration,
}

/// Captured result of a finished tool run.
struct ToolOutput {
    status: ExitStatus,
    stdout: String,
    stderr: String,
}

impl BsArch {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            multithreaded: true,
            pack_timeout: DEFAULT_PACK_TIMEOUT,
            list_timeout: DEFAULT_LIST_TIMEOUT,
        }
    }

    /// Resolve the executable once and apply the configured limits.
    pub fn from_config(config: &PackerConfig) -> Result<Self, ToolError> {
        let path = locate_bsarch(config.bsarch_path.as_deref())?;
        info!("Using BSArch: {}", path.display());
        Ok(Self::new(path)
            .with_multithreading(config.multithreaded)
            .with_timeouts(config.pack_timeout, config.list_timeout))
    }

    pub fn with_multithreading(mut self, enabled: bool) -> Self {
        self.multithreaded = enabled;
        self
    }

    pub fn with_timeouts(mut self, pack: Duration, list: Duration) -> Self {
        self.pack_timeout = pack;
        self.list_timeout = list;
        self
    }

    /// Run the tool and fail on nonzero exit.
    fn run(
        &self,
        args: &[String],
        operation: &str,
        archive_name: &str,
        timeout: Duration,
        cwd: Option<&Path>,
    ) -> Result<ToolOutput, ToolError> {
        debug!("Running: bsarch {}", args.join(" "));

        let mut cmd = Command::new(&self.path);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            const CREATE_NO_WINDOW: u32 = 0x0800_0000;
            cmd.creation_flags(CREATE_NO_WINDOW);
        }

        let child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ToolError::NotFound {
                    path: self.path.clone(),
                }
            } else {
                ToolError::Spawn {
                    operation: operation.to_string(),
                    archive: archive_name.to_string(),
                    source: e,
                }
            }
        })?;

        let output = wait_with_timeout(child, timeout).map_err(|e| match e {
            WaitError::TimedOut => ToolError::Timeout {
                operation: operation.to_string(),
                archive: archive_name.to_string(),
                seconds: timeout.as_secs(),
            },
            WaitError::Io(source) => ToolError::Spawn {
                operation: operation.to_string(),
                archive: archive_name.to_string(),
                source,
            },
        })?;

        if !output.status.success() {
            let kind = ToolErrorKind::classify(&output.stdout, &output.stderr);
            warn!(
                "BSArch {} failed for {} (exit {:?}, {:?})",
                operation,
                archive_name,
                output.status.code(),
                kind
            );
            return Err(ToolError::Failed {
                operation: operation.to_string(),
                archive: archive_name.to_string(),
                exit_code: output.status.code(),
                kind,
                stdout: output.stdout,
                stderr: output.stderr,
            });
        }

        Ok(output)
    }

    fn mt_flag(&self, args: &mut Vec<String>) {
        if self.multithreaded {
            args.push("-mt".to_string());
        }
    }
}

impl ArchiveTool for BsArch {
    fn unpack(&self, archive: &Path, dest: &Path) -> Result<(), ToolError> {
        let mut args = vec![
            "unpack".to_string(),
            archive.to_string_lossy().to_string(),
            dest.to_string_lossy().to_string(),
        ];
        self.mt_flag(&mut args);
        self.run(
            &args,
            "unpack",
            &file_name_string(archive),
            self.pack_timeout,
            None,
        )?;
        Ok(())
    }

    fn pack(
        &self,
        source_dir: &Path,
        archive: &Path,
        kind: ArchiveKind,
        compressed: bool,
    ) -> Result<(), ToolError> {
        // BSArch keeps relative path components, so pack "." from inside the source
        let target = if archive.is_absolute() {
            archive.to_path_buf()
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(archive))
                .unwrap_or_else(|_| archive.to_path_buf())
        };

        let mut args = vec![
            "pack".to_string(),
            ".".to_string(),
            target.to_string_lossy().to_string(),
            kind.bsarch_flag().to_string(),
        ];
        // -fo4dds requires -z
        if compressed || kind == ArchiveKind::Texture {
            args.push("-z".to_string());
        }
        self.mt_flag(&mut args);

        self.run(
            &args,
            "pack",
            &file_name_string(archive),
            self.pack_timeout,
            Some(source_dir),
        )?;
        Ok(())
    }

    fn list(&self, archive: &Path) -> Result<ArchiveListing, ToolError> {
        let args = vec![archive.to_string_lossy().to_string(), "-list".to_string()];
        let output = self.run(
            &args,
            "list",
            &file_name_string(archive),
            self.list_timeout,
            None,
        )?;
        Ok(parse_listing(&output.stdout))
    }
}

enum WaitError {
    TimedOut,
    Io(std::io::Error),
}

/// Wait for `child`, draining both pipes on helper threads so a chatty tool
/// cannot block on a full pipe. Kills the child on timeout.
fn wait_with_timeout(mut child: Child, timeout: Duration) -> Result<ToolOutput, WaitError> {
    let stdout_reader = child.stdout.take().map(spawn_reader);
    let stderr_reader = child.stderr.take().map(spawn_reader);

    let started = Instant::now();
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if started.elapsed() >= timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(WaitError::TimedOut);
                }
                thread::sleep(POLL_INTERVAL);
            }
            Err(e) => {
                let _ = child.kill();
                return Err(WaitError::Io(e));
            }
        }
    };

    let stdout = stdout_reader
        .and_then(|h| h.join().ok())
        .unwrap_or_default();
    let stderr = stderr_reader
        .and_then(|h| h.join().ok())
        .unwrap_or_default();

    Ok(ToolOutput {
        status,
        stdout,
        stderr,
    })
}

fn spawn_reader<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).to_string()
    })
}
