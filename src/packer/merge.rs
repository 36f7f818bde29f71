//! Merge pipeline
//!
//! Consumes every complete CC item's archive pair and produces:
//! - `CCPacked_Sounds - Main.ba2` (uncompressed, only if sounds exist)
//! - `CCPacked_Main - Main.ba2` (compressed, only if general files remain)
//! - `CCPacked_Main_Textures<N> - Textures.ba2` (compressed DX10, size-split)
//!
//! plus one `.esl` stub per archive.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{error, info, warn};

use super::{remove_prefixed_files, MergeStage, PackerConfig, RestoreOrchestrator};
use crate::archive::ArchiveTool;
use crate::backup::{BackupManager, BackupSnapshot};
use crate::bsa::{verify_archive, ArchiveHeader, ArchiveKind};
use crate::content::classify::move_file;
use crate::content::{
    absorb_tree, check_integrity, classify_tree, count_files, relocate_strings, separate_sounds,
    split_textures, ContentItem, IntegrityReport,
};
use crate::error::{io_err, IntegrityError, PackError};
use crate::paths::{file_name_string, has_any_prefix, DataLayout};
use crate::plugin::PluginStubBuilder;

/// What a successful merge produced.
#[derive(Debug, Clone, Default)]
pub struct MergeSummary {
    /// Archive file names created in Data.
    pub archives_created: Vec<String>,
    /// Number of source archives consumed.
    pub source_archives: usize,
    /// Plugin stub file names created in Data.
    pub stubs_created: Vec<String>,
    /// Strings files relocated to `Data/Strings`.
    pub strings_relocated: usize,
    /// Incomplete items left untouched.
    pub orphaned_skipped: Vec<String>,
    /// Snapshot holding the consumed archives.
    pub snapshot: PathBuf,
}

/// A source archive and the staging tree its content belongs in.
#[derive(Debug, Clone)]
struct SourceArchive {
    path: PathBuf,
    role: ArchiveKind,
}

/// Drives one merge from validation to cleanup.
pub struct MergeOrchestrator<'a> {
    config: &'a PackerConfig,
    tool: &'a dyn ArchiveTool,
    layout: DataLayout,
    stubs: PluginStubBuilder,
    restore_first: bool,
    stage: MergeStage,
    failed_at: Option<MergeStage>,
    stage_started: Instant,
}

impl<'a> MergeOrchestrator<'a> {
    pub fn new(config: &'a PackerConfig, tool: &'a dyn ArchiveTool) -> Self {
        Self {
            config,
            tool,
            layout: config.layout(),
            stubs: PluginStubBuilder::new(&config.stub_creator, &config.stub_summary),
            restore_first: false,
            stage: MergeStage::Validating,
            failed_at: None,
            stage_started: Instant::now(),
        }
    }

    /// When merged archives already exist next to new CC items, restore the
    /// newest snapshot first and repack everything together. Without this
    /// such a merge is refused.
    pub fn with_restore_first(mut self, enabled: bool) -> Self {
        self.restore_first = enabled;
        self
    }

    /// Current stage; `Done` or `Failed` once `run` returns.
    pub fn stage(&self) -> MergeStage {
        self.stage
    }

    /// Stage that was running when the merge failed.
    pub fn failed_at(&self) -> Option<MergeStage> {
        self.failed_at
    }

    fn enter(&mut self, stage: MergeStage, progress: &dyn Fn(&str)) {
        info!(
            "Stage done: stage='{}' elapsed_ms={}",
            self.stage,
            self.stage_started.elapsed().as_millis()
        );
        self.stage = stage;
        self.stage_started = Instant::now();
        progress(&format!("=== {} ===", stage));
    }

    /// Run the full merge.
    pub fn run(&mut self, progress: &dyn Fn(&str)) -> Result<MergeSummary, PackError> {
        self.stage = MergeStage::Validating;
        self.failed_at = None;
        self.stage_started = Instant::now();
        progress(&format!("=== {} ===", self.stage));

        match self.execute(progress) {
            Ok(summary) => {
                self.enter(MergeStage::Done, progress);
                Ok(summary)
            }
            Err(e) => {
                error!("Merge failed during {}: {}", self.stage, e);
                self.failed_at = Some(self.stage);
                self.stage = MergeStage::Failed;
                Err(e)
            }
        }
    }

    fn execute(&mut self, progress: &dyn Fn(&str)) -> Result<MergeSummary, PackError> {
        let mut summary = MergeSummary::default();
        let data_dir = self.layout.data_dir.clone();

        // === Validating ===
        let (sources, orphaned) = self.validate(progress)?;
        summary.orphaned_skipped = orphaned;
        summary.source_archives = sources.len();

        // === Backing up ===
        self.enter(MergeStage::BackingUp, progress);
        let backup = BackupManager::new(&self.layout.backup_dir);
        let source_paths: Vec<PathBuf> = sources.iter().map(|s| s.path.clone()).collect();
        progress(&format!("Backing up {} archive(s)...", source_paths.len()));
        let snapshot = backup.snapshot(&source_paths)?;
        progress(&format!("Backup created: {}", snapshot.path.display()));
        summary.snapshot = snapshot.path.clone();

        self.sweep_previous_outputs(progress)?;

        // === Extracting ===
        self.enter(MergeStage::Extracting, progress);
        self.prepare_staging()?;
        let total = sources.len();
        for (i, source) in sources.iter().enumerate() {
            progress(&format!(
                "Extracting [{}/{}]: {}",
                i + 1,
                total,
                file_name_string(&source.path)
            ));
            self.extract_verified(source, progress)?;
        }

        // === Classifying ===
        self.enter(MergeStage::Classifying, progress);
        let general_dir = self.layout.general_dir();
        let relocated = relocate_strings(&general_dir, &self.layout.strings_dir, progress)?;
        if relocated.is_empty() {
            progress("Warning: No STRINGS files found in extracted content.");
        } else {
            backup.append_manifest(&snapshot, &relocated)?;
            progress(&format!(
                "Moved {} string files to Data/Strings",
                relocated.len()
            ));
        }
        summary.strings_relocated = relocated.len();

        let sounds = separate_sounds(&general_dir, &self.layout.sounds_dir())?;
        progress(&format!("Separated {} sound file(s)", sounds));

        // === Repacking ===
        self.enter(MergeStage::Repacking, progress);
        self.repack(sounds, &mut summary, progress)?;

        // === Registering plugins ===
        self.enter(MergeStage::RegisteringPlugins, progress);
        self.register_plugins(&summary.stubs_created, progress);

        // === Cleaning up ===
        self.enter(MergeStage::CleaningUp, progress);
        self.cleanup(&source_paths, &snapshot, progress);

        progress(&format!(
            "Summary: Created {} archives from {} CC files.",
            summary.archives_created.len(),
            summary.source_archives
        ));
        info!(
            "Merge complete: {} archives, {} stubs, {} sources, data={}",
            summary.archives_created.len(),
            summary.stubs_created.len(),
            summary.source_archives,
            data_dir.display()
        );
        Ok(summary)
    }

    /// Integrity check. Returns the source archives (all main archives
    /// first, then all texture archives) and the orphaned item names.
    fn validate(
        &self,
        progress: &dyn Fn(&str),
    ) -> Result<(Vec<SourceArchive>, Vec<String>), PackError> {
        let data_dir = &self.layout.data_dir;
        if !data_dir.is_dir() {
            return Err(PackError::DataDirMissing(data_dir.clone()));
        }

        let mut report = self.scan(progress)?;
        let merged = self.merged_archive_count()?;

        if report.valid.is_empty() {
            return Err(IntegrityError::NoContent {
                previously_merged: merged > 0,
                orphaned: report.orphaned.len(),
            }
            .into());
        }

        // Existing outputs hold items whose sources live only in an older
        // snapshot; replacing them would lose those items.
        if merged > 0 {
            if !self.restore_first {
                return Err(IntegrityError::MixedState {
                    merged,
                    new_items: report.valid.len(),
                }
                .into());
            }
            progress("Restoring the previous merge so all items are repacked together...");
            RestoreOrchestrator::new(self.config).run(progress)?;
            report = self.scan(progress)?;
            if report.valid.is_empty() {
                return Err(IntegrityError::NoContent {
                    previously_merged: false,
                    orphaned: report.orphaned.len(),
                }
                .into());
            }
        }

        progress(&format!(
            "Found {} complete Creation Club item(s) ready to merge.",
            report.valid.len()
        ));

        let mut mains = Vec::new();
        let mut textures = Vec::new();
        for base_name in &report.valid {
            let (main, texture) = ContentItem::locate(data_dir, base_name).archives()?;
            mains.push(SourceArchive {
                path: main,
                role: ArchiveKind::General,
            });
            textures.push(SourceArchive {
                path: texture,
                role: ArchiveKind::Texture,
            });
        }
        mains.extend(textures);

        Ok((mains, report.orphaned))
    }

    fn scan(&self, progress: &dyn Fn(&str)) -> Result<IntegrityReport, PackError> {
        let data_dir = &self.layout.data_dir;
        progress("Validating CC content integrity...");
        let report = check_integrity(data_dir, progress).map_err(io_err("scan", data_dir))?;

        if !report.orphaned.is_empty() {
            warn!("Skipping {} incomplete CC item(s)", report.orphaned.len());
            progress(&format!(
                "Warning: Skipping {} incomplete CC item(s).",
                report.orphaned.len()
            ));
        }
        Ok(report)
    }

    /// Archives in Data carrying a current or legacy merged prefix.
    fn merged_archive_count(&self) -> Result<usize, PackError> {
        let prefixes = self.config.merged_prefixes();
        let data_dir = &self.layout.data_dir;
        let mut count = 0;
        for entry in fs::read_dir(data_dir).map_err(io_err("read", data_dir))? {
            let name = entry
                .map_err(io_err("read", data_dir))?
                .file_name()
                .to_string_lossy()
                .to_string();
            if has_any_prefix(&name, &prefixes) && name.to_ascii_lowercase().ends_with(".ba2") {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Remove outputs of earlier merges so no stale texture set survives.
    fn sweep_previous_outputs(&self, progress: &dyn Fn(&str)) -> Result<(), PackError> {
        let prefixes = self.config.merged_prefixes();

        let data_sweep = remove_prefixed_files(&self.layout.data_dir, &prefixes, progress)?;
        let strings_sweep = remove_prefixed_files(&self.layout.strings_dir, &prefixes, progress)?;
        let removed = data_sweep.removed.len() + strings_sweep.removed.len();
        if removed == 0 {
            return Ok(());
        }

        progress(&format!(
            "Removed {} file(s) from a previous merge",
            removed
        ));
        let old_plugins = data_sweep.plugin_names();
        if let Some(registry) = self.config.registry() {
            if let Err(e) = registry.remove(&old_plugins) {
                warn!("Failed to update plugins.txt: {}", e);
                progress(&format!("Warning: {}", e));
            }
        }
        Ok(())
    }

    /// Recreate `CC_Temp` with empty General and Textures trees.
    fn prepare_staging(&self) -> Result<(), PackError> {
        let temp = &self.layout.temp_dir;
        if temp.exists() {
            fs::remove_dir_all(temp).map_err(io_err("remove", temp))?;
        }
        for dir in [self.layout.general_dir(), self.layout.textures_dir()] {
            fs::create_dir_all(&dir).map_err(io_err("create", &dir))?;
        }
        Ok(())
    }

    /// Unpack one archive into the scratch directory, check the extracted
    /// file count against the header, then move the files into staging.
    fn extract_verified(
        &self,
        source: &SourceArchive,
        progress: &dyn Fn(&str),
    ) -> Result<(), PackError> {
        let name = file_name_string(&source.path);

        let header = match ArchiveHeader::read_from(&source.path) {
            Ok(header) => Some(header),
            Err(e) => {
                warn!("Could not read archive header: {}", e);
                progress(&format!("  Warning: Could not read archive header: {}", e));
                None
            }
        };

        let scratch = self.layout.unpack_dir();
        if scratch.exists() {
            fs::remove_dir_all(&scratch).map_err(io_err("remove", &scratch))?;
        }
        fs::create_dir_all(&scratch).map_err(io_err("create", &scratch))?;

        self.tool.unpack(&source.path, &scratch)?;
        let extracted = count_files(&scratch);

        match header {
            Some(h) if h.file_count == 0 => {
                warn!("Archive reports 0 files: {}", name);
                progress(&format!("  Warning: Archive reports 0 files: {}", name));
            }
            Some(h) if h.file_count as usize != extracted => {
                return Err(PackError::Verification {
                    archive: name,
                    reason: format!(
                        "header declares {} files but {} were extracted",
                        h.file_count, extracted
                    ),
                });
            }
            None if extracted == 0 => {
                return Err(PackError::Verification {
                    archive: name.clone(),
                    reason: format!("No files extracted from {}", name),
                });
            }
            _ => {}
        }

        let kind = header.map(|h| h.kind).unwrap_or(source.role);
        let target = match kind {
            ArchiveKind::General => self.layout.general_dir(),
            ArchiveKind::Texture => self.layout.textures_dir(),
        };
        absorb_tree(&scratch, &target)?;
        progress(&format!("  ✓ Verified: {} ({} files)", name, extracted));
        Ok(())
    }

    fn repack(
        &self,
        sounds: usize,
        summary: &mut MergeSummary,
        progress: &dyn Fn(&str),
    ) -> Result<(), PackError> {
        if sounds > 0 {
            let base = self.config.sounds_name();
            progress("Repacking Sounds Archive (Uncompressed)...");
            self.pack_with_stub(
                &self.layout.sounds_dir(),
                &base,
                &self.layout.main_archive(&base),
                ArchiveKind::General,
                false,
                summary,
                progress,
            )?;
        }

        let general_dir = self.layout.general_dir();
        if count_files(&general_dir) > 0 {
            let base = self.config.main_name();
            progress("Repacking Main Archive (Compressed)...");
            self.pack_with_stub(
                &general_dir,
                &base,
                &self.layout.main_archive(&base),
                ArchiveKind::General,
                true,
                summary,
                progress,
            )?;
        }

        let textures_dir = self.layout.textures_dir();
        let textures: Vec<(PathBuf, u64)> = classify_tree(&textures_dir, ArchiveKind::Texture)
            .map_err(io_err("scan", &textures_dir))?
            .into_iter()
            .map(|asset| (asset.path, asset.size))
            .collect();
        let groups = split_textures(&textures, self.config.texture_split_bytes);

        for (idx, group) in groups.iter().enumerate() {
            let number = idx + 1;
            let base = self.config.textures_name(number);
            let archive = self.layout.texture_archive(&base);
            progress(&format!(
                "Repacking Textures {}/{}: {}",
                number,
                groups.len(),
                file_name_string(&archive)
            ));

            let split_dir = self.layout.split_dir(number);
            for rel in &group.items {
                let src = textures_dir.join(rel);
                move_file(&src, &split_dir.join(rel)).map_err(io_err("move", &src))?;
            }

            self.pack_with_stub(
                &split_dir,
                &base,
                &archive,
                ArchiveKind::Texture,
                true,
                summary,
                progress,
            )?;
        }

        Ok(())
    }

    /// Pack one output archive, check its header and write its stub.
    #[allow(clippy::too_many_arguments)]
    fn pack_with_stub(
        &self,
        source_dir: &Path,
        base_name: &str,
        archive: &Path,
        kind: ArchiveKind,
        compressed: bool,
        summary: &mut MergeSummary,
        progress: &dyn Fn(&str),
    ) -> Result<(), PackError> {
        self.tool.pack(source_dir, archive, kind, compressed)?;

        let (header, report) = verify_archive(archive)?;
        if header.kind != kind {
            return Err(PackError::Verification {
                archive: file_name_string(archive),
                reason: format!("expected {} archive, got {}", kind.tag_str(), header.kind.tag_str()),
            });
        }
        progress(&format!("  ✓ {}", report));
        summary.archives_created.push(file_name_string(archive));

        let stub_name = format!("{}.esl", base_name);
        self.stubs
            .write_to(&self.layout.data_dir.join(&stub_name))?;
        progress(&format!("  Created {}", stub_name));
        summary.stubs_created.push(stub_name);
        Ok(())
    }

    /// Best-effort; load order problems never fail the merge.
    fn register_plugins(&self, stubs: &[String], progress: &dyn Fn(&str)) {
        let Some(registry) = self.config.registry() else {
            progress("plugins.txt location unknown, skipping load order update");
            return;
        };
        progress("Enabling plugins...");
        match registry.add(stubs) {
            Ok(added) => info!("Registered {} plugin(s)", added),
            Err(e) => {
                warn!("Failed to update plugins.txt: {}", e);
                progress(&format!("Warning: {}", e));
            }
        }
    }

    fn cleanup(&self, sources: &[PathBuf], snapshot: &BackupSnapshot, progress: &dyn Fn(&str)) {
        progress("Cleaning up original CC BA2 files...");
        for file in sources {
            if let Err(e) = fs::remove_file(file) {
                warn!("Could not delete {}: {}", file.display(), e);
                progress(&format!(
                    "Warning: Could not delete {}: {}",
                    file_name_string(file),
                    e
                ));
            }
        }

        if let Err(e) = fs::remove_dir_all(&self.layout.temp_dir) {
            warn!("Could not clean up temp directory: {}", e);
            progress(&format!("Warning: Could not clean up temp directory: {}", e));
        }
        info!("Originals kept in {}", snapshot.path.display());
    }
}
