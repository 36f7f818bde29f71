//! ccpack - Creation Club archive packer for Fallout 4
//!
//! Merges the per-item Creation Club archives into a few large ones and
//! restores the originals on request.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use ccpack::archive::{ArchiveTool, BsArch};
use ccpack::bsa::{read_contents, verify_archive};
use ccpack::content::{check_integrity, delete_orphans};
use ccpack::error::{IntegrityError, PackError};
use ccpack::packer::{scan_status, MergeOrchestrator, PackerConfig, RestoreOrchestrator};
use ccpack::settings::Settings;

#[derive(Parser)]
#[command(name = "ccpack")]
#[command(version)]
#[command(about = "Merge Fallout 4 Creation Club archives, with full backup and restore")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging (use RUST_LOG=debug for more detail)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit log lines as JSON
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Args, Clone)]
struct GameArgs {
    /// Fallout 4 installation directory (contains Data)
    #[arg(short, long, env = "CCPACK_GAME_DIR")]
    game: Option<PathBuf>,

    /// Path to plugins.txt (default: %LOCALAPPDATA%/Fallout4/plugins.txt)
    #[arg(long, env = "CCPACK_PLUGINS_TXT")]
    plugins_txt: Option<PathBuf>,
}

#[derive(Args, Clone)]
struct ToolArgs {
    /// BSArch executable (default: search next to ccpack, then PATH)
    #[arg(long, env = "CCPACK_BSARCH")]
    bsarch: Option<PathBuf>,

    /// Run BSArch without -mt
    #[arg(long)]
    single_threaded: bool,

    /// Pack/unpack timeout in seconds
    #[arg(long)]
    pack_timeout: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge all complete Creation Club items into CCPacked archives
    Merge {
        #[command(flatten)]
        game: GameArgs,

        #[command(flatten)]
        tool: ToolArgs,

        /// Maximum uncompressed size of one texture archive, in GiB
        #[arg(long)]
        split_gib: Option<f64>,

        /// Delete incomplete CC items before merging
        #[arg(long)]
        delete_orphans: bool,

        /// If merged archives already exist, restore them first and repack everything
        #[arg(long)]
        restore_first: bool,
    },

    /// Restore the original archives from the newest backup
    Restore {
        #[command(flatten)]
        game: GameArgs,
    },

    /// Show merged and unmerged archives and available backups
    Status {
        #[command(flatten)]
        game: GameArgs,
    },

    /// Validate BA2 headers (optionally cross-check with BSArch)
    Verify {
        /// Archives to check
        #[arg(required = true)]
        archives: Vec<PathBuf>,

        /// Also list each archive with BSArch and compare file counts
        #[arg(long)]
        with_tool: bool,

        #[command(flatten)]
        tool: ToolArgs,
    },

    /// Report incomplete CC items, optionally deleting them
    Orphans {
        #[command(flatten)]
        game: GameArgs,

        /// Delete every file of each orphaned item
        #[arg(long)]
        delete: bool,
    },

    /// Store default paths in the settings file
    Config {
        /// Fallout 4 installation directory
        #[arg(long)]
        game: Option<PathBuf>,

        /// BSArch executable
        #[arg(long)]
        bsarch: Option<PathBuf>,

        /// Path to plugins.txt
        #[arg(long)]
        plugins_txt: Option<PathBuf>,

        /// Texture archive size limit in GiB
        #[arg(long)]
        split_gib: Option<f64>,

        /// Run BSArch without -mt by default
        #[arg(long)]
        single_threaded: Option<bool>,
    },

    /// List files inside a BA2 archive
    Inspect {
        /// Path to the BA2 file
        archive: PathBuf,

        /// Print every file instead of a per-folder summary
        #[arg(long)]
        files: bool,
    },
}

fn init_logging(verbose: bool, json: bool) -> Result<()> {
    let filter = EnvFilter::from_default_env().add_directive(if verbose {
        "ccpack=debug".parse()?
    } else {
        "ccpack=warn".parse()?
    });
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

fn spinner() -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {wide_msg}")?);
    pb.enable_steady_tick(Duration::from_millis(100));
    Ok(pb)
}

/// Stage banners and warnings stay on screen, everything else updates the spinner.
fn report(pb: &ProgressBar, msg: &str) {
    let line = msg.trim_start();
    if line.starts_with("===") || line.starts_with("Warning") || line.starts_with('✗') {
        pb.println(msg);
    } else {
        pb.set_message(line.to_string());
    }
}

fn build_config(game: &GameArgs, settings: &Settings) -> Result<PackerConfig> {
    let Some(game_dir) = game.game.clone().or_else(|| settings.game_dir()) else {
        bail!("No game directory given (use --game or set game_dir in {:?})", Settings::settings_path().ok());
    };

    let mut config = PackerConfig::new(game_dir);
    settings.apply(&mut config);
    if let Some(path) = &game.plugins_txt {
        config.plugins_txt = Some(path.clone());
    }
    Ok(config)
}

fn apply_tool_args(config: &mut PackerConfig, tool: &ToolArgs) {
    if let Some(path) = &tool.bsarch {
        config.bsarch_path = Some(path.clone());
    }
    if tool.single_threaded {
        config.multithreaded = false;
    }
    if let Some(secs) = tool.pack_timeout {
        config.pack_timeout = Duration::from_secs(secs);
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_json)?;
    let settings = Settings::load();

    match cli.command {
        Commands::Merge {
            game,
            tool,
            split_gib,
            delete_orphans: remove_orphans,
            restore_first,
        } => {
            let mut config = build_config(&game, &settings)?;
            apply_tool_args(&mut config, &tool);
            if let Some(gib) = split_gib {
                if gib <= 0.0 {
                    bail!("--split-gib must be greater than zero");
                }
                config.texture_split_bytes = (gib * 1024.0 * 1024.0 * 1024.0) as u64;
            }
            config.validate()?;

            let data_dir = config.layout().data_dir;
            if remove_orphans {
                let report = check_integrity(&data_dir, &|msg| println!("{}", msg))
                    .with_context(|| format!("Failed to scan {}", data_dir.display()))?;
                if !report.orphaned.is_empty() {
                    let cleanup = delete_orphans(&data_dir, &report.orphaned, &|msg| println!("{}", msg));
                    println!("Deleted {} orphaned file(s)", cleanup.deleted);
                    if !cleanup.is_complete() {
                        bail!("Could not delete orphaned files:\n{}", cleanup.failures.join("\n"));
                    }
                }
            }

            let bsarch = BsArch::from_config(&config)?;
            let pb = spinner()?;
            let mut merge = MergeOrchestrator::new(&config, &bsarch).with_restore_first(restore_first);
            let result = merge.run(&|msg| report(&pb, msg));
            pb.finish_and_clear();
            let summary = match result {
                Err(e @ PackError::Integrity(IntegrityError::MixedState { .. })) => {
                    bail!("{}\nRun `ccpack merge --restore-first` to repack all items.", e)
                }
                other => other?,
            };

            println!("\n=== Merge Complete ===");
            println!("Archives created:  {}", summary.archives_created.len());
            for name in &summary.archives_created {
                println!("  {}", name);
            }
            println!("Source archives:   {}", summary.source_archives);
            println!("Plugins created:   {}", summary.stubs_created.len());
            println!("Strings relocated: {}", summary.strings_relocated);
            if !summary.orphaned_skipped.is_empty() {
                println!("Skipped (incomplete): {}", summary.orphaned_skipped.join(", "));
            }
            println!("Backup:            {}", summary.snapshot.display());
        }

        Commands::Restore { game } => {
            let config = build_config(&game, &settings)?;
            config.validate()?;

            let pb = spinner()?;
            let result = RestoreOrchestrator::new(&config).run(&|msg| report(&pb, msg));
            pb.finish_and_clear();
            let summary = result?;

            println!("=== Restore Complete ===");
            println!("Backup used:       {}", summary.snapshot.display());
            println!("Files restored:    {}", summary.files_restored);
            println!("Merged removed:    {}", summary.merged_removed);
            println!("Plugins removed:   {}", summary.registry_removed);
            println!("Old backups:       {} removed", summary.snapshots_pruned);
        }

        Commands::Status { game } => {
            let config = build_config(&game, &settings)?;
            config.validate()?;

            let status = scan_status(&config.layout(), &config.merged_prefixes())?;
            println!("=== CC Archive Status ===");
            println!("Merged archives:   {}", status.merged.len());
            for name in &status.merged {
                println!("  {}", name);
            }
            println!("Unmerged archives: {}", status.unmerged.len());
            for name in &status.unmerged {
                println!("  {}", name);
            }
            println!("Backups:           {}", status.backup_count);
            if status.all_merged() {
                println!("\nAll CC content is merged.");
            } else if status.is_mixed() {
                println!("\nNew CC content found since the last merge. Run `ccpack merge` to include it.");
            }
        }

        Commands::Verify {
            archives,
            with_tool,
            tool,
        } => {
            let bsarch = if with_tool {
                let mut config = PackerConfig::new(PathBuf::new());
                settings.apply(&mut config);
                apply_tool_args(&mut config, &tool);
                Some(BsArch::from_config(&config)?)
            } else {
                None
            };

            let mut failures = 0;
            for path in &archives {
                if !verify_one(path, bsarch.as_ref()) {
                    failures += 1;
                }
            }
            if failures > 0 {
                bail!("{} of {} archive(s) failed verification", failures, archives.len());
            }
        }

        Commands::Orphans { game, delete } => {
            let config = build_config(&game, &settings)?;
            config.validate()?;
            let data_dir = config.layout().data_dir;

            let report = check_integrity(&data_dir, &|msg| println!("{}", msg))
                .with_context(|| format!("Failed to scan {}", data_dir.display()))?;
            println!(
                "\n{} complete, {} incomplete",
                report.valid.len(),
                report.orphaned.len()
            );

            if delete && !report.orphaned.is_empty() {
                let cleanup = delete_orphans(&data_dir, &report.orphaned, &|msg| println!("{}", msg));
                println!("Deleted {} file(s)", cleanup.deleted);
                if !cleanup.is_complete() {
                    bail!("Some files could not be deleted:\n{}", cleanup.failures.join("\n"));
                }
            }
        }

        Commands::Config {
            game,
            bsarch,
            plugins_txt,
            split_gib,
            single_threaded,
        } => {
            let mut updated = settings.clone();
            if let Some(path) = game {
                updated.game_dir = path.to_string_lossy().to_string();
            }
            if let Some(path) = bsarch {
                updated.bsarch_path = path.to_string_lossy().to_string();
            }
            if let Some(path) = plugins_txt {
                updated.plugins_txt = path.to_string_lossy().to_string();
            }
            if let Some(gib) = split_gib {
                if gib <= 0.0 {
                    bail!("--split-gib must be greater than zero");
                }
                updated.texture_split_gib = Some(gib);
            }
            if let Some(flag) = single_threaded {
                updated.single_threaded = flag;
            }

            if updated != settings {
                updated.save()?;
            }
            println!("Settings file: {}", Settings::settings_path()?.display());
            println!("{}", serde_json::to_string_pretty(&updated)?);
        }

        Commands::Inspect { archive, files } => {
            let contents = read_contents(&archive)?;
            if files {
                for entry in &contents.entries {
                    println!("{}", entry.path);
                }
            } else {
                for (folder, count) in contents.by_top_level() {
                    let folder = if folder.is_empty() { "(root)" } else { folder.as_str() };
                    println!("{:<24} {:>6} files", folder, count);
                }
            }
            eprintln!(
                "\nTotal: {} files, {:.1} MB ({})",
                contents.entries.len(),
                contents.total_size() as f64 / (1024.0 * 1024.0),
                contents.kind.tag_str()
            );
        }
    }

    Ok(())
}

/// Print the verification line for one archive. Returns false on failure.
fn verify_one(path: &Path, bsarch: Option<&BsArch>) -> bool {
    let (header, report) = match verify_archive(path) {
        Ok(result) => result,
        Err(e) => {
            println!("✗ {}", e);
            return false;
        }
    };

    let Some(tool) = bsarch else {
        println!("✓ Verified: {}", report);
        return true;
    };

    match tool.list(path) {
        Ok(listing) => match listing.declared_files {
            Some(n) if n != header.file_count as usize => {
                println!(
                    "✗ {}: header declares {} files, BSArch reports {}",
                    report, header.file_count, n
                );
                false
            }
            _ => {
                println!("✓ Verified: {}", report);
                true
            }
        },
        Err(e) => {
            println!("  Note: Could not list archive contents: {}", e);
            println!("✓ Verified: {}", report);
            true
        }
    }
}
