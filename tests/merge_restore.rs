mod common;

use std::fs;

use ccpack::backup::{BackupManager, MANIFEST_NAME};
use ccpack::bsa::{ArchiveKind, HEADER_LEN};
use ccpack::error::{BackupError, IntegrityError, PackError, ToolErrorKind};
use ccpack::packer::{scan_status, MergeOrchestrator, MergeStage, RestoreOrchestrator};
use ccpack::plugin::PluginStubBuilder;

use common::{read_kind, read_payload, write_archive_with_count, FakeTool, Game, PackCall, Payload, Progress};

const PIPBOY: &str = "ccBGSFO4001-PipBoy(Black)";
const GRENADE: &str = "ccSBJFO4003-Grenade";
const HALLOWEEN: &str = "ccFSVFO4007-Halloween";

/// Two items: sounds, strings, general files and three textures of 30/40/30 bytes.
fn two_item_game() -> Game {
    let mut game = Game::new();
    game.config.texture_split_bytes = 70;
    game.add_item(
        PIPBOY,
        &[
            ("meshes/pipboy.nif", b"mesh-a"),
            ("sound/fx/click.xwm", b"snd"),
            ("strings/ccbgsfo4001-pipboy(black)_en.strings", b"str-a"),
        ],
        &[("textures/a.dds", &[1u8; 30])],
    );
    game.add_item(
        GRENADE,
        &[("scripts/grenade.pex", b"pex")],
        &[("textures/b.dds", &[2u8; 40]), ("textures/c.dds", &[3u8; 30])],
    );
    fs::write(game.data().join("Strings").join("Fallout4_en.strings"), b"vanilla").unwrap();
    game
}

fn keys(payload: &Payload) -> Vec<&str> {
    payload.keys().map(|k| k.as_str()).collect()
}

#[test]
fn merge_produces_split_outputs() {
    let game = two_item_game();
    let tool = FakeTool::default();
    let progress = Progress::default();

    let mut merge = MergeOrchestrator::new(&game.config, &tool);
    let summary = merge.run(&|m| progress.push(m)).unwrap();
    assert_eq!(merge.stage(), MergeStage::Done);

    let data = game.data();
    assert_eq!(
        summary.archives_created,
        vec![
            "CCPacked_Sounds - Main.ba2",
            "CCPacked_Main - Main.ba2",
            "CCPacked_Main_Textures1 - Textures.ba2",
            "CCPacked_Main_Textures2 - Textures.ba2",
        ]
    );
    assert_eq!(summary.source_archives, 4);
    assert_eq!(summary.strings_relocated, 1);
    assert!(summary.orphaned_skipped.is_empty());

    // Pack calls: sounds uncompressed, the rest compressed
    assert_eq!(
        tool.packed.borrow()[0],
        PackCall {
            archive: "CCPacked_Sounds - Main.ba2".to_string(),
            kind: ArchiveKind::General,
            compressed: false,
        }
    );
    assert!(tool.packed.borrow()[1..].iter().all(|c| c.compressed));

    // Main archives are unpacked before texture archives
    let unpacked = tool.unpacked.borrow();
    assert!(unpacked[0].ends_with(" - Main.ba2") && unpacked[1].ends_with(" - Main.ba2"));
    assert!(unpacked[2].ends_with(" - Textures.ba2") && unpacked[3].ends_with(" - Textures.ba2"));

    let sounds = read_payload(&data.join("CCPacked_Sounds - Main.ba2"));
    assert_eq!(keys(&sounds), vec!["sound/fx/click.xwm"]);

    let main = read_payload(&data.join("CCPacked_Main - Main.ba2"));
    assert_eq!(keys(&main), vec!["meshes/pipboy.nif", "scripts/grenade.pex"]);

    let tex1 = data.join("CCPacked_Main_Textures1 - Textures.ba2");
    let tex2 = data.join("CCPacked_Main_Textures2 - Textures.ba2");
    assert_eq!(read_kind(&tex1), ArchiveKind::Texture);
    assert_eq!(keys(&read_payload(&tex1)), vec!["textures/a.dds", "textures/b.dds"]);
    assert_eq!(keys(&read_payload(&tex2)), vec!["textures/c.dds"]);

    // One stub per archive, byte-identical
    let stub = PluginStubBuilder::default().build().unwrap();
    for name in &summary.stubs_created {
        assert_eq!(fs::read(data.join(name)).unwrap(), stub);
    }
    assert_eq!(summary.stubs_created.len(), summary.archives_created.len());

    // Strings relocated loose and recorded
    assert_eq!(
        fs::read(data.join("Strings/ccbgsfo4001-pipboy(black)_en.strings")).unwrap(),
        b"str-a"
    );
    let backup = BackupManager::new(data.join("CC_Backup"));
    let snapshot = backup.latest().unwrap();
    assert_eq!(
        backup.read_manifest(&snapshot).unwrap(),
        vec!["ccbgsfo4001-pipboy(black)_en.strings"]
    );
    assert_eq!(snapshot.files().unwrap().len(), 4);

    // Sources consumed, plugins kept, staging removed
    assert!(!data.join(format!("{} - Main.ba2", PIPBOY)).exists());
    assert!(!data.join(format!("{} - Textures.ba2", GRENADE)).exists());
    assert!(data.join(format!("{}.esl", PIPBOY)).exists());
    assert!(!data.join("CC_Temp").exists());

    let plugins = fs::read_to_string(game.plugins_txt()).unwrap();
    assert_eq!(
        plugins,
        "*Fallout4.esm\r\n*ccBGSFO4001-PipBoy(Black).esl\r\n\
         *CCPacked_Sounds.esl\r\n*CCPacked_Main.esl\r\n\
         *CCPacked_Main_Textures1.esl\r\n*CCPacked_Main_Textures2.esl\r\n"
    );

    assert!(progress.contains("=== Extracting ==="));
    assert!(progress.contains("✓ Verified"));

    let status = scan_status(&game.config.layout(), &game.config.merged_prefixes()).unwrap();
    assert!(status.all_merged());
    assert_eq!(status.backup_count, 1);
}

#[test]
fn merge_then_restore_round_trip() {
    let game = two_item_game();
    let before_files = game.data_files();
    let before_plugins = fs::read(game.plugins_txt()).unwrap();
    let archive = game.data().join(format!("{} - Main.ba2", PIPBOY));
    let before_mtime = fs::metadata(&archive).unwrap().modified().unwrap();

    MergeOrchestrator::new(&game.config, &FakeTool::default())
        .run(&|_| {})
        .unwrap();
    assert_ne!(game.data_files(), before_files);

    let summary = RestoreOrchestrator::new(&game.config).run(&|_| {}).unwrap();
    assert_eq!(summary.files_restored, 4);
    assert_eq!(summary.registry_removed, 4);

    assert_eq!(game.data_files(), before_files);
    assert_eq!(fs::read(game.plugins_txt()).unwrap(), before_plugins);
    assert_eq!(fs::metadata(&archive).unwrap().modified().unwrap(), before_mtime);

    // A second restore changes nothing
    RestoreOrchestrator::new(&game.config).run(&|_| {}).unwrap();
    assert_eq!(game.data_files(), before_files);
}

#[test]
fn restore_keeps_only_latest_snapshot() {
    let game = two_item_game();
    let tool = FakeTool::default();

    MergeOrchestrator::new(&game.config, &tool).run(&|_| {}).unwrap();
    RestoreOrchestrator::new(&game.config).run(&|_| {}).unwrap();
    std::thread::sleep(std::time::Duration::from_millis(20));
    MergeOrchestrator::new(&game.config, &tool).run(&|_| {}).unwrap();

    let backup = BackupManager::new(game.data().join("CC_Backup"));
    assert_eq!(backup.count(), 2);

    let summary = RestoreOrchestrator::new(&game.config).run(&|_| {}).unwrap();
    assert_eq!(summary.snapshots_pruned, 1);
    assert_eq!(backup.count(), 1);
}

#[test]
fn orphaned_items_are_skipped() {
    let game = two_item_game();
    let orphan = "ccXYZFO4005-Lonely";
    fs::write(game.data().join(format!("{}.esl", orphan)), b"plugin").unwrap();
    fs::write(game.data().join(format!("{} - Main.ba2", orphan)), b"not touched").unwrap();

    let tool = FakeTool::default();
    let summary = MergeOrchestrator::new(&game.config, &tool)
        .run(&|_| {})
        .unwrap();

    assert_eq!(summary.orphaned_skipped, vec![orphan]);
    assert_eq!(summary.source_archives, 4);
    assert_eq!(
        fs::read(game.data().join(format!("{} - Main.ba2", orphan))).unwrap(),
        b"not touched"
    );
    assert!(!tool.unpacked.borrow().iter().any(|n| n.starts_with(orphan)));
}

#[test]
fn count_mismatch_aborts_merge() {
    let game = two_item_game();
    let tool = FakeTool {
        drop_file_from: Some(format!("{} - Main.ba2", GRENADE)),
        ..Default::default()
    };

    let mut merge = MergeOrchestrator::new(&game.config, &tool);
    let err = merge.run(&|_| {}).unwrap_err();
    match &err {
        PackError::Verification { archive, reason } => {
            assert_eq!(archive, &format!("{} - Main.ba2", GRENADE));
            assert!(reason.contains("declares 1 files but 0 were extracted"));
        }
        other => panic!("Expected Verification, got {:?}", other),
    }
    assert_eq!(merge.failed_at(), Some(MergeStage::Extracting));

    // Nothing consumed, backup kept, staging left for inspection
    assert!(game.data().join(format!("{} - Main.ba2", GRENADE)).exists());
    assert_eq!(BackupManager::new(game.data().join("CC_Backup")).count(), 1);
    assert!(game.data().join("CC_Temp").exists());
    assert!(tool.packed.borrow().is_empty());
}

#[test]
fn tool_failure_stops_merge() {
    let game = two_item_game();
    let tool = FakeTool {
        fail_pack: true,
        ..Default::default()
    };

    let mut merge = MergeOrchestrator::new(&game.config, &tool);
    let err = merge.run(&|_| {}).unwrap_err();
    match &err {
        PackError::Tool(e) => assert_eq!(e.kind(), Some(ToolErrorKind::AccessDenied)),
        other => panic!("Expected Tool error, got {:?}", other),
    }
    assert!(err.to_string().starts_with("BSArch pack failed"));
    assert_eq!(merge.failed_at(), Some(MergeStage::Repacking));
    assert!(game.data().join(format!("{} - Textures.ba2", PIPBOY)).exists());

    let plugins = fs::read_to_string(game.plugins_txt()).unwrap();
    assert!(!plugins.contains("CCPacked"));
}

#[test]
fn unpack_failure_names_archive() {
    let game = two_item_game();
    let failing = format!("{} - Textures.ba2", PIPBOY);
    let tool = FakeTool {
        fail_unpack_of: Some(failing.clone()),
        ..Default::default()
    };

    let err = MergeOrchestrator::new(&game.config, &tool)
        .run(&|_| {})
        .unwrap_err();
    assert!(err.to_string().contains(&format!("Archive: {}", failing)));
}

#[test]
fn zero_count_header_only_warns() {
    let game = two_item_game();
    let mut payload = Payload::new();
    payload.insert("scripts/grenade.pex".to_string(), b"pex".to_vec());
    write_archive_with_count(
        &game.data().join(format!("{} - Main.ba2", GRENADE)),
        ArchiveKind::General,
        &payload,
        0,
    );

    let progress = Progress::default();
    MergeOrchestrator::new(&game.config, &FakeTool::default())
        .run(&|m| progress.push(m))
        .unwrap();
    assert!(progress.contains("Archive reports 0 files"));
}

#[test]
fn unreadable_header_falls_back_to_file_check() {
    let game = two_item_game();
    let path = game.data().join(format!("{} - Main.ba2", GRENADE));

    let mut data = vec![b'X'; HEADER_LEN];
    let mut payload = Payload::new();
    payload.insert("scripts/grenade.pex".to_string(), b"pex".to_vec());
    data.extend_from_slice(&serde_json::to_vec(&payload).unwrap());
    fs::write(&path, &data).unwrap();

    let progress = Progress::default();
    let summary = MergeOrchestrator::new(&game.config, &FakeTool::default())
        .run(&|m| progress.push(m))
        .unwrap();
    assert!(progress.contains("Could not read archive header"));
    let main = read_payload(&game.data().join("CCPacked_Main - Main.ba2"));
    assert!(main.contains_key("scripts/grenade.pex"));
    assert_eq!(summary.source_archives, 4);

    // Same archive with nothing inside is rejected
    let game = two_item_game();
    let path = game.data().join(format!("{} - Main.ba2", GRENADE));
    let mut data = vec![b'X'; HEADER_LEN];
    data.extend_from_slice(b"{}");
    fs::write(&path, &data).unwrap();

    let err = MergeOrchestrator::new(&game.config, &FakeTool::default())
        .run(&|_| {})
        .unwrap_err();
    assert!(matches!(err, PackError::Verification { .. }));
}

#[test]
fn leftover_stubs_and_strings_are_swept() {
    let game = two_item_game();
    let data = game.data();
    for stale in ["CCPacked_Main_Textures3.esl", "CCMerged_Main.esl"] {
        fs::write(data.join(stale), b"old").unwrap();
    }
    fs::write(data.join("Strings").join("CCPacked_Main_en.strings"), b"old").unwrap();
    fs::write(
        game.plugins_txt(),
        "*Fallout4.esm\r\n*CCPacked_Main_Textures3.esl\r\n*CCMerged_Main.esl\r\n",
    )
    .unwrap();

    MergeOrchestrator::new(&game.config, &FakeTool::default())
        .run(&|_| {})
        .unwrap();

    assert!(!data.join("CCPacked_Main_Textures3.esl").exists());
    assert!(!data.join("CCMerged_Main.esl").exists());
    assert!(!data.join("Strings").join("CCPacked_Main_en.strings").exists());
    assert!(data.join("Strings").join("Fallout4_en.strings").exists());

    let plugins = fs::read_to_string(game.plugins_txt()).unwrap();
    assert!(!plugins.contains("Textures3"));
    assert!(!plugins.contains("CCMerged"));
    assert!(plugins.contains("*CCPacked_Main_Textures2.esl"));
}

#[test]
fn new_item_after_merge_is_refused() {
    let game = two_item_game();
    MergeOrchestrator::new(&game.config, &FakeTool::default())
        .run(&|_| {})
        .unwrap();
    game.add_item(
        HALLOWEEN,
        &[("scripts/halloween.pex", b"boo")],
        &[("textures/h.dds", &[4u8; 10])],
    );
    let before = game.data_files();

    let tool = FakeTool::default();
    let mut merge = MergeOrchestrator::new(&game.config, &tool);
    let err = merge.run(&|_| {}).unwrap_err();
    assert!(matches!(
        err,
        PackError::Integrity(IntegrityError::MixedState {
            merged: 4,
            new_items: 1
        })
    ));
    assert_eq!(merge.failed_at(), Some(MergeStage::Validating));
    assert_eq!(game.data_files(), before);
    assert!(tool.unpacked.borrow().is_empty());
    assert_eq!(BackupManager::new(game.data().join("CC_Backup")).count(), 1);
}

#[test]
fn restore_first_repacks_every_item() {
    let mut game = two_item_game();
    MergeOrchestrator::new(&game.config, &FakeTool::default())
        .run(&|_| {})
        .unwrap();
    game.add_item(
        HALLOWEEN,
        &[("scripts/halloween.pex", b"boo")],
        &[("textures/h.dds", &[4u8; 10])],
    );
    game.config.texture_split_bytes = 1000;

    let progress = Progress::default();
    let summary = MergeOrchestrator::new(&game.config, &FakeTool::default())
        .with_restore_first(true)
        .run(&|m| progress.push(m))
        .unwrap();
    assert!(progress.contains("Restoring the previous merge"));
    assert_eq!(summary.source_archives, 6);

    let data = game.data();
    let main = read_payload(&data.join("CCPacked_Main - Main.ba2"));
    assert_eq!(
        keys(&main),
        vec!["meshes/pipboy.nif", "scripts/grenade.pex", "scripts/halloween.pex"]
    );
    let textures = read_payload(&data.join("CCPacked_Main_Textures1 - Textures.ba2"));
    assert_eq!(textures.len(), 4);
    assert!(!data.join("CCPacked_Main_Textures2 - Textures.ba2").exists());
    assert!(!data.join("CCPacked_Main_Textures2.esl").exists());
    let plugins = fs::read_to_string(game.plugins_txt()).unwrap();
    assert!(!plugins.contains("Textures2"));

    // Every item comes back from the single remaining snapshot
    RestoreOrchestrator::new(&game.config).run(&|_| {}).unwrap();
    for base in [PIPBOY, GRENADE, HALLOWEEN] {
        assert!(data.join(format!("{} - Main.ba2", base)).exists(), "{}", base);
        assert!(data.join(format!("{} - Textures.ba2", base)).exists(), "{}", base);
    }
    assert_eq!(
        keys(&read_payload(&data.join(format!("{} - Main.ba2", PIPBOY)))),
        vec!["meshes/pipboy.nif", "sound/fx/click.xwm", "strings/ccbgsfo4001-pipboy(black)_en.strings"]
    );
    assert_eq!(BackupManager::new(data.join("CC_Backup")).count(), 1);
}

#[test]
fn two_items_without_sounds() {
    let game = Game::new();
    game.add_item(
        GRENADE,
        &[("scripts/grenade.pex", b"pex")],
        &[("textures/g.dds", &[2u8; 40])],
    );
    game.add_item(
        HALLOWEEN,
        &[("meshes/pumpkin.nif", b"nif")],
        &[("textures/h.dds", &[4u8; 10])],
    );

    let tool = FakeTool::default();
    let summary = MergeOrchestrator::new(&game.config, &tool)
        .run(&|_| {})
        .unwrap();

    assert_eq!(
        summary.archives_created,
        vec!["CCPacked_Main - Main.ba2", "CCPacked_Main_Textures1 - Textures.ba2"]
    );
    assert_eq!(
        summary.stubs_created,
        vec!["CCPacked_Main.esl", "CCPacked_Main_Textures1.esl"]
    );
    assert_eq!(tool.packed.borrow().len(), 2);
    assert!(!game.data().join("CCPacked_Sounds - Main.ba2").exists());
    assert!(!game.data().join("CCPacked_Sounds.esl").exists());

    let plugins = fs::read_to_string(game.plugins_txt()).unwrap();
    assert_eq!(
        plugins,
        "*Fallout4.esm\r\n*ccBGSFO4001-PipBoy(Black).esl\r\n\
         *CCPacked_Main.esl\r\n*CCPacked_Main_Textures1.esl\r\n"
    );
}

#[test]
fn merge_without_registry_still_succeeds() {
    let mut game = two_item_game();
    game.config.plugins_txt = Some(game.temp.path().join("missing").join("plugins.txt"));

    let summary = MergeOrchestrator::new(&game.config, &FakeTool::default())
        .run(&|_| {})
        .unwrap();
    assert_eq!(summary.stubs_created.len(), 4);
    assert!(!game.temp.path().join("missing").exists());
}

#[test]
fn restore_without_backup_fails() {
    let game = Game::new();
    let err = RestoreOrchestrator::new(&game.config)
        .run(&|_| {})
        .unwrap_err();
    assert!(matches!(err, PackError::NoBackup(BackupError::NoBackupDir)));
}

#[test]
fn restore_skips_manifest_file() {
    let game = two_item_game();
    MergeOrchestrator::new(&game.config, &FakeTool::default())
        .run(&|_| {})
        .unwrap();
    RestoreOrchestrator::new(&game.config).run(&|_| {}).unwrap();
    assert!(!game.data().join(MANIFEST_NAME).exists());
}
