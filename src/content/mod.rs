//! Creation Club content handling: integrity checks, asset classification
//! and texture grouping.

pub mod classify;
pub mod integrity;
pub mod split;

pub use classify::{
    absorb_tree, classify_file, classify_tree, count_files, relocate_strings, separate_sounds,
    AssetTag, ExtractedAsset, SOUND_EXTENSIONS, STRING_EXTENSIONS,
};
pub use integrity::{
    check_integrity, delete_orphans, find_cc_plugins, is_cc_name, ContentItem, IntegrityReport,
    OrphanCleanup,
};
pub use split::{split_textures, TextureGroup, DEFAULT_TEXTURE_SPLIT_BYTES};
