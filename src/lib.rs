//! ccpack - Creation Club archive packer for Fallout 4
//!
//! Merges the per-item Creation Club archives into a handful of large
//! archives, and puts the originals back on request.

pub mod archive;
pub mod backup;
pub mod bsa;
pub mod content;
pub mod error;
pub mod load_order;
pub mod packer;
pub mod paths;
pub mod plugin;
pub mod settings;

pub use archive::{ArchiveListing, ArchiveTool, BsArch};
pub use error::PackError;
pub use packer::{MergeOrchestrator, PackerConfig, RestoreOrchestrator};
