//! Size-bounded texture grouping.
//!
//! The game handles very large texture archives poorly, so textures are
//! split into several archives of at most a fixed uncompressed size.

/// Default uncompressed size limit per texture archive (7 GiB).
pub const DEFAULT_TEXTURE_SPLIT_BYTES: u64 = 7 * 1024 * 1024 * 1024;

/// One output texture archive worth of files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureGroup<T> {
    pub items: Vec<T>,
    pub total_size: u64,
}

impl<T> TextureGroup<T> {
    fn new() -> Self {
        Self {
            items: Vec::new(),
            total_size: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Greedy linear grouping in input order.
///
/// A file goes into the current group unless that would push the group past
/// `max_bytes` and the group already holds something. A single file larger
/// than the limit therefore gets a group of its own.
pub fn split_textures<T: Clone>(files: &[(T, u64)], max_bytes: u64) -> Vec<TextureGroup<T>> {
    let mut groups = Vec::new();
    let mut current = TextureGroup::new();

    for (item, size) in files {
        if current.total_size.saturating_add(*size) > max_bytes && !current.is_empty() {
            groups.push(std::mem::replace(&mut current, TextureGroup::new()));
        }
        current.items.push(item.clone());
        current.total_size = current.total_size.saturating_add(*size);
    }

    if !current.is_empty() {
        groups.push(current);
    }
    groups
}
