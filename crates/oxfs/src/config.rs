//! Well-known ids and format-time options.

use crate::random::{RandomSeed, DEFAULT_SEED};

/// Holds the persisted id generator state.
pub const INODE_RANDOM: u64 = 1;
pub const INODE_ROOT_DIR: u64 = 2;
/// Ids below this are never handed out by the id generator.
pub const INODE_RESERVED_END: u64 = 100;
pub const MAX_NAME_LEN: usize = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatOptions {
    /// Create the root directory. Without it the volume is a flat inode
    /// store and path operations fail with `PathNotFound`.
    pub directories: bool,
    pub seed: RandomSeed,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            directories: true,
            seed: DEFAULT_SEED,
        }
    }
}
