//! Single-buffer file store.
//!
//! A volume is one contiguous byte buffer holding a header, an inode store
//! addressed purely by offsets, and a directory tree encoded in ordinary
//! inodes. The buffer can be written to disk, mapped, or moved verbatim.
//! Three offset widths (16, 32 and 64 bits) give three volume size classes.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod codec;
pub mod config;
pub mod directory;
pub mod error;
pub mod filesystem;
pub mod header;
pub mod inode;
pub mod offset;
pub mod path;
pub mod random;
pub mod store;
pub mod undo;
pub mod volume;

pub use config::{FormatOptions, INODE_RANDOM, INODE_RESERVED_END, INODE_ROOT_DIR, MAX_NAME_LEN};
pub use error::{FsError, Result};
pub use filesystem::{DirectoryListing, FileSystem, FileSystem16, FileSystem32, FileSystem64};
pub use header::FORMAT_VERSION;
pub use inode::FileType;
pub use offset::{Offset, StoreType, Storage};
pub use path::PathIterator;
pub use random::{Random, RandomSeed};
pub use store::{FileStat, FileStore, FileStore16, FileStore32, FileStore64, RecordKind, WalkRecord};
pub use volume::{format_volume, open_volume, Volume};
