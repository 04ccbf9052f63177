use alloc::string::String;

pub type Result<T> = core::result::Result<T, FsError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FsError {
    #[error("no inode with id {0}")]
    InodeNotFound(u64),

    #[error("no such file or directory: {0}")]
    PathNotFound(String),

    #[error("out of space: needed {needed} bytes, {available} available")]
    OutOfSpace { needed: u64, available: u64 },

    #[error("could not allocate {needed} bytes")]
    AllocationFailed { needed: u64 },

    #[error("format version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u16, found: u16 },

    #[error("invalid format: {0}")]
    InvalidFormat(&'static str),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error("is a directory: {0}")]
    IsADirectory(String),

    #[error("inode {0} is already in the index")]
    Collision(u64),

    #[error("invalid inode id: {0}")]
    InvalidInode(u64),

    #[error("buffer too small: needed {needed} bytes, got {actual}")]
    BufferTooSmall { needed: u64, actual: u64 },

    #[error("no free inode id could be generated")]
    IdsExhausted,

    #[error("volume is corrupt: {0}")]
    Corrupt(&'static str),

    #[error("codec error: {0}")]
    Codec(String),
}

impl FsError {
    /// Status code reported by tools. Zero is reserved for success.
    pub fn code(&self) -> i32 {
        match self {
            FsError::InodeNotFound(_) | FsError::PathNotFound(_) => 1,
            FsError::OutOfSpace { .. } => 2,
            FsError::AllocationFailed { .. } => 3,
            FsError::Collision(_) => 4,
            FsError::VersionMismatch { .. } => 5,
            FsError::InvalidFormat(_) => 6,
            FsError::InvalidPath(_) => 7,
            FsError::AlreadyExists(_) => 8,
            FsError::NotADirectory(_) => 9,
            FsError::IsADirectory(_) => 10,
            FsError::InvalidInode(_) => 11,
            FsError::BufferTooSmall { .. } => 12,
            FsError::IdsExhausted => 13,
            FsError::Corrupt(_) => 14,
            FsError::Codec(_) => 15,
        }
    }

    /// True for both flavours of "does not resolve".
    pub fn is_not_found(&self) -> bool {
        matches!(self, FsError::InodeNotFound(_) | FsError::PathNotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn codes_are_nonzero_and_distinct() {
        let errors = [
            FsError::InodeNotFound(3),
            FsError::OutOfSpace { needed: 1, available: 0 },
            FsError::AllocationFailed { needed: 1 },
            FsError::Collision(3),
            FsError::VersionMismatch { expected: 1, found: 2 },
            FsError::InvalidFormat("x"),
            FsError::InvalidPath("x".into()),
            FsError::AlreadyExists("x".into()),
            FsError::NotADirectory("x".into()),
            FsError::IsADirectory("x".into()),
            FsError::InvalidInode(0),
            FsError::BufferTooSmall { needed: 2, actual: 1 },
            FsError::IdsExhausted,
            FsError::Corrupt("x"),
            FsError::Codec("x".into()),
        ];
        let mut codes: alloc::vec::Vec<i32> = errors.iter().map(FsError::code).collect();
        assert!(codes.iter().all(|&c| c != 0));
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn not_found_covers_paths_and_ids() {
        assert!(FsError::PathNotFound("/a".to_string()).is_not_found());
        assert!(FsError::InodeNotFound(7).is_not_found());
        assert_eq!(FsError::PathNotFound("/a".into()).code(), 1);
        assert!(!FsError::IdsExhausted.is_not_found());
    }
}
