use serde::{Deserialize, Serialize};

use crate::codec;
use crate::error::{FsError, Result};
use crate::offset::{Offset, StoreType};

pub const FORMAT_VERSION: u16 = 1;

/// Volume header at offset 0.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header<W> {
    pub version: u16,
    pub store_type: u16,
    /// Bytes of the buffer the store may use.
    pub size: W,
    pub mem_used: W,
    /// Offset of the id index root, 0 when the index is empty.
    pub root_inode: W,
}

impl<W: Offset> Header<W> {
    pub const SIZE: usize = 4 + 3 * W::WIDTH;

    pub fn new(size: W, mem_used: W) -> Self {
        Self {
            version: FORMAT_VERSION,
            store_type: W::STORE_TYPE.tag(),
            size,
            mem_used,
            root_inode: W::default(),
        }
    }

    pub fn read(bytes: &[u8]) -> Result<Self> {
        let raw = bytes
            .get(..Self::SIZE)
            .ok_or(FsError::InvalidFormat("buffer shorter than header"))?;
        codec::decode(raw)
    }

    pub fn write(&self, bytes: &mut [u8]) -> Result<()> {
        let raw = bytes
            .get_mut(..Self::SIZE)
            .ok_or(FsError::InvalidFormat("buffer shorter than header"))?;
        codec::encode_into(self, raw)?;
        Ok(())
    }

    pub fn validate(&self, physical_len: usize) -> Result<()> {
        if self.version != FORMAT_VERSION {
            return Err(FsError::VersionMismatch {
                expected: FORMAT_VERSION,
                found: self.version,
            });
        }
        if self.store_type != W::STORE_TYPE.tag() {
            return Err(FsError::InvalidFormat("store type does not match offset width"));
        }
        if self.size.to_u64() > physical_len as u64 {
            return Err(FsError::BufferTooSmall {
                needed: self.size.to_u64(),
                actual: physical_len as u64,
            });
        }
        if self.mem_used > self.size {
            return Err(FsError::Corrupt("memory in use exceeds volume size"));
        }
        Ok(())
    }
}

/// Reads the width-independent prefix of a header: `(version, store type)`.
pub fn peek(bytes: &[u8]) -> Result<(u16, StoreType)> {
    let version = u16::read_be(bytes).ok_or(FsError::InvalidFormat("buffer shorter than header"))?;
    if version != FORMAT_VERSION {
        return Err(FsError::VersionMismatch {
            expected: FORMAT_VERSION,
            found: version,
        });
    }
    let tag = bytes
        .get(2..)
        .and_then(u16::read_be)
        .ok_or(FsError::InvalidFormat("buffer shorter than header"))?;
    let store_type = StoreType::from_tag(tag).ok_or(FsError::InvalidFormat("unknown store type"))?;
    Ok((version, store_type))
}
