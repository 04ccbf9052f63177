use serde::{Deserialize, Serialize};

use crate::codec;
use crate::error::{FsError, Result};
use crate::offset::Offset;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum FileType {
    #[default]
    None = 0,
    Normal = 1,
    Directory = 2,
}

impl FileType {
    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(FileType::None),
            1 => Some(FileType::Normal),
            2 => Some(FileType::Directory),
            _ => None,
        }
    }
}

/// Fixed-size inode record. The payload of `data_len` bytes follows it
/// immediately in the buffer.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Inode<W> {
    // allocation order, circular
    pub prev: W,
    pub next: W,
    pub data_len: W,
    pub id: W,
    pub refs: u8,
    pub file_type: u8,
    // id index
    pub left: W,
    pub right: W,
}

impl<W: Offset> Inode<W> {
    pub const SIZE: usize = 6 * W::WIDTH + 2;

    /// Record size including the payload.
    pub fn size(&self) -> u64 {
        Self::SIZE as u64 + self.data_len.to_u64()
    }

    pub fn file_type(&self) -> Result<FileType> {
        FileType::from_u8(self.file_type).ok_or(FsError::Corrupt("unknown file type"))
    }

    pub fn read(bytes: &[u8]) -> Result<Self> {
        let raw = bytes
            .get(..Self::SIZE)
            .ok_or(FsError::Corrupt("inode record truncated"))?;
        codec::decode(raw)
    }

    pub fn write(&self, bytes: &mut [u8]) -> Result<()> {
        let raw = bytes
            .get_mut(..Self::SIZE)
            .ok_or(FsError::Corrupt("inode record truncated"))?;
        codec::encode_into(self, raw)?;
        Ok(())
    }
}
