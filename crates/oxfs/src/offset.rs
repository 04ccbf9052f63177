//! Offset addressing.
//!
//! Every persistent reference inside a volume is an integer offset from the
//! start of the buffer. The width of those integers (16, 32 or 64 bits) is
//! chosen at format time and selects one of three volume size classes.
//! All conversions between a persisted offset and a slice of the buffer go
//! through [`span`], which is the only place offsets are bounds checked.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt::{Debug, Display};
use core::ops::Range;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{FsError, Result};

/// Tag stored in the header identifying the offset width of a volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum StoreType {
    Fs16 = 1,
    Fs32 = 2,
    Fs64 = 3,
}

impl StoreType {
    pub fn from_tag(tag: u16) -> Option<Self> {
        match tag {
            1 => Some(StoreType::Fs16),
            2 => Some(StoreType::Fs32),
            3 => Some(StoreType::Fs64),
            _ => None,
        }
    }

    pub fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            16 => Some(StoreType::Fs16),
            32 => Some(StoreType::Fs32),
            64 => Some(StoreType::Fs64),
            _ => None,
        }
    }

    pub fn tag(self) -> u16 {
        self as u16
    }

    pub fn bits(self) -> u32 {
        match self {
            StoreType::Fs16 => 16,
            StoreType::Fs32 => 32,
            StoreType::Fs64 => 64,
        }
    }

    /// Largest volume this class can describe.
    pub fn max_size(self) -> u64 {
        match self {
            StoreType::Fs16 => u16::MAX as u64,
            StoreType::Fs32 => u32::MAX as u64,
            StoreType::Fs64 => u64::MAX,
        }
    }
}

/// Unsigned integer width used for offsets, lengths and inode ids.
pub trait Offset:
    Copy + Ord + Default + Debug + Display + Serialize + DeserializeOwned + 'static
{
    /// Encoded width in bytes.
    const WIDTH: usize;
    const MAX: u64;
    const STORE_TYPE: StoreType;

    fn to_u64(self) -> u64;

    fn from_u64(value: u64) -> Option<Self>;

    fn read_be(bytes: &[u8]) -> Option<Self>;

    fn write_be(self, out: &mut [u8]) -> Option<()>;

    /// Narrows a `u64` to this width, failing with `Corrupt` when it
    /// does not fit. Used for values the store computed itself.
    fn narrow(value: u64) -> Result<Self> {
        Self::from_u64(value).ok_or(FsError::Corrupt("offset exceeds volume width"))
    }

    fn to_usize(self) -> Result<usize> {
        usize::try_from(self.to_u64()).map_err(|_| FsError::Corrupt("offset exceeds address space"))
    }
}

macro_rules! impl_offset {
    ($ty:ty, $store:expr) => {
        impl Offset for $ty {
            const WIDTH: usize = core::mem::size_of::<$ty>();
            const MAX: u64 = <$ty>::MAX as u64;
            const STORE_TYPE: StoreType = $store;

            fn to_u64(self) -> u64 {
                self as u64
            }

            fn from_u64(value: u64) -> Option<Self> {
                <$ty>::try_from(value).ok()
            }

            fn read_be(bytes: &[u8]) -> Option<Self> {
                let raw = bytes.get(..Self::WIDTH)?;
                let mut buf = [0u8; core::mem::size_of::<$ty>()];
                buf.copy_from_slice(raw);
                Some(<$ty>::from_be_bytes(buf))
            }

            fn write_be(self, out: &mut [u8]) -> Option<()> {
                out.get_mut(..Self::WIDTH)?
                    .copy_from_slice(&self.to_be_bytes());
                Some(())
            }
        }
    };
}

impl_offset!(u16, StoreType::Fs16);
impl_offset!(u32, StoreType::Fs32);
impl_offset!(u64, StoreType::Fs64);

/// Converts a persisted `(offset, len)` pair into a range of a buffer of
/// `limit` bytes.
pub fn span(offset: u64, len: u64, limit: usize) -> Result<Range<usize>> {
    let end = offset
        .checked_add(len)
        .ok_or(FsError::Corrupt("offset overflow"))?;
    if end > limit as u64 {
        return Err(FsError::Corrupt("offset out of bounds"));
    }
    // end <= limit, so both fit in usize
    Ok(offset as usize..end as usize)
}

/// Backing memory for a volume: RAM, a mapped file, or a loaded disk image.
pub trait Storage {
    fn bytes(&self) -> &[u8];

    fn bytes_mut(&mut self) -> &mut [u8];

    /// Makes at least `len` bytes addressable, preserving the contents.
    fn grow(&mut self, len: usize) -> Result<()>;
}

impl Storage for Vec<u8> {
    fn bytes(&self) -> &[u8] {
        self
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        self
    }

    fn grow(&mut self, len: usize) -> Result<()> {
        if len > self.len() {
            self.resize(len, 0);
        }
        Ok(())
    }
}

impl Storage for Box<[u8]> {
    fn bytes(&self) -> &[u8] {
        self
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        self
    }

    fn grow(&mut self, len: usize) -> Result<()> {
        if len > self.len() {
            let mut data = core::mem::take(self).into_vec();
            data.resize(len, 0);
            *self = data.into_boxed_slice();
        }
        Ok(())
    }
}

impl Storage for &mut [u8] {
    fn bytes(&self) -> &[u8] {
        self
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        self
    }

    fn grow(&mut self, len: usize) -> Result<()> {
        if len > self.len() {
            return Err(FsError::BufferTooSmall {
                needed: len as u64,
                actual: self.len() as u64,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn big_endian_round_trip_per_width() {
        let mut buf = [0u8; 8];
        0x1234u16.write_be(&mut buf).unwrap();
        assert_eq!(&buf[..2], &[0x12, 0x34]);
        assert_eq!(u16::read_be(&buf), Some(0x1234));

        0xDEAD_BEEFu32.write_be(&mut buf).unwrap();
        assert_eq!(&buf[..4], &[0xDE, 0xAD, 0xBE, 0xEF]);

        0x0102_0304_0506_0708u64.write_be(&mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn short_slices_are_rejected() {
        assert_eq!(u32::read_be(&[1, 2, 3]), None);
        assert_eq!(7u64.write_be(&mut [0u8; 4]), None);
    }

    #[test]
    fn narrowing_checks_width() {
        assert_eq!(u16::from_u64(65_535), Some(u16::MAX));
        assert_eq!(u16::from_u64(65_536), None);
        assert!(u16::narrow(70_000).is_err());
        assert_eq!(u32::MAX as u64, <u32 as Offset>::MAX);
    }

    #[test]
    fn span_bounds() {
        assert_eq!(span(4, 4, 8).unwrap(), 4..8);
        assert!(span(5, 4, 8).is_err());
        assert!(span(u64::MAX, 2, 8).is_err());
    }

    #[test]
    fn store_type_tags() {
        for ty in [StoreType::Fs16, StoreType::Fs32, StoreType::Fs64] {
            assert_eq!(StoreType::from_tag(ty.tag()), Some(ty));
            assert_eq!(StoreType::from_bits(ty.bits()), Some(ty));
        }
        assert_eq!(StoreType::from_tag(0), None);
        assert_eq!(StoreType::from_bits(8), None);
    }

    #[test]
    fn slice_storage_cannot_grow() {
        let mut raw = [0u8; 16];
        let mut storage: &mut [u8] = &mut raw;
        assert!(storage.grow(8).is_ok());
        assert!(matches!(
            storage.grow(32),
            Err(FsError::BufferTooSmall { needed: 32, actual: 16 })
        ));

        let mut boxed: Box<[u8]> = alloc::vec![1u8; 4].into_boxed_slice();
        boxed.grow(8).unwrap();
        assert_eq!(&*boxed, &[1, 1, 1, 1, 0, 0, 0, 0]);
    }
}
