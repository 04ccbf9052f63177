//! Width-erased access to a volume.
//!
//! The offset width of an existing buffer is only known after reading its
//! header, so tools work through `Box<dyn Volume>`.

use alloc::boxed::Box;
use alloc::vec::Vec;

use log::debug;

use crate::config::FormatOptions;
use crate::error::{FsError, Result};
use crate::filesystem::{DirectoryListing, FileSystem};
use crate::header;
use crate::inode::FileType;
use crate::offset::{Offset, StoreType, Storage};
use crate::store::{FileStat, WalkRecord};

pub trait Volume {
    fn store_type(&self) -> StoreType;
    fn size(&self) -> u64;
    fn mem_used(&self) -> u64;
    fn available(&self) -> u64;
    fn as_bytes(&self) -> &[u8];

    fn find_inode_of(&self, path: &str) -> Result<u64>;
    fn mkdir(&mut self, path: &str) -> Result<u64>;
    fn write(&mut self, path: &str, data: &[u8], file_type: FileType) -> Result<u64>;
    fn write_inode(&mut self, id: u64, data: &[u8], file_type: FileType) -> Result<()>;
    fn write_directory(&mut self, id: u64, entries: &[(u64, &str)]) -> Result<()>;
    fn read(&self, path: &str) -> Result<Vec<u8>>;
    fn read_inode(&self, id: u64) -> Result<Vec<u8>>;
    fn read_range(&self, id: u64, offset: u64, out: &mut [u8]) -> Result<usize>;
    fn stat(&self, path: &str) -> Result<FileStat>;
    fn stat_inode(&self, id: u64) -> Result<FileStat>;
    fn ls(&self, path: &str) -> Result<Vec<DirectoryListing>>;
    fn remove(&mut self, path: &str, recursive: bool) -> Result<()>;
    fn remove_inode(&mut self, id: u64, recursive: bool) -> Result<()>;
    fn rename(&mut self, src: &str, dest: &str) -> Result<()>;
    fn strip_directories(&mut self) -> Result<usize>;
    fn set_links(&mut self, id: u64, links: u8) -> Result<()>;
    fn inodes(&self) -> Result<Vec<FileStat>>;

    fn compact(&mut self) -> Result<()>;
    fn resize(&mut self, size: u64) -> Result<()>;
    fn expand(&mut self, size: u64) -> Result<()>;
    fn walk(&self, f: &mut dyn FnMut(WalkRecord) -> Result<()>) -> Result<()>;
    fn verify(&self) -> Result<()>;
    fn dump_to(&self, dest: &mut dyn Volume) -> Result<()>;
}

impl<W: Offset, B: Storage> Volume for FileSystem<W, B> {
    fn store_type(&self) -> StoreType {
        FileSystem::store_type(self)
    }

    fn size(&self) -> u64 {
        FileSystem::size(self)
    }

    fn mem_used(&self) -> u64 {
        FileSystem::mem_used(self)
    }

    fn available(&self) -> u64 {
        FileSystem::available(self)
    }

    fn as_bytes(&self) -> &[u8] {
        FileSystem::as_bytes(self)
    }

    fn find_inode_of(&self, path: &str) -> Result<u64> {
        FileSystem::find_inode_of(self, path)
    }

    fn mkdir(&mut self, path: &str) -> Result<u64> {
        FileSystem::mkdir(self, path)
    }

    fn write(&mut self, path: &str, data: &[u8], file_type: FileType) -> Result<u64> {
        FileSystem::write(self, path, data, file_type)
    }

    fn write_inode(&mut self, id: u64, data: &[u8], file_type: FileType) -> Result<()> {
        FileSystem::write_inode(self, id, data, file_type)
    }

    fn write_directory(&mut self, id: u64, entries: &[(u64, &str)]) -> Result<()> {
        FileSystem::write_directory(self, id, entries)
    }

    fn read(&self, path: &str) -> Result<Vec<u8>> {
        FileSystem::read(self, path)
    }

    fn read_inode(&self, id: u64) -> Result<Vec<u8>> {
        FileSystem::read_inode(self, id)
    }

    fn read_range(&self, id: u64, offset: u64, out: &mut [u8]) -> Result<usize> {
        FileSystem::read_range(self, id, offset, out)
    }

    fn stat(&self, path: &str) -> Result<FileStat> {
        FileSystem::stat(self, path)
    }

    fn stat_inode(&self, id: u64) -> Result<FileStat> {
        FileSystem::stat_inode(self, id)
    }

    fn ls(&self, path: &str) -> Result<Vec<DirectoryListing>> {
        FileSystem::ls(self, path)
    }

    fn remove(&mut self, path: &str, recursive: bool) -> Result<()> {
        FileSystem::remove(self, path, recursive)
    }

    fn remove_inode(&mut self, id: u64, recursive: bool) -> Result<()> {
        FileSystem::remove_inode(self, id, recursive)
    }

    fn rename(&mut self, src: &str, dest: &str) -> Result<()> {
        FileSystem::rename(self, src, dest)
    }

    fn strip_directories(&mut self) -> Result<usize> {
        FileSystem::strip_directories(self)
    }

    fn set_links(&mut self, id: u64, links: u8) -> Result<()> {
        FileSystem::set_links(self, id, links)
    }

    fn inodes(&self) -> Result<Vec<FileStat>> {
        FileSystem::inodes(self)
    }

    fn compact(&mut self) -> Result<()> {
        FileSystem::compact(self)
    }

    fn resize(&mut self, size: u64) -> Result<()> {
        FileSystem::resize(self, size)
    }

    fn expand(&mut self, size: u64) -> Result<()> {
        FileSystem::expand(self, size)
    }

    fn walk(&self, f: &mut dyn FnMut(WalkRecord) -> Result<()>) -> Result<()> {
        FileSystem::walk(self, |record| f(record))
    }

    fn verify(&self) -> Result<()> {
        FileSystem::verify(self)
    }

    fn dump_to(&self, dest: &mut dyn Volume) -> Result<()> {
        FileSystem::dump_to(self, dest)
    }
}

/// Opens a formatted buffer with whichever offset width its header names.
pub fn open_volume<B: Storage + 'static>(buf: B) -> Result<Box<dyn Volume>> {
    let (version, store_type) = header::peek(buf.bytes())?;
    debug!("Opening {}-bit volume, format version {}", store_type.bits(), version);
    Ok(match store_type {
        StoreType::Fs16 => Box::new(FileSystem::<u16, B>::open(buf)?),
        StoreType::Fs32 => Box::new(FileSystem::<u32, B>::open(buf)?),
        StoreType::Fs64 => Box::new(FileSystem::<u64, B>::open(buf)?),
    })
}

/// Formats `buf` as a volume of the given width.
pub fn format_volume<B: Storage + 'static>(
    buf: B,
    size: u64,
    store_type: StoreType,
    options: FormatOptions,
) -> Result<Box<dyn Volume>> {
    if size > store_type.max_size() {
        return Err(FsError::InvalidFormat("size exceeds the range of the store type"));
    }
    Ok(match store_type {
        StoreType::Fs16 => Box::new(FileSystem::<u16, B>::format(buf, size, options)?),
        StoreType::Fs32 => Box::new(FileSystem::<u32, B>::format(buf, size, options)?),
        StoreType::Fs64 => Box::new(FileSystem::<u64, B>::format(buf, size, options)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn open_picks_the_right_width() {
        for store_type in [StoreType::Fs16, StoreType::Fs32, StoreType::Fs64] {
            let mut volume =
                format_volume(vec![0u8; 4096], 4096, store_type, FormatOptions::default()).unwrap();
            volume.write("/hello", b"world", FileType::Normal).unwrap();
            let bytes = volume.as_bytes().to_vec();
            let reopened = open_volume(bytes).unwrap();
            assert_eq!(reopened.store_type(), store_type);
            assert_eq!(reopened.read("/hello").unwrap(), b"world");
        }
    }

    #[test]
    fn open_rejects_garbage() {
        assert!(matches!(
            open_volume(vec![0u8; 64]),
            Err(FsError::VersionMismatch { found: 0, .. })
        ));
        let mut bytes = format_volume(vec![0u8; 1024], 1024, StoreType::Fs32, FormatOptions::default())
            .unwrap()
            .as_bytes()
            .to_vec();
        bytes.truncate(512);
        assert!(matches!(open_volume(bytes), Err(FsError::BufferTooSmall { .. })));
    }

    #[test]
    fn dump_reencodes_directories_across_widths() {
        let mut small =
            format_volume(vec![0u8; 8192], 8192, StoreType::Fs16, FormatOptions::default()).unwrap();
        small.mkdir("/etc").unwrap();
        let id = small.write("/etc/motd", b"welcome", FileType::Normal).unwrap();

        let mut big =
            format_volume(vec![0u8; 16_384], 16_384, StoreType::Fs64, FormatOptions::default())
                .unwrap();
        small.dump_to(big.as_mut()).unwrap();
        assert_eq!(big.read("/etc/motd").unwrap(), b"welcome");
        assert_eq!(big.stat("/etc/motd").unwrap().inode, id);
        assert_eq!(big.stat("/etc").unwrap().links, small.stat("/etc").unwrap().links);
        big.verify().unwrap();

        let mut tiny =
            format_volume(vec![0u8; 1024], 1024, StoreType::Fs64, FormatOptions::default()).unwrap();
        assert!(matches!(
            small.dump_to(tiny.as_mut()),
            Err(FsError::OutOfSpace { .. })
        ));
    }

    #[test]
    fn walk_through_trait_object() {
        let volume =
            format_volume(vec![0u8; 2048], 2048, StoreType::Fs32, FormatOptions::default()).unwrap();
        let mut count = 0;
        volume
            .walk(&mut |_| {
                count += 1;
                Ok(())
            })
            .unwrap();
        // header, sentinel, seed, root
        assert_eq!(count, 4);
    }
}
