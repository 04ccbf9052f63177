//! Inode store.
//!
//! Layout of a volume:
//!
//! ```text
//! 0                 Header::SIZE
//! +-----------------+----------+---------+---------+-----     -----+
//! | Header          | sentinel | inode A | inode B |  ...  free    |
//! +-----------------+----------+---------+---------+-----     -----+
//! ```
//!
//! Inodes are bump allocated at the tail of a circular doubly linked list
//! kept in physical order, starting and ending at the sentinel. Removed
//! records are zeroed and unlinked; their space comes back through
//! [`FileStore::compact`], which slides every live record toward the front.
//! Lookup by id goes through a separate binary search tree threaded through
//! the `left`/`right` fields (see `tree.rs`).

mod tree;

use alloc::vec::Vec;
use core::marker::PhantomData;

use log::{debug, info};

use crate::error::{FsError, Result};
use crate::header::Header;
use crate::inode::{FileType, Inode};
use crate::offset::{span, Offset, StoreType, Storage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub inode: u64,
    pub size: u64,
    pub file_type: FileType,
    pub links: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Header,
    Sentinel,
    Inode { id: u64, file_type: u8 },
}

/// One region of the volume as reported by [`FileStore::walk`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkRecord {
    pub kind: RecordKind,
    pub start: u64,
    pub end: u64,
}

pub struct FileStore<W, B = Vec<u8>> {
    buf: B,
    header: Header<W>,
    _width: PhantomData<W>,
}

pub type FileStore16<B = Vec<u8>> = FileStore<u16, B>;
pub type FileStore32<B = Vec<u8>> = FileStore<u32, B>;
pub type FileStore64<B = Vec<u8>> = FileStore<u64, B>;

impl<W: Offset, B: Storage> FileStore<W, B> {
    /// Smallest volume that can hold the header and the sentinel.
    pub const MIN_SIZE: u64 = (Header::<W>::SIZE + Inode::<W>::SIZE) as u64;

    /// Zeroes the first `size` bytes of `buf` and lays out an empty store.
    pub fn format(mut buf: B, size: u64) -> Result<Self> {
        if size > W::MAX {
            return Err(FsError::InvalidFormat("size exceeds the range of the store type"));
        }
        if size < Self::MIN_SIZE {
            return Err(FsError::BufferTooSmall {
                needed: Self::MIN_SIZE,
                actual: size,
            });
        }
        let physical = buf.bytes().len() as u64;
        if size > physical {
            return Err(FsError::BufferTooSmall {
                needed: size,
                actual: physical,
            });
        }

        let first = Header::<W>::SIZE;
        let first_w = W::narrow(first as u64)?;
        let header = Header::new(W::narrow(size)?, W::narrow(Self::MIN_SIZE)?);
        let bytes = buf.bytes_mut();
        bytes[..size as usize].fill(0);
        header.write(bytes)?;
        let sentinel = Inode {
            prev: first_w,
            next: first_w,
            ..Default::default()
        };
        sentinel.write(&mut bytes[first..])?;

        info!("Formatted {}-bit store of {} bytes", W::STORE_TYPE.bits(), size);

        Ok(Self {
            buf,
            header,
            _width: PhantomData,
        })
    }

    /// Opens a formatted buffer after validating its header.
    pub fn open(buf: B) -> Result<Self> {
        let header = Header::<W>::read(buf.bytes())?;
        header.validate(buf.bytes().len())?;
        let store = Self {
            buf,
            header,
            _width: PhantomData,
        };
        let sentinel = store.inode(store.first_inode())?;
        if sentinel.prev.to_u64() == 0 || sentinel.next.to_u64() == 0 {
            return Err(FsError::Corrupt("sentinel inode is not linked"));
        }
        debug!(
            "Opened {}-bit store: size {}, in use {}",
            W::STORE_TYPE.bits(),
            store.size(),
            store.mem_used()
        );
        Ok(store)
    }

    pub fn store_type(&self) -> StoreType {
        W::STORE_TYPE
    }

    pub fn version(&self) -> u16 {
        self.header.version
    }

    pub fn size(&self) -> u64 {
        self.header.size.to_u64()
    }

    pub fn mem_used(&self) -> u64 {
        self.header.mem_used.to_u64()
    }

    pub fn available(&self) -> u64 {
        self.size().saturating_sub(self.mem_used())
    }

    /// Bytes a record with a payload of `len` bytes occupies.
    pub fn space_needed(&self, len: u64) -> u64 {
        Inode::<W>::SIZE as u64 + len
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.buf.bytes()
    }

    pub fn into_inner(self) -> B {
        self.buf
    }

    /// Writes `data` under `id`, replacing any existing record with that id.
    /// The link count of a replaced record is kept.
    ///
    /// The space check counts the replaced record as free, so a rewrite can
    /// succeed even when `available()` alone is smaller than the new record.
    pub fn write(&mut self, id: u64, data: &[u8], file_type: FileType) -> Result<()> {
        let id_w = Self::check_id(id)?;
        let data_len = data.len() as u64;
        let needed = self.space_needed(data_len);
        let existing = self.find(id)?;

        let mut reclaim = 0;
        let mut refs = 0;
        if let Some(off) = existing {
            let mut node = self.inode(off)?;
            if node.data_len.to_u64() == data_len {
                let range = self.payload_range(off, &node)?;
                self.buf.bytes_mut()[range].copy_from_slice(data);
                node.file_type = file_type as u8;
                self.put_inode(off, &node)?;
                debug!("Overwrote inode {} in place ({} bytes)", id, data_len);
                return Ok(());
            }
            reclaim = node.size();
            refs = node.refs;
        }

        let available = self.available() + reclaim;
        if needed > available {
            return Err(FsError::OutOfSpace { needed, available });
        }

        if existing.is_some() {
            self.remove(id)?;
        }
        let off = self.alloc(needed)?;
        let mut node = self.inode(off)?;
        node.id = id_w;
        node.refs = refs;
        node.file_type = file_type as u8;
        self.put_inode(off, &node)?;
        let range = self.payload_range(off, &node)?;
        self.buf.bytes_mut()[range].copy_from_slice(data);

        if let Err(e) = self.tree_insert(off) {
            self.dealloc(off)?;
            return Err(e);
        }
        debug!("Wrote inode {} at offset {} ({} bytes)", id, off, data_len);
        Ok(())
    }

    /// Removes the record with the given id from the index and frees it.
    pub fn remove(&mut self, id: u64) -> Result<()> {
        let root = self.header.root_inode.to_u64();
        let (new_root, removed) = self.tree_remove(root, id)?;
        let off = removed.ok_or(FsError::InodeNotFound(id))?;
        self.header.root_inode = W::narrow(new_root)?;
        self.sync_header()?;
        self.dealloc(off)?;
        debug!("Removed inode {} from offset {}", id, off);
        Ok(())
    }

    /// Borrowed view of a record's payload.
    pub fn payload(&self, id: u64) -> Result<&[u8]> {
        let off = self.find(id)?.ok_or(FsError::InodeNotFound(id))?;
        let node = self.inode(off)?;
        let range = self.payload_range(off, &node)?;
        Ok(&self.buf.bytes()[range])
    }

    pub fn read(&self, id: u64) -> Result<Vec<u8>> {
        Ok(self.payload(id)?.to_vec())
    }

    /// Copies the payload into `out`, returning its length.
    pub fn read_into(&self, id: u64, out: &mut [u8]) -> Result<usize> {
        let data = self.payload(id)?;
        let actual = out.len() as u64;
        let dst = out
            .get_mut(..data.len())
            .ok_or(FsError::BufferTooSmall {
                needed: data.len() as u64,
                actual,
            })?;
        dst.copy_from_slice(data);
        Ok(data.len())
    }

    /// Copies up to `out.len()` payload bytes starting at `offset`.
    pub fn read_range(&self, id: u64, offset: u64, out: &mut [u8]) -> Result<usize> {
        let data = self.payload(id)?;
        let start = match usize::try_from(offset) {
            Ok(start) if start < data.len() => start,
            _ => return Ok(0),
        };
        let count = out.len().min(data.len() - start);
        out[..count].copy_from_slice(&data[start..start + count]);
        Ok(count)
    }

    pub fn stat(&self, id: u64) -> Result<FileStat> {
        let off = self.find(id)?.ok_or(FsError::InodeNotFound(id))?;
        let node = self.inode(off)?;
        Ok(FileStat {
            inode: id,
            size: node.data_len.to_u64(),
            file_type: node.file_type()?,
            links: node.refs,
        })
    }

    pub fn set_refs(&mut self, id: u64, refs: u8) -> Result<()> {
        let off = self.find(id)?.ok_or(FsError::InodeNotFound(id))?;
        self.update_inode(off, |n| n.refs = refs)
    }

    pub fn inc_refs(&mut self, id: u64) -> Result<u8> {
        let refs = self.stat(id)?.links.saturating_add(1);
        self.set_refs(id, refs)?;
        Ok(refs)
    }

    pub fn dec_refs(&mut self, id: u64) -> Result<u8> {
        let refs = self.stat(id)?.links.saturating_sub(1);
        self.set_refs(id, refs)?;
        Ok(refs)
    }

    /// Every live record, in allocation order.
    pub fn inodes(&self) -> Result<Vec<FileStat>> {
        let mut out = Vec::new();
        self.for_each_inode(|_, node| {
            out.push(FileStat {
                inode: node.id.to_u64(),
                size: node.data_len.to_u64(),
                file_type: node.file_type()?,
                links: node.refs,
            });
            Ok(())
        })?;
        Ok(out)
    }

    /// Slides every live record toward the front of the volume so all free
    /// space is contiguous at the tail.
    pub fn compact(&mut self) -> Result<()> {
        let first = self.first_inode();
        let sentinel = self.inode(first)?;
        let end = self.tail()?;
        let limit = self.max_records();
        let mut dest = first + sentinel.size();
        let mut current = sentinel.next.to_u64();
        let mut moved = 0;
        let mut steps = 0;

        while current != first {
            steps += 1;
            if steps > limit {
                return Err(FsError::Corrupt("allocation list does not terminate"));
            }
            if current < dest {
                return Err(FsError::Corrupt("allocation list out of physical order"));
            }
            let node = self.inode(current)?;
            let len = node.size();
            let next = node.next.to_u64();
            if current != dest {
                // the index must follow the record in the same step
                self.tree_relink(node.id.to_u64(), current, dest)?;
                let src = span(current, len, self.buf.bytes().len())?;
                self.buf.bytes_mut().copy_within(src, dest as usize);
                let dest_w = W::narrow(dest)?;
                self.update_inode(node.prev.to_u64(), |n| n.next = dest_w)?;
                self.update_inode(next, |n| n.prev = dest_w)?;
                moved += 1;
            }
            dest += len;
            current = next;
        }

        if dest < end {
            let range = span(dest, end - dest, self.buf.bytes().len())?;
            self.buf.bytes_mut()[range].fill(0);
        }
        debug!("Compacted store: moved {} records, tail at {}", moved, dest);
        Ok(())
    }

    /// Changes the usable size of the volume. Shrinking never goes below the
    /// bytes in use and compacts first; growing requires the backing buffer
    /// to already be that large.
    pub fn resize(&mut self, new_size: u64) -> Result<()> {
        if new_size > W::MAX {
            return Err(FsError::InvalidFormat("size exceeds the range of the store type"));
        }
        let target = if new_size < self.size() {
            self.compact()?;
            new_size.max(self.mem_used())
        } else {
            let physical = self.buf.bytes().len() as u64;
            if new_size > physical {
                return Err(FsError::BufferTooSmall {
                    needed: new_size,
                    actual: physical,
                });
            }
            new_size
        };
        self.header.size = W::narrow(target)?;
        self.sync_header()?;
        debug!("Resized store to {} bytes", target);
        Ok(())
    }

    /// Grows the backing buffer and then the store.
    pub fn expand(&mut self, new_size: u64) -> Result<()> {
        if new_size > W::MAX {
            return Err(FsError::InvalidFormat("size exceeds the range of the store type"));
        }
        let len = usize::try_from(new_size).map_err(|_| FsError::BufferTooSmall {
            needed: new_size,
            actual: usize::MAX as u64,
        })?;
        self.buf.grow(len)?;
        self.resize(new_size)?;
        info!("Expanded store to {} bytes", new_size);
        Ok(())
    }

    /// Rewrites every live record into `dest`, which may use another width.
    pub fn dump_to<W2: Offset, B2: Storage>(&self, dest: &mut FileStore<W2, B2>) -> Result<()> {
        if dest.size() < self.size() {
            return Err(FsError::OutOfSpace {
                needed: self.size(),
                available: dest.size(),
            });
        }
        self.for_each_inode(|off, node| {
            let id = node.id.to_u64();
            let range = self.payload_range(off, node)?;
            dest.write(id, &self.buf.bytes()[range], node.file_type()?)?;
            dest.set_refs(id, node.refs)
        })
    }

    /// Reports the header, the sentinel and every record in allocation order.
    pub fn walk<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(WalkRecord) -> Result<()>,
    {
        let first = self.first_inode();
        f(WalkRecord {
            kind: RecordKind::Header,
            start: 0,
            end: first,
        })?;
        let sentinel = self.inode(first)?;
        f(WalkRecord {
            kind: RecordKind::Sentinel,
            start: first,
            end: first + sentinel.size(),
        })?;
        self.for_each_inode(|off, node| {
            f(WalkRecord {
                kind: RecordKind::Inode {
                    id: node.id.to_u64(),
                    file_type: node.file_type,
                },
                start: off,
                end: off + node.size(),
            })
        })
    }

    /// Checks the allocation list, the byte accounting and the id index
    /// against each other.
    pub fn verify(&self) -> Result<()> {
        let mut used = self.first_inode() + self.inode(self.first_inode())?.size();
        let mut count = 0;
        let mut last_end = used;
        self.for_each_inode(|off, node| {
            if off < last_end {
                return Err(FsError::Corrupt("records overlap or are out of order"));
            }
            if self.find(node.id.to_u64())? != Some(off) {
                return Err(FsError::Corrupt("record missing from id index"));
            }
            last_end = off + node.size();
            used += node.size();
            count += 1;
            Ok(())
        })?;
        if last_end > self.size() {
            return Err(FsError::Corrupt("record extends past the end of the volume"));
        }
        if used != self.mem_used() {
            return Err(FsError::Corrupt("memory accounting does not match records"));
        }
        if self.index_len()? != count {
            return Err(FsError::Corrupt("id index holds unlisted records"));
        }
        Ok(())
    }

    fn check_id(id: u64) -> Result<W> {
        if id == 0 {
            return Err(FsError::InvalidInode(id));
        }
        W::from_u64(id).ok_or(FsError::InvalidInode(id))
    }

    fn first_inode(&self) -> u64 {
        Header::<W>::SIZE as u64
    }

    fn max_records(&self) -> usize {
        (self.size() / Inode::<W>::SIZE as u64) as usize + 1
    }

    fn sync_header(&mut self) -> Result<()> {
        self.header.write(self.buf.bytes_mut())
    }

    fn inode(&self, off: u64) -> Result<Inode<W>> {
        if off == 0 {
            return Err(FsError::Corrupt("null inode offset"));
        }
        let range = span(off, Inode::<W>::SIZE as u64, self.buf.bytes().len())?;
        Inode::read(&self.buf.bytes()[range])
    }

    fn put_inode(&mut self, off: u64, node: &Inode<W>) -> Result<()> {
        if off == 0 {
            return Err(FsError::Corrupt("null inode offset"));
        }
        let range = span(off, Inode::<W>::SIZE as u64, self.buf.bytes().len())?;
        node.write(&mut self.buf.bytes_mut()[range])
    }

    fn update_inode<F: FnOnce(&mut Inode<W>)>(&mut self, off: u64, f: F) -> Result<()> {
        let mut node = self.inode(off)?;
        f(&mut node);
        self.put_inode(off, &node)
    }

    fn payload_range(&self, off: u64, node: &Inode<W>) -> Result<core::ops::Range<usize>> {
        span(
            off + Inode::<W>::SIZE as u64,
            node.data_len.to_u64(),
            self.buf.bytes().len(),
        )
    }

    /// End of the last record in the allocation list.
    fn tail(&self) -> Result<u64> {
        let last = self.inode(self.first_inode())?.prev.to_u64();
        Ok(last + self.inode(last)?.size())
    }

    fn for_each_inode<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(u64, &Inode<W>) -> Result<()>,
    {
        let first = self.first_inode();
        let limit = self.max_records();
        let mut current = self.inode(first)?.next.to_u64();
        let mut steps = 0;
        while current != first {
            steps += 1;
            if steps > limit {
                return Err(FsError::Corrupt("allocation list does not terminate"));
            }
            let node = self.inode(current)?;
            f(current, &node)?;
            current = node.next.to_u64();
        }
        Ok(())
    }

    /// Bump allocates a zeroed record of `size` bytes at the tail of the
    /// allocation list, compacting once if the tail is exhausted.
    fn alloc(&mut self, size: u64) -> Result<u64> {
        let mut tail = self.tail()?;
        if tail + size > self.size() {
            self.compact()?;
            tail = self.tail()?;
            if tail + size > self.size() {
                return Err(FsError::AllocationFailed { needed: size });
            }
        }

        let range = span(tail, size, self.buf.bytes().len())?;
        self.buf.bytes_mut()[range].fill(0);

        let first = self.first_inode();
        let last = self.inode(first)?.prev.to_u64();
        let tail_w = W::narrow(tail)?;
        let node = Inode {
            prev: W::narrow(last)?,
            next: W::narrow(first)?,
            data_len: W::narrow(size - Inode::<W>::SIZE as u64)?,
            ..Default::default()
        };
        self.put_inode(tail, &node)?;
        self.update_inode(last, |n| n.next = tail_w)?;
        self.update_inode(first, |n| n.prev = tail_w)?;

        self.header.mem_used = W::narrow(self.mem_used() + size)?;
        self.sync_header()?;
        Ok(tail)
    }

    /// Unlinks a record from the allocation list and zeroes it.
    fn dealloc(&mut self, off: u64) -> Result<()> {
        let node = self.inode(off)?;
        let size = node.size();
        self.update_inode(node.prev.to_u64(), |n| n.next = node.next)?;
        self.update_inode(node.next.to_u64(), |n| n.prev = node.prev)?;

        let range = span(off, size, self.buf.bytes().len())?;
        self.buf.bytes_mut()[range].fill(0);

        let used = self
            .mem_used()
            .checked_sub(size)
            .ok_or(FsError::Corrupt("memory accounting underflow"))?;
        self.header.mem_used = W::narrow(used)?;
        self.sync_header()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn store<W: Offset>(size: usize) -> FileStore<W> {
        FileStore::format(vec![0u8; size], size as u64).unwrap()
    }

    #[test]
    fn format_lays_out_sentinel() {
        let fs = store::<u32>(1024);
        assert_eq!(fs.size(), 1024);
        assert_eq!(fs.mem_used(), 16 + 26);
        assert_eq!(fs.available(), 1024 - 42);
        assert_eq!(fs.header.root_inode, 0);
        let sentinel = fs.inode(16).unwrap();
        assert_eq!((sentinel.prev, sentinel.next), (16, 16));
        fs.verify().unwrap();
    }

    #[test]
    fn format_checks_sizes() {
        assert!(matches!(
            FileStore::<u16>::format(vec![0u8; 70_000], 70_000),
            Err(FsError::InvalidFormat(_))
        ));
        assert!(matches!(
            FileStore::<u32>::format(vec![0u8; 64], 128),
            Err(FsError::BufferTooSmall { needed: 128, actual: 64 })
        ));
        assert!(FileStore::<u64>::format(vec![0u8; 64], 64).is_err());
    }

    #[test]
    fn hello_world() {
        let mut fs = store::<u16>(65_535);
        fs.write(1, b"Hello\0", FileType::Normal).unwrap();
        assert_eq!(fs.read(1).unwrap(), b"Hello\0");
        fs.write(2, b"World\0", FileType::Normal).unwrap();
        assert_eq!(fs.read(2).unwrap(), b"World\0");
        assert_eq!(fs.read(1).unwrap(), b"Hello\0");
        fs.verify().unwrap();
    }

    #[test]
    fn overwrite_replaces_payload_and_keeps_links() {
        let mut fs = store::<u32>(1024);
        fs.write(7, b"short", FileType::Normal).unwrap();
        fs.inc_refs(7).unwrap();
        fs.write(7, b"a much longer payload", FileType::Directory).unwrap();
        let stat = fs.stat(7).unwrap();
        assert_eq!(stat.size, 21);
        assert_eq!(stat.file_type, FileType::Directory);
        assert_eq!(stat.links, 1);
        assert_eq!(fs.read(7).unwrap(), b"a much longer payload");
        assert_eq!(fs.inodes().unwrap().len(), 1);
        fs.verify().unwrap();
    }

    #[test]
    fn same_length_overwrite_does_not_allocate() {
        let mut fs = store::<u32>(1024);
        fs.write(9, b"abcd", FileType::Normal).unwrap();
        let used = fs.mem_used();
        fs.write(9, b"wxyz", FileType::Normal).unwrap();
        assert_eq!(fs.mem_used(), used);
        assert_eq!(fs.read(9).unwrap(), b"wxyz");
    }

    #[test]
    fn rewrite_reuses_the_space_of_the_replaced_record() {
        let mut fs = store::<u16>(128);
        // header 10 + sentinel 14 = 24; the record takes 14 + 60
        fs.write(5, &[5u8; 60], FileType::Normal).unwrap();
        assert_eq!(fs.available(), 30);
        fs.write(5, &[6u8; 61], FileType::Normal).unwrap();
        assert_eq!(fs.read(5).unwrap(), vec![6u8; 61]);
        assert_eq!(fs.mem_used(), 24 + 75);
        assert!(matches!(
            fs.write(5, &[7u8; 91], FileType::Normal),
            Err(FsError::OutOfSpace { needed: 105, available: 104 })
        ));
        assert_eq!(fs.read(5).unwrap(), vec![6u8; 61]);
        fs.verify().unwrap();
    }

    #[test]
    fn remove_then_miss_then_reuse() {
        let mut fs = store::<u64>(4096);
        fs.write(3, b"three", FileType::Normal).unwrap();
        let used = fs.mem_used();
        fs.remove(3).unwrap();
        assert_eq!(fs.read(3), Err(FsError::InodeNotFound(3)));
        assert_eq!(fs.remove(3), Err(FsError::InodeNotFound(3)));
        assert_eq!(fs.mem_used(), used - fs.space_needed(5));
        fs.write(3, b"again", FileType::Normal).unwrap();
        assert_eq!(fs.read(3).unwrap(), b"again");
        fs.verify().unwrap();
    }

    #[test]
    fn invalid_ids_are_rejected() {
        let mut fs = store::<u16>(1024);
        assert_eq!(fs.write(0, b"x", FileType::Normal), Err(FsError::InvalidInode(0)));
        assert_eq!(
            fs.write(70_000, b"x", FileType::Normal),
            Err(FsError::InvalidInode(70_000))
        );
        assert_eq!(fs.stat(70_000), Err(FsError::InodeNotFound(70_000)));
    }

    #[test]
    fn out_of_space_is_reported_without_side_effects() {
        let mut fs = store::<u16>(128);
        let free = fs.available();
        let err = fs.write(5, &vec![1u8; free as usize], FileType::Normal);
        assert_eq!(
            err,
            Err(FsError::OutOfSpace {
                needed: free + 14,
                available: free
            })
        );
        assert_eq!(fs.available(), free);
        fs.verify().unwrap();
    }

    #[test]
    fn alloc_compacts_fragmented_space() {
        let mut fs = store::<u16>(200);
        // header 10 + sentinel 14 = 24; each record 14 + 40 = 54
        fs.write(1, &[1u8; 40], FileType::Normal).unwrap();
        fs.write(2, &[2u8; 40], FileType::Normal).unwrap();
        fs.write(3, &[3u8; 40], FileType::Normal).unwrap();
        fs.remove(1).unwrap();
        fs.remove(2).unwrap();
        // the tail has 14 bytes left, the holes have 108
        fs.write(4, &[4u8; 80], FileType::Normal).unwrap();
        assert_eq!(fs.read(3).unwrap(), vec![3u8; 40]);
        assert_eq!(fs.read(4).unwrap(), vec![4u8; 80]);
        fs.verify().unwrap();
    }

    #[test]
    fn compaction_keeps_content_and_accounting() {
        let mut fs = store::<u32>(4096);
        for id in 1..=20u64 {
            fs.write(id, &vec![id as u8; id as usize * 3], FileType::Normal)
                .unwrap();
        }
        for id in (1..=20u64).filter(|id| id % 3 == 0) {
            fs.remove(id).unwrap();
        }
        fs.compact().unwrap();
        assert_eq!(fs.available(), fs.size() - fs.mem_used());
        assert_eq!(fs.tail().unwrap(), fs.mem_used());
        for id in (1..=20u64).filter(|id| id % 3 != 0) {
            assert_eq!(fs.read(id).unwrap(), vec![id as u8; id as usize * 3]);
        }
        fs.verify().unwrap();
        // idempotent
        let snapshot = fs.as_bytes().to_vec();
        fs.compact().unwrap();
        assert_eq!(fs.as_bytes(), &snapshot[..]);
    }

    #[test]
    fn read_variants() {
        let mut fs = store::<u32>(1024);
        fs.write(11, b"0123456789", FileType::Normal).unwrap();
        let mut small = [0u8; 4];
        assert!(matches!(
            fs.read_into(11, &mut small),
            Err(FsError::BufferTooSmall { needed: 10, actual: 4 })
        ));
        let mut big = [0u8; 16];
        assert_eq!(fs.read_into(11, &mut big).unwrap(), 10);
        assert_eq!(&big[..10], b"0123456789");
        assert_eq!(fs.read_range(11, 6, &mut small).unwrap(), 4);
        assert_eq!(&small, b"6789");
        assert_eq!(fs.read_range(11, 8, &mut small).unwrap(), 2);
        assert_eq!(fs.read_range(11, 10, &mut small).unwrap(), 0);
    }

    #[test]
    fn resize_shrinks_to_used_and_grows_to_physical() {
        let mut fs = store::<u32>(2048);
        fs.write(1, &[0u8; 100], FileType::Normal).unwrap();
        fs.write(2, &[0u8; 100], FileType::Normal).unwrap();
        fs.remove(1).unwrap();
        fs.resize(10).unwrap();
        assert_eq!(fs.size(), fs.mem_used());
        assert_eq!(fs.available(), 0);
        assert_eq!(fs.read(2).unwrap(), vec![0u8; 100]);
        fs.resize(2048).unwrap();
        assert_eq!(fs.size(), 2048);
        assert!(matches!(
            fs.resize(4096),
            Err(FsError::BufferTooSmall { needed: 4096, actual: 2048 })
        ));
        fs.verify().unwrap();
    }

    #[test]
    fn expand_grows_vec_backing() {
        let mut fs = store::<u32>(256);
        let free = fs.available();
        let payload = vec![9u8; free as usize + 100];
        assert!(matches!(
            fs.write(5, &payload, FileType::Normal),
            Err(FsError::OutOfSpace { .. })
        ));
        fs.expand(1024).unwrap();
        fs.write(5, &payload, FileType::Normal).unwrap();
        assert_eq!(fs.read(5).unwrap(), payload);
        assert_eq!(fs.as_bytes().len(), 1024);
    }

    #[test]
    fn open_round_trips_and_rejects_mismatched_width() {
        let mut fs = store::<u32>(1024);
        fs.write(42, b"persisted", FileType::Normal).unwrap();
        let bytes = fs.into_inner();
        let reopened = FileStore::<u32>::open(bytes.clone()).unwrap();
        assert_eq!(reopened.read(42).unwrap(), b"persisted");
        assert!(matches!(
            FileStore::<u64>::open(bytes.clone()),
            Err(FsError::InvalidFormat(_))
        ));
        assert!(matches!(
            FileStore::<u32>::open(bytes[..512].to_vec()),
            Err(FsError::BufferTooSmall { .. })
        ));
    }

    #[test]
    fn dump_to_other_width() {
        let mut src = store::<u16>(1024);
        src.write(10, b"ten", FileType::Normal).unwrap();
        src.write(20, b"twenty", FileType::Directory).unwrap();
        src.set_refs(20, 2).unwrap();

        let mut small = store::<u64>(512);
        assert!(matches!(src.dump_to(&mut small), Err(FsError::OutOfSpace { .. })));

        let mut dest = store::<u64>(4096);
        src.dump_to(&mut dest).unwrap();
        assert_eq!(dest.read(10).unwrap(), b"ten");
        assert_eq!(dest.stat(20).unwrap().links, 2);
        assert_eq!(dest.stat(20).unwrap().file_type, FileType::Directory);
        dest.verify().unwrap();
    }

    #[test]
    fn walk_reports_contiguous_regions() {
        let mut fs = store::<u32>(1024);
        fs.write(1, b"a", FileType::Normal).unwrap();
        fs.write(2, b"bb", FileType::Directory).unwrap();
        let mut records = Vec::new();
        fs.walk(|r| {
            records.push(r);
            Ok(())
        })
        .unwrap();
        assert_eq!(records.len(), 4);
        assert_eq!(records[0].kind, RecordKind::Header);
        assert_eq!(records[1].kind, RecordKind::Sentinel);
        assert_eq!(
            records[3].kind,
            RecordKind::Inode {
                id: 2,
                file_type: FileType::Directory as u8
            }
        );
        for pair in records.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
        assert_eq!(records[3].end, fs.mem_used());
    }

    #[test]
    fn corrupt_links_are_detected_not_followed() {
        let mut fs = store::<u32>(1024);
        fs.write(1, b"x", FileType::Normal).unwrap();
        // point the sentinel's next past the end of the buffer
        let mut sentinel = fs.inode(16).unwrap();
        sentinel.next = 5000;
        fs.put_inode(16, &sentinel).unwrap();
        assert!(matches!(fs.inodes(), Err(FsError::Corrupt(_))));
        assert!(matches!(fs.compact(), Err(FsError::Corrupt(_))));
    }
}
