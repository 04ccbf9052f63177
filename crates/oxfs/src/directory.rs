//! Directory payloads.
//!
//! ```text
//! +-----------+-------------+----------+------+-----+----------+-----
//! | byte_size | child_count | inode id | name | NUL | inode id | ...
//! +-----------+-------------+----------+------+-----+----------+-----
//! ```
//!
//! Every integer is `W` wide and big-endian. `byte_size` is the length of
//! the whole payload including its header. Entries keep insertion order.

use alloc::string::ToString;
use alloc::vec::Vec;

use crate::config::MAX_NAME_LEN;
use crate::error::{FsError, Result};
use crate::offset::Offset;

/// Length of the `{byte_size, child_count}` prefix.
pub fn header_len<W: Offset>() -> usize {
    2 * W::WIDTH
}

/// Bytes one entry named `name` adds to a payload.
pub fn entry_len<W: Offset>(name: &str) -> usize {
    W::WIDTH + name.len() + 1
}

/// Payload of a directory with no entries.
pub fn empty<W: Offset>() -> Result<Vec<u8>> {
    let mut out = alloc::vec![0u8; header_len::<W>()];
    write_header::<W>(&mut out, 0)?;
    Ok(out)
}

/// Payload holding `entries` in the given order.
pub fn encode<W: Offset>(entries: &[(u64, &str)]) -> Result<Vec<u8>> {
    let len = header_len::<W>()
        + entries
            .iter()
            .map(|(_, name)| entry_len::<W>(name))
            .sum::<usize>();
    let mut out = Vec::with_capacity(len);
    out.resize(header_len::<W>(), 0);
    for &(inode, name) in entries {
        validate_name(name)?;
        let id = W::from_u64(inode).ok_or(FsError::InvalidInode(inode))?;
        let start = out.len();
        out.resize(start + W::WIDTH, 0);
        id.write_be(&mut out[start..])
            .ok_or(FsError::Corrupt("directory entry"))?;
        out.extend_from_slice(name.as_bytes());
        out.push(0);
    }
    write_header::<W>(&mut out, entries.len() as u64)?;
    Ok(out)
}

pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > MAX_NAME_LEN || name.contains(['/', '\0']) {
        return Err(FsError::InvalidPath(name.to_string()));
    }
    Ok(())
}

/// A borrowed, validated directory payload.
#[derive(Debug, Clone, Copy)]
pub struct Directory<'a, W> {
    bytes: &'a [u8],
    count: u64,
    _width: core::marker::PhantomData<W>,
}

/// One entry of a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry<'a> {
    pub inode: u64,
    pub name: &'a str,
    /// Byte range of the entry within the payload.
    pub start: usize,
    pub end: usize,
}

impl<'a, W: Offset> Directory<'a, W> {
    /// Checks the prefix against the payload length and every entry for a
    /// terminator, so iteration afterwards cannot run off the end.
    pub fn parse(bytes: &'a [u8]) -> Result<Self> {
        let hdr = header_len::<W>();
        if bytes.len() < hdr {
            return Err(FsError::Corrupt("directory payload shorter than its header"));
        }
        let byte_size = W::read_be(bytes).ok_or(FsError::Corrupt("directory header"))?;
        let count = W::read_be(&bytes[W::WIDTH..]).ok_or(FsError::Corrupt("directory header"))?;
        if byte_size.to_u64() != bytes.len() as u64 {
            return Err(FsError::Corrupt("directory size does not match payload"));
        }
        let dir = Self {
            bytes,
            count: count.to_u64(),
            _width: core::marker::PhantomData,
        };
        let mut seen = 0u64;
        let mut pos = hdr;
        while pos < bytes.len() {
            pos = dir.entry_at(pos)?.end;
            seen += 1;
        }
        if seen != dir.count {
            return Err(FsError::Corrupt("directory entry count does not match payload"));
        }
        Ok(dir)
    }

    pub fn len(&self) -> usize {
        self.count as usize
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn entries(&self) -> Entries<'a, W> {
        Entries {
            dir: *self,
            pos: header_len::<W>(),
        }
    }

    pub fn find(&self, name: &str) -> Option<Entry<'a>> {
        self.entries().find(|e| e.name == name)
    }

    /// Copy of the payload with one more entry appended.
    pub fn with_entry(&self, inode: u64, name: &str) -> Result<Vec<u8>> {
        validate_name(name)?;
        let id = W::from_u64(inode).ok_or(FsError::InvalidInode(inode))?;
        let mut out = Vec::with_capacity(self.bytes.len() + entry_len::<W>(name));
        out.extend_from_slice(self.bytes);
        let start = out.len();
        out.resize(start + W::WIDTH, 0);
        id.write_be(&mut out[start..])
            .ok_or(FsError::Corrupt("directory entry"))?;
        out.extend_from_slice(name.as_bytes());
        out.push(0);
        write_header::<W>(&mut out, self.count + 1)?;
        Ok(out)
    }

    /// Copy of the payload with the entry `name` cut out, and the id it
    /// referred to.
    pub fn without_entry(&self, name: &str) -> Result<(Vec<u8>, u64)> {
        let entry = self
            .find(name)
            .ok_or_else(|| FsError::PathNotFound(name.to_string()))?;
        let mut out = Vec::with_capacity(self.bytes.len() - (entry.end - entry.start));
        out.extend_from_slice(&self.bytes[..entry.start]);
        out.extend_from_slice(&self.bytes[entry.end..]);
        write_header::<W>(&mut out, self.count - 1)?;
        Ok((out, entry.inode))
    }

    /// Copy of the payload with entry `name` pointing at `inode`.
    pub fn retarget(&self, name: &str, inode: u64) -> Result<Vec<u8>> {
        let entry = self
            .find(name)
            .ok_or_else(|| FsError::PathNotFound(name.to_string()))?;
        let id = W::from_u64(inode).ok_or(FsError::InvalidInode(inode))?;
        let mut out = self.bytes.to_vec();
        id.write_be(&mut out[entry.start..])
            .ok_or(FsError::Corrupt("directory entry"))?;
        Ok(out)
    }

    fn entry_at(&self, pos: usize) -> Result<Entry<'a>> {
        let rest = &self.bytes[pos..];
        let inode = W::read_be(rest).ok_or(FsError::Corrupt("directory entry truncated"))?;
        let name_bytes = &rest[W::WIDTH..];
        let nul = name_bytes
            .iter()
            .position(|&b| b == 0)
            .ok_or(FsError::Corrupt("directory entry name not terminated"))?;
        let name = core::str::from_utf8(&name_bytes[..nul])
            .map_err(|_| FsError::Corrupt("directory entry name is not UTF-8"))?;
        Ok(Entry {
            inode: inode.to_u64(),
            name,
            start: pos,
            end: pos + W::WIDTH + nul + 1,
        })
    }
}

pub struct Entries<'a, W> {
    dir: Directory<'a, W>,
    pos: usize,
}

impl<'a, W: Offset> Iterator for Entries<'a, W> {
    type Item = Entry<'a>;

    fn next(&mut self) -> Option<Entry<'a>> {
        if self.pos >= self.dir.bytes.len() {
            return None;
        }
        // parse() already walked every entry
        let entry = self.dir.entry_at(self.pos).ok()?;
        self.pos = entry.end;
        Some(entry)
    }
}

fn write_header<W: Offset>(out: &mut [u8], count: u64) -> Result<()> {
    let size = W::from_u64(out.len() as u64).ok_or(FsError::OutOfSpace {
        needed: out.len() as u64,
        available: W::MAX,
    })?;
    let count = W::narrow(count)?;
    size.write_be(out).ok_or(FsError::Corrupt("directory header"))?;
    count
        .write_be(&mut out[W::WIDTH..])
        .ok_or(FsError::Corrupt("directory header"))
}
