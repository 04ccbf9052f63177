//! Path namespace on top of the inode store.
//!
//! Directories are ordinary inodes whose payload is a list of
//! `(inode id, name)` entries (see `directory.rs`). The tree starts at
//! [`INODE_ROOT_DIR`]. Inode ids are drawn at random from outside the
//! reserved range, so a file keeps its id across renames.

use alloc::collections::BTreeSet;
use alloc::string::{String, ToString};
use alloc::vec;
use alloc::vec::Vec;

use log::{debug, error, info, warn};

use crate::config::{FormatOptions, INODE_RANDOM, INODE_RESERVED_END, INODE_ROOT_DIR};
use crate::directory::{self, Directory};
use crate::error::{FsError, Result};
use crate::inode::FileType;
use crate::offset::{Offset, StoreType, Storage};
use crate::path::{split_parent, PathIterator};
use crate::random::Random;
use crate::store::{FileStat, FileStore, WalkRecord};
use crate::undo::{Step, UndoLog};
use crate::volume::Volume;

/// Draws before [`FileSystem::generate_inode_id`] gives up.
const MAX_ID_ATTEMPTS: usize = 4096;

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryListing {
    pub name: String,
    pub stat: FileStat,
}

pub struct FileSystem<W, B = Vec<u8>> {
    store: FileStore<W, B>,
    rng: Random,
}

pub type FileSystem16<B = Vec<u8>> = FileSystem<u16, B>;
pub type FileSystem32<B = Vec<u8>> = FileSystem<u32, B>;
pub type FileSystem64<B = Vec<u8>> = FileSystem<u64, B>;

impl<W: Offset, B: Storage> FileSystem<W, B> {
    /// Formats `buf` and seeds the id generator. With
    /// `options.directories` the root directory is created holding `.` and
    /// `..`, both pointing at itself.
    pub fn format(buf: B, size: u64, options: FormatOptions) -> Result<Self> {
        let store = FileStore::format(buf, size)?;
        let mut fs = Self {
            store,
            rng: Random::new(options.seed),
        };
        fs.persist_seed()?;
        if options.directories {
            let root = directory::encode::<W>(&[(INODE_ROOT_DIR, "."), (INODE_ROOT_DIR, "..")])?;
            fs.store.write(INODE_ROOT_DIR, &root, FileType::Directory)?;
            fs.store.set_refs(INODE_ROOT_DIR, 2)?;
        }
        info!(
            "Formatted {}-bit volume of {} bytes (directories: {})",
            W::STORE_TYPE.bits(),
            size,
            options.directories
        );
        Ok(fs)
    }

    pub fn open(buf: B) -> Result<Self> {
        let store = FileStore::open(buf)?;
        let rng = match store.payload(INODE_RANDOM) {
            Ok(bytes) if bytes.len() == Random::SIZE => Random::from_bytes(bytes)?,
            Ok(bytes) => {
                warn!("Id generator state has {} bytes, using the default seed", bytes.len());
                Random::default()
            }
            Err(e) if e.is_not_found() => Random::default(),
            Err(e) => return Err(e),
        };
        Ok(Self { store, rng })
    }

    pub fn store(&self) -> &FileStore<W, B> {
        &self.store
    }

    pub fn into_inner(self) -> B {
        self.store.into_inner()
    }

    pub fn store_type(&self) -> StoreType {
        W::STORE_TYPE
    }

    pub fn size(&self) -> u64 {
        self.store.size()
    }

    pub fn mem_used(&self) -> u64 {
        self.store.mem_used()
    }

    pub fn available(&self) -> u64 {
        self.store.available()
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.store.as_bytes()
    }

    /// Resolves `path` to an inode id. `/` is the root directory.
    pub fn find_inode_of(&self, path: &str) -> Result<u64> {
        self.resolve(path, |_| {})
    }

    /// Creates an empty directory and returns its id.
    pub fn mkdir(&mut self, path: &str) -> Result<u64> {
        let (parent_path, name) = split_parent(path)?;
        directory::validate_name(name)?;
        self.ensure_absent(path)?;
        let parent = self.find_inode_of(parent_path)?;
        self.directory_payload(parent, parent_path)?;

        let id = self.generate_inode_id()?;
        let mut log = UndoLog::new();
        match self.mkdir_steps(parent, name, id, &mut log) {
            Ok(()) => {
                debug!("mkdir {} -> inode {}", path, id);
                Ok(id)
            }
            Err(e) => {
                self.rollback(log);
                Err(e)
            }
        }
    }

    fn mkdir_steps(&mut self, parent: u64, name: &str, id: u64, log: &mut UndoLog) -> Result<()> {
        self.store
            .write(id, &directory::empty::<W>()?, FileType::Directory)?;
        log.record(Step::Created(id));
        for (entry, target) in [(".", id), ("..", parent)] {
            self.link(id, entry, target)?;
            log.record(Step::Linked {
                dir: id,
                name: entry.to_string(),
            });
        }
        self.link(parent, name, id)?;
        log.record(Step::Linked {
            dir: parent,
            name: name.to_string(),
        });
        Ok(())
    }

    /// Writes `data` to the file at `path`, creating it in its parent
    /// directory if needed. Returns the file's inode id.
    pub fn write(&mut self, path: &str, data: &[u8], file_type: FileType) -> Result<u64> {
        match self.find_inode_of(path) {
            Ok(id) => {
                if self.store.stat(id)?.file_type == FileType::Directory
                    && file_type != FileType::Directory
                {
                    return Err(FsError::IsADirectory(path.to_string()));
                }
                self.store.write(id, data, file_type)?;
                debug!("Rewrote {} (inode {}, {} bytes)", path, id, data.len());
                return Ok(id);
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        let (parent_path, name) = split_parent(path)?;
        directory::validate_name(name)?;
        let parent = self.find_inode_of(parent_path)?;
        self.directory_payload(parent, parent_path)?;

        let id = self.generate_inode_id()?;
        let mut log = UndoLog::new();
        match self.create_steps(parent, name, id, data, file_type, &mut log) {
            Ok(()) => {
                debug!("Created {} (inode {}, {} bytes)", path, id, data.len());
                Ok(id)
            }
            Err(e) => {
                self.rollback(log);
                Err(e)
            }
        }
    }

    fn create_steps(
        &mut self,
        parent: u64,
        name: &str,
        id: u64,
        data: &[u8],
        file_type: FileType,
        log: &mut UndoLog,
    ) -> Result<()> {
        // placeholder so the entry has something to point at
        self.store.write(id, &[], file_type)?;
        log.record(Step::Created(id));
        self.link(parent, name, id)?;
        log.record(Step::Linked {
            dir: parent,
            name: name.to_string(),
        });
        self.store.write(id, data, file_type)
    }

    /// Writes straight to an inode, bypassing the namespace.
    pub fn write_inode(&mut self, id: u64, data: &[u8], file_type: FileType) -> Result<()> {
        self.store.write(id, data, file_type)?;
        if id == INODE_RANDOM && data.len() == Random::SIZE {
            self.rng = Random::from_bytes(data)?;
        }
        Ok(())
    }

    pub fn read(&self, path: &str) -> Result<Vec<u8>> {
        let id = self.find_inode_of(path)?;
        self.store.read(id)
    }

    pub fn read_inode(&self, id: u64) -> Result<Vec<u8>> {
        self.store.read(id)
    }

    pub fn read_range(&self, id: u64, offset: u64, out: &mut [u8]) -> Result<usize> {
        self.store.read_range(id, offset, out)
    }

    pub fn stat(&self, path: &str) -> Result<FileStat> {
        let id = self.find_inode_of(path)?;
        self.store.stat(id)
    }

    pub fn stat_inode(&self, id: u64) -> Result<FileStat> {
        self.store.stat(id)
    }

    /// Entries of the directory at `path` in insertion order.
    pub fn ls(&self, path: &str) -> Result<Vec<DirectoryListing>> {
        let dir = self.find_inode_of(path)?;
        let payload = self.directory_payload(dir, path)?;
        let listing = Directory::<W>::parse(payload)?;
        let mut out = Vec::with_capacity(listing.len());
        for entry in listing.entries() {
            match self.store.stat(entry.inode) {
                Ok(stat) => out.push(DirectoryListing {
                    name: entry.name.to_string(),
                    stat,
                }),
                Err(e) if e.is_not_found() => {
                    warn!("{}: entry {} points at missing inode {}", path, entry.name, entry.inode)
                }
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    }

    /// Unlinks `path` and deletes its inode. Directories need `recursive`,
    /// and then everything below them is deleted too. The subtree is read
    /// and checked before anything is changed.
    pub fn remove(&mut self, path: &str, recursive: bool) -> Result<()> {
        let (parent_path, name) = split_entry(path)?;
        let mut chain = Vec::new();
        let id = self.resolve(path, |step| chain.push(step))?;
        let doomed = self.collect_subtree(id, recursive, path, &chain)?;
        let parent = self.find_inode_of(parent_path)?;
        self.unlink(parent, name)?;
        for id in doomed.iter().rev() {
            self.store.remove(*id)?;
        }
        debug!("Removed {} ({} inodes)", path, doomed.len());
        Ok(())
    }

    /// Deletes an inode by id without touching any directory that refers
    /// to it.
    pub fn remove_inode(&mut self, id: u64, recursive: bool) -> Result<()> {
        let doomed = self.collect_subtree(id, recursive, &id.to_string(), &[])?;
        for id in doomed.iter().rev() {
            self.store.remove(*id)?;
        }
        Ok(())
    }

    /// Moves the entry at `src` to `dest`. The inode and its payload are
    /// untouched; a moved directory's `..` follows it to the new parent.
    /// On failure every committed step is reversed.
    pub fn rename(&mut self, src: &str, dest: &str) -> Result<()> {
        let (src_parent_path, src_name) = split_entry(src)?;
        let (dest_parent_path, dest_name) = split_entry(dest)?;
        directory::validate_name(dest_name)?;
        let id = self.find_inode_of(src)?;
        self.ensure_absent(dest)?;
        let src_parent = self.find_inode_of(src_parent_path)?;
        let mut chain = Vec::new();
        let dest_parent = self.resolve(dest_parent_path, |step| chain.push(step))?;

        let is_dir = self.store.stat(id)?.file_type == FileType::Directory;
        if is_dir && chain.contains(&id) {
            return Err(FsError::InvalidPath(dest.to_string()));
        }

        let mut log = UndoLog::new();
        let moved = self.rename_steps(
            id,
            is_dir,
            (src_parent, src_name),
            (dest_parent, dest_name),
            &mut log,
        );
        if let Err(e) = moved {
            self.rollback(log);
            return Err(e);
        }
        debug!("Renamed {} -> {} (inode {})", src, dest, id);
        Ok(())
    }

    fn rename_steps(
        &mut self,
        id: u64,
        is_dir: bool,
        (src_parent, src_name): (u64, &str),
        (dest_parent, dest_name): (u64, &str),
        log: &mut UndoLog,
    ) -> Result<()> {
        self.link(dest_parent, dest_name, id)?;
        log.record(Step::Linked {
            dir: dest_parent,
            name: dest_name.to_string(),
        });
        if is_dir && src_parent != dest_parent {
            self.reparent(id, src_parent, dest_parent)?;
            log.record(Step::Reparented {
                dir: id,
                from: src_parent,
                to: dest_parent,
            });
        }
        self.unlink(src_parent, src_name)?;
        Ok(())
    }

    fn reparent(&mut self, dir: u64, old: u64, new: u64) -> Result<()> {
        let payload = {
            let listing = Directory::<W>::parse(self.store.payload(dir)?)?;
            if listing.find("..").is_none() {
                return Ok(());
            }
            listing.retarget("..", new)?
        };
        let file_type = self.store.stat(dir)?.file_type;
        self.store.write(dir, &payload, file_type)?;
        self.store.dec_refs(old)?;
        self.store.inc_refs(new)?;
        Ok(())
    }

    /// Deletes every directory inode, reachable or not. Returns how many
    /// were removed.
    pub fn strip_directories(&mut self) -> Result<usize> {
        let dirs: Vec<u64> = self
            .store
            .inodes()?
            .into_iter()
            .filter(|stat| stat.file_type == FileType::Directory)
            .map(|stat| stat.inode)
            .collect();
        for id in &dirs {
            self.store.remove(*id)?;
        }
        info!("Stripped {} directories", dirs.len());
        Ok(dirs.len())
    }

    /// Draws an unused id outside the reserved range and persists the
    /// advanced generator state.
    pub fn generate_inode_id(&mut self) -> Result<u64> {
        let mut found = None;
        for _ in 0..MAX_ID_ATTEMPTS {
            let id = self.rng.gen() & W::MAX;
            if id < INODE_RESERVED_END {
                continue;
            }
            match self.store.stat(id) {
                Ok(_) => {}
                Err(e) if e.is_not_found() => {
                    found = Some(id);
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        self.persist_seed()?;
        found.ok_or(FsError::IdsExhausted)
    }

    /// Adds an entry `name -> id` to the directory at `dir_path` and counts
    /// the new link on `id`. Directories cannot be linked a second time.
    pub fn insert_directory_entry(&mut self, dir_path: &str, name: &str, id: u64) -> Result<()> {
        directory::validate_name(name)?;
        if name == "." || name == ".." {
            return Err(FsError::InvalidPath(name.to_string()));
        }
        if self.store.stat(id)?.file_type == FileType::Directory {
            return Err(FsError::IsADirectory(name.to_string()));
        }
        let dir = self.find_inode_of(dir_path)?;
        self.link(dir, name, id)
    }

    /// Removes the entry for `path` from its parent and drops the link it
    /// held. Returns the id the entry pointed at.
    pub fn rm_directory_entry(&mut self, path: &str) -> Result<u64> {
        let (parent_path, name) = split_entry(path)?;
        let parent = self.find_inode_of(parent_path)?;
        self.unlink(parent, name)
    }

    pub fn set_links(&mut self, id: u64, links: u8) -> Result<()> {
        self.store.set_refs(id, links)
    }

    pub fn inodes(&self) -> Result<Vec<FileStat>> {
        self.store.inodes()
    }

    pub fn compact(&mut self) -> Result<()> {
        self.store.compact()
    }

    pub fn resize(&mut self, size: u64) -> Result<()> {
        self.store.resize(size)
    }

    pub fn expand(&mut self, size: u64) -> Result<()> {
        self.store.expand(size)
    }

    pub fn walk<F>(&self, f: F) -> Result<()>
    where
        F: FnMut(WalkRecord) -> Result<()>,
    {
        self.store.walk(f)
    }

    pub fn verify(&self) -> Result<()> {
        self.store.verify()
    }

    /// Copies every inode into `dest`. Directory payloads are re-encoded
    /// for the destination's offset width.
    pub fn dump_to(&self, dest: &mut dyn Volume) -> Result<()> {
        if dest.size() < self.size() {
            return Err(FsError::OutOfSpace {
                needed: self.size(),
                available: dest.size(),
            });
        }
        let mut copied = 0;
        for stat in self.store.inodes()? {
            let payload = self.store.payload(stat.inode)?;
            if stat.file_type == FileType::Directory {
                let listing = Directory::<W>::parse(payload)?;
                let entries: Vec<(u64, &str)> =
                    listing.entries().map(|e| (e.inode, e.name)).collect();
                dest.write_directory(stat.inode, &entries)?;
            } else {
                dest.write_inode(stat.inode, payload, stat.file_type)?;
            }
            dest.set_links(stat.inode, stat.links)?;
            copied += 1;
        }
        info!(
            "Copied {} inodes into {}-bit volume",
            copied,
            dest.store_type().bits()
        );
        Ok(())
    }

    /// Writes a directory inode holding `entries`.
    pub fn write_directory(&mut self, id: u64, entries: &[(u64, &str)]) -> Result<()> {
        let payload = directory::encode::<W>(entries)?;
        self.store.write(id, &payload, FileType::Directory)
    }

    fn resolve<F: FnMut(u64)>(&self, path: &str, mut visit: F) -> Result<u64> {
        let mut current = INODE_ROOT_DIR;
        visit(current);
        for name in PathIterator::new(path) {
            let payload = self.directory_payload(current, path)?;
            current = Directory::<W>::parse(payload)?
                .find(name)
                .map(|entry| entry.inode)
                .ok_or_else(|| FsError::PathNotFound(path.to_string()))?;
            visit(current);
        }
        Ok(current)
    }

    fn ensure_absent(&self, path: &str) -> Result<()> {
        match self.find_inode_of(path) {
            Ok(_) => Err(FsError::AlreadyExists(path.to_string())),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Payload of directory inode `dir`, reached via `path`.
    fn directory_payload(&self, dir: u64, path: &str) -> Result<&[u8]> {
        let stat = self.store.stat(dir).map_err(|e| match e {
            FsError::InodeNotFound(_) => FsError::PathNotFound(path.to_string()),
            other => other,
        })?;
        if stat.file_type != FileType::Directory {
            return Err(FsError::NotADirectory(path.to_string()));
        }
        if stat.size < directory::header_len::<W>() as u64 {
            return Err(FsError::Corrupt("directory payload shorter than its header"));
        }
        self.store.payload(dir)
    }

    fn link(&mut self, dir: u64, name: &str, id: u64) -> Result<()> {
        self.store.stat(id)?;
        let payload = {
            let listing = Directory::<W>::parse(self.directory_payload(dir, name)?)?;
            if listing.find(name).is_some() {
                return Err(FsError::AlreadyExists(name.to_string()));
            }
            listing.with_entry(id, name)?
        };
        self.store.write(dir, &payload, FileType::Directory)?;
        self.store.inc_refs(id)?;
        debug!("Linked {} -> inode {} in directory {}", name, id, dir);
        Ok(())
    }

    fn unlink(&mut self, dir: u64, name: &str) -> Result<u64> {
        let (payload, id) =
            Directory::<W>::parse(self.directory_payload(dir, name)?)?.without_entry(name)?;
        self.store.write(dir, &payload, FileType::Directory)?;
        match self.store.dec_refs(id) {
            Ok(_) => {}
            Err(e) if e.is_not_found() => {
                warn!("Unlinked {} from directory {}: inode {} was already gone", name, dir, id)
            }
            Err(e) => return Err(e),
        }
        debug!("Unlinked {} (inode {}) from directory {}", name, id, dir);
        Ok(id)
    }

    /// Ids to delete for inode `id`, parents before children. Dangling
    /// entries are skipped; `.` and `..` are never followed, and neither is
    /// any entry leading back to the root or to one of `ancestors`.
    fn collect_subtree(
        &self,
        id: u64,
        recursive: bool,
        path: &str,
        ancestors: &[u64],
    ) -> Result<Vec<u64>> {
        let stat = self.store.stat(id)?;
        if stat.file_type != FileType::Directory {
            return Ok(vec![id]);
        }
        if !recursive {
            return Err(FsError::IsADirectory(path.to_string()));
        }
        if id == INODE_ROOT_DIR {
            return Err(FsError::InvalidPath(path.to_string()));
        }

        let mut order = Vec::new();
        let mut seen: BTreeSet<u64> = ancestors.iter().copied().collect();
        seen.insert(INODE_ROOT_DIR);
        seen.insert(id);
        let mut pending = vec![id];
        while let Some(dir) = pending.pop() {
            order.push(dir);
            let listing = Directory::<W>::parse(self.store.payload(dir)?)?;
            for entry in listing.entries() {
                if entry.name == "." || entry.name == ".." || !seen.insert(entry.inode) {
                    continue;
                }
                match self.store.stat(entry.inode) {
                    Ok(child) if child.file_type == FileType::Directory => {
                        pending.push(entry.inode)
                    }
                    Ok(_) => order.push(entry.inode),
                    Err(e) if e.is_not_found() => warn!(
                        "Skipping entry {} of directory {}: inode {} is missing",
                        entry.name, dir, entry.inode
                    ),
                    Err(e) => return Err(e),
                }
            }
        }
        Ok(order)
    }

    fn rollback(&mut self, log: UndoLog) {
        if log.is_empty() {
            return;
        }
        for step in log.unwind() {
            let undone = match &step {
                Step::Created(id) => self.store.remove(*id),
                Step::Linked { dir, name } => self.unlink(*dir, name).map(|_| ()),
                Step::Reparented { dir, from, to } => self.reparent(*dir, *to, *from),
            };
            match undone {
                Ok(()) => warn!("Rolled back {:?}", step),
                Err(e) => error!("Could not roll back {:?}: {}", step, e),
            }
        }
    }

    fn persist_seed(&mut self) -> Result<()> {
        let bytes = self.rng.to_bytes()?;
        self.store.write(INODE_RANDOM, &bytes, FileType::Normal)
    }
}

/// Like [`split_parent`], but refuses a final `.` or `..`, which names a
/// directory other than the entry that would be touched.
fn split_entry(path: &str) -> Result<(&str, &str)> {
    let (parent, name) = split_parent(path)?;
    if name == "." || name == ".." {
        return Err(FsError::InvalidPath(path.to_string()));
    }
    Ok((parent, name))
}
