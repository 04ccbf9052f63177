//! Id index.
//!
//! A treap threaded through the `left`/`right` fields of the inode records:
//! ordered by id as a binary search tree, and heap ordered by a priority
//! derived from the id. The priority is a pure function of the id, so the
//! shape needs no extra on-volume field and is the same for any insertion
//! order. Expected depth is logarithmic even for sequential ids.

use core::cmp::Ordering;

use log::error;

use super::FileStore;
use crate::error::{FsError, Result};
use crate::offset::{Offset, Storage};

/// splitmix64 finalizer.
fn priority(id: u64) -> u64 {
    let mut z = id.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

impl<W: Offset, B: Storage> FileStore<W, B> {
    /// Offset of the record with the given id.
    pub(crate) fn find(&self, id: u64) -> Result<Option<u64>> {
        let limit = self.max_records();
        let mut current = self.header.root_inode.to_u64();
        let mut depth = 0;
        while current != 0 {
            depth += 1;
            if depth > limit {
                return Err(FsError::Corrupt("id index contains a cycle"));
            }
            let node = self.inode(current)?;
            current = match id.cmp(&node.id.to_u64()) {
                Ordering::Less => node.left.to_u64(),
                Ordering::Greater => node.right.to_u64(),
                Ordering::Equal => return Ok(Some(current)),
            };
        }
        Ok(None)
    }

    pub(super) fn tree_insert(&mut self, off: u64) -> Result<()> {
        let id = self.inode(off)?.id.to_u64();
        let root = self.header.root_inode.to_u64();
        let new_root = self.insert_at(root, off, id)?;
        self.header.root_inode = W::narrow(new_root)?;
        self.sync_header()
    }

    /// Detaches the record with `id` from the subtree at `root`. Returns the
    /// new subtree root and the detached record's offset.
    pub(super) fn tree_remove(&mut self, root: u64, id: u64) -> Result<(u64, Option<u64>)> {
        if root == 0 {
            return Ok((0, None));
        }
        let node = self.inode(root)?;
        match id.cmp(&node.id.to_u64()) {
            Ordering::Less => {
                let (child, removed) = self.tree_remove(node.left.to_u64(), id)?;
                if removed.is_some() {
                    let child = W::narrow(child)?;
                    self.update_inode(root, |n| n.left = child)?;
                }
                Ok((root, removed))
            }
            Ordering::Greater => {
                let (child, removed) = self.tree_remove(node.right.to_u64(), id)?;
                if removed.is_some() {
                    let child = W::narrow(child)?;
                    self.update_inode(root, |n| n.right = child)?;
                }
                Ok((root, removed))
            }
            Ordering::Equal => {
                let merged = self.merge(node.left.to_u64(), node.right.to_u64())?;
                Ok((merged, Some(root)))
            }
        }
    }

    /// Points whichever link refers to the record at `old` (a child link or
    /// the root) at `new`. The record itself has not moved yet.
    pub(super) fn tree_relink(&mut self, id: u64, old: u64, new: u64) -> Result<()> {
        let new_w = W::narrow(new)?;
        let mut current = self.header.root_inode.to_u64();
        if current == old {
            self.header.root_inode = new_w;
            return self.sync_header();
        }
        let limit = self.max_records();
        let mut depth = 0;
        while current != 0 && depth <= limit {
            depth += 1;
            let node = self.inode(current)?;
            let go_left = id < node.id.to_u64();
            let child = if go_left { node.left.to_u64() } else { node.right.to_u64() };
            if child == old {
                return self.update_inode(current, |n| {
                    if go_left {
                        n.left = new_w;
                    } else {
                        n.right = new_w;
                    }
                });
            }
            current = child;
        }
        error!("Inode {} at offset {} has no parent in the id index", id, old);
        Err(FsError::Corrupt("inode missing from id index"))
    }

    /// Number of records reachable from the index root.
    pub(super) fn index_len(&self) -> Result<usize> {
        let root = self.header.root_inode.to_u64();
        let mut stack = alloc::vec![(root, 0u64, u64::MAX)];
        let limit = self.max_records();
        let mut count = 0;
        while let Some((off, low, high)) = stack.pop() {
            if off == 0 {
                continue;
            }
            count += 1;
            if count > limit {
                return Err(FsError::Corrupt("id index contains a cycle"));
            }
            let node = self.inode(off)?;
            let id = node.id.to_u64();
            if id < low || id > high {
                return Err(FsError::Corrupt("id index out of order"));
            }
            for child in [node.left.to_u64(), node.right.to_u64()] {
                if child != 0 && self.outranks(child, off)? {
                    return Err(FsError::Corrupt("id index priority order violated"));
                }
            }
            stack.push((node.left.to_u64(), low, id.saturating_sub(1)));
            stack.push((node.right.to_u64(), id.saturating_add(1), high));
        }
        Ok(count)
    }

    /// Depth of the index, for diagnostics.
    pub fn index_depth(&self) -> Result<usize> {
        let mut stack = alloc::vec![(self.header.root_inode.to_u64(), 1usize)];
        let mut deepest = 0;
        let limit = self.max_records();
        while let Some((off, depth)) = stack.pop() {
            if off == 0 {
                continue;
            }
            if depth > limit {
                return Err(FsError::Corrupt("id index contains a cycle"));
            }
            deepest = deepest.max(depth);
            let node = self.inode(off)?;
            stack.push((node.left.to_u64(), depth + 1));
            stack.push((node.right.to_u64(), depth + 1));
        }
        Ok(deepest)
    }

    fn insert_at(&mut self, root: u64, off: u64, id: u64) -> Result<u64> {
        if root == 0 {
            return Ok(off);
        }
        let node = self.inode(root)?;
        match id.cmp(&node.id.to_u64()) {
            Ordering::Less => {
                let child = self.insert_at(node.left.to_u64(), off, id)?;
                let child_w = W::narrow(child)?;
                self.update_inode(root, |n| n.left = child_w)?;
                if self.outranks(child, root)? {
                    return self.rotate_right(root);
                }
            }
            Ordering::Greater => {
                let child = self.insert_at(node.right.to_u64(), off, id)?;
                let child_w = W::narrow(child)?;
                self.update_inode(root, |n| n.right = child_w)?;
                if self.outranks(child, root)? {
                    return self.rotate_left(root);
                }
            }
            Ordering::Equal => return Err(FsError::Collision(id)),
        }
        Ok(root)
    }

    fn merge(&mut self, a: u64, b: u64) -> Result<u64> {
        if a == 0 {
            return Ok(b);
        }
        if b == 0 {
            return Ok(a);
        }
        if self.outranks(a, b)? {
            let right = self.inode(a)?.right.to_u64();
            let merged = W::narrow(self.merge(right, b)?)?;
            self.update_inode(a, |n| n.right = merged)?;
            Ok(a)
        } else {
            let left = self.inode(b)?.left.to_u64();
            let merged = W::narrow(self.merge(a, left)?)?;
            self.update_inode(b, |n| n.left = merged)?;
            Ok(b)
        }
    }

    fn rotate_right(&mut self, off: u64) -> Result<u64> {
        let node = self.inode(off)?;
        let pivot = node.left.to_u64();
        let pivot_right = self.inode(pivot)?.right;
        let off_w = W::narrow(off)?;
        self.update_inode(off, |n| n.left = pivot_right)?;
        self.update_inode(pivot, |n| n.right = off_w)?;
        Ok(pivot)
    }

    fn rotate_left(&mut self, off: u64) -> Result<u64> {
        let node = self.inode(off)?;
        let pivot = node.right.to_u64();
        let pivot_left = self.inode(pivot)?.left;
        let off_w = W::narrow(off)?;
        self.update_inode(off, |n| n.right = pivot_left)?;
        self.update_inode(pivot, |n| n.left = off_w)?;
        Ok(pivot)
    }

    /// Whether the record at `a` belongs above the record at `b`.
    fn outranks(&self, a: u64, b: u64) -> Result<bool> {
        let a = self.inode(a)?.id.to_u64();
        let b = self.inode(b)?.id.to_u64();
        Ok((priority(a), a) > (priority(b), b))
    }
}

#[cfg(test)]
mod tests {
    use crate::inode::FileType;
    use crate::store::FileStore;
    use alloc::vec;

    #[test]
    fn sequential_ids_stay_shallow() {
        let mut fs = FileStore::<u32>::format(vec![0u8; 65_536], 65_536).unwrap();
        for id in 1..=1000u64 {
            fs.write(id, &[], FileType::Normal).unwrap();
        }
        fs.verify().unwrap();
        // a degenerate tree would be 1000 deep
        assert!(fs.index_depth().unwrap() < 50);
    }

    #[test]
    fn removing_interior_nodes_keeps_order() {
        let mut fs = FileStore::<u16>::format(vec![0u8; 8192], 8192).unwrap();
        for id in [50u64, 20, 80, 10, 30, 70, 90, 25, 35] {
            fs.write(id, &id.to_be_bytes(), FileType::Normal).unwrap();
        }
        for id in [20u64, 50, 35] {
            fs.remove(id).unwrap();
            fs.verify().unwrap();
        }
        for id in [80u64, 10, 30, 70, 90, 25] {
            assert_eq!(fs.read(id).unwrap(), id.to_be_bytes());
        }
        assert_eq!(fs.inodes().unwrap().len(), 6);
    }

    #[test]
    fn shape_is_independent_of_insertion_order() {
        let ids = [5u64, 3, 9, 1, 7, 2, 8];
        let mut a = FileStore::<u32>::format(vec![0u8; 2048], 2048).unwrap();
        let mut b = FileStore::<u32>::format(vec![0u8; 2048], 2048).unwrap();
        for id in ids {
            a.write(id, &[], FileType::Normal).unwrap();
        }
        for id in ids.iter().rev() {
            b.write(*id, &[], FileType::Normal).unwrap();
        }
        assert_eq!(a.index_depth().unwrap(), b.index_depth().unwrap());
        let root_id = |fs: &FileStore<u32>| {
            let root = fs.header.root_inode as u64;
            fs.inode(root).unwrap().id
        };
        assert_eq!(root_id(&a), root_id(&b));
    }
}
