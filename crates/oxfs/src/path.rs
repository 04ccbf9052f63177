//! Non-allocating decomposition of `/`-delimited paths.

use alloc::string::ToString;

use crate::error::{FsError, Result};

/// Walks the components of a path. Empty components (a leading `/`,
/// doubled or trailing slashes) are skipped.
#[derive(Debug, Clone)]
pub struct PathIterator<'a> {
    path: &'a str,
    pos: usize,
}

impl<'a> PathIterator<'a> {
    pub fn new(path: &'a str) -> Self {
        Self { path, pos: 0 }
    }

    /// Iterates over at most the first `max_len` bytes of `path`.
    pub fn with_max_len(path: &'a str, max_len: usize) -> Self {
        let mut end = max_len.min(path.len());
        while !path.is_char_boundary(end) {
            end -= 1;
        }
        Self::new(&path[..end])
    }

    /// Bounds of the next non-empty component at or after `from`.
    fn component_at(&self, from: usize) -> Option<(usize, usize)> {
        let rest = self.path.get(from..)?;
        let skipped = rest.len() - rest.trim_start_matches('/').len();
        let start = from + skipped;
        if start >= self.path.len() {
            return None;
        }
        let len = self.path[start..].find('/').unwrap_or(self.path.len() - start);
        Some((start, start + len))
    }

    pub fn has_next(&self) -> bool {
        self.component_at(self.pos).is_some()
    }

    /// Copies the next component into `out`, returning its length, or
    /// `None` once the path is exhausted. Nothing is consumed when `out`
    /// is too small.
    pub fn next_into(&mut self, out: &mut [u8]) -> Result<Option<usize>> {
        let (start, end) = match self.component_at(self.pos) {
            Some(bounds) => bounds,
            None => return Ok(None),
        };
        let component = &self.path.as_bytes()[start..end];
        let dst = out
            .get_mut(..component.len())
            .ok_or_else(|| FsError::InvalidPath(self.path.to_string()))?;
        dst.copy_from_slice(component);
        self.pos = end;
        Ok(Some(component.len()))
    }

    /// Everything up to and including the last `/`, or `None` if the path
    /// has no `/`.
    pub fn dir_path(&self) -> Option<&'a str> {
        let idx = self.path.rfind('/')?;
        Some(&self.path[..=idx])
    }

    /// Everything after the last `/`; the whole path if it has none.
    pub fn file_name(&self) -> &'a str {
        match self.path.rfind('/') {
            Some(idx) => &self.path[idx + 1..],
            None => self.path,
        }
    }
}

impl<'a> Iterator for PathIterator<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        let (start, end) = self.component_at(self.pos)?;
        self.pos = end;
        Some(&self.path[start..end])
    }
}

/// Splits a path into its parent directory and final component, ignoring
/// trailing slashes. Paths are rooted at `/` whether or not they start
/// with one. Fails when there is no final component.
pub fn split_parent(path: &str) -> Result<(&str, &str)> {
    let trimmed = path.trim_end_matches('/');
    let it = PathIterator::new(trimmed);
    let name = it.file_name();
    if name.is_empty() {
        return Err(FsError::InvalidPath(path.to_string()));
    }
    Ok((it.dir_path().unwrap_or("/"), name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    fn components(path: &str) -> Vec<&str> {
        PathIterator::new(path).collect()
    }

    #[test]
    fn absolute_and_relative_components() {
        assert_eq!(components("/usr/share/charset.gbag"), ["usr", "share", "charset.gbag"]);
        assert_eq!(components("usr/share/charset.gbag"), ["usr", "share", "charset.gbag"]);
        assert_eq!(components("/usr/share/"), ["usr", "share"]);
        assert_eq!(components("usr/share/"), ["usr", "share"]);
        assert_eq!(components("//a///b"), ["a", "b"]);
        assert!(components("/").is_empty());
        assert!(components("").is_empty());
    }

    #[test]
    fn has_next_peeks() {
        let mut it = PathIterator::new("/usr/");
        assert!(it.has_next());
        assert!(it.has_next());
        assert_eq!(it.next(), Some("usr"));
        assert!(!it.has_next());
        assert_eq!(it.next(), None);
    }

    #[test]
    fn next_into_reports_small_buffers() {
        let mut it = PathIterator::new("/usr/share");
        let mut tiny = [0u8; 3];
        assert_eq!(it.next_into(&mut tiny).unwrap(), Some(3));
        assert_eq!(&tiny, b"usr");
        assert!(matches!(it.next_into(&mut tiny), Err(FsError::InvalidPath(_))));
        let mut buf = [0u8; 16];
        assert_eq!(it.next_into(&mut buf).unwrap(), Some(5));
        assert_eq!(&buf[..5], b"share");
        assert_eq!(it.next_into(&mut buf).unwrap(), None);
    }

    #[test]
    fn dir_path_and_file_name() {
        let it = PathIterator::new("/usr/share/charset.gbag");
        assert_eq!(it.dir_path(), Some("/usr/share/"));
        assert_eq!(it.file_name(), "charset.gbag");

        let it = PathIterator::new("/usr");
        assert_eq!(it.dir_path(), Some("/"));
        assert_eq!(it.file_name(), "usr");

        let it = PathIterator::new("usr");
        assert_eq!(it.dir_path(), None);
        assert_eq!(it.file_name(), "usr");
    }

    #[test]
    fn max_len_truncates_view() {
        let it = PathIterator::with_max_len("/usr/share/charset.gbag", 10);
        assert_eq!(it.collect::<Vec<_>>(), ["usr", "share"]);
        // never splits a multi-byte character
        let it = PathIterator::with_max_len("/é", 2);
        assert!(it.collect::<Vec<_>>().is_empty());
    }

    #[test]
    fn split_parent_handles_trailing_slashes() {
        assert_eq!(split_parent("/a/b/c").unwrap(), ("/a/b/", "c"));
        assert_eq!(split_parent("/a/").unwrap(), ("/", "a"));
        assert_eq!(split_parent("relative").unwrap(), ("/", "relative"));
        assert!(split_parent("/").is_err());
        assert!(split_parent("").is_err());
    }
}
