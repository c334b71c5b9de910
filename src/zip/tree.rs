//! Hierarchical view over the flat entry list.
//!
//! Every name is normalized and every ancestor directory is registered,
//! whether or not the archive stores a record for it. Entries are sorted by
//! (parent, base name), so the children of a directory are one contiguous
//! run found by binary search.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use chrono::{DateTime, FixedOffset};

use super::structures::FileHeader;

/// Name of the logical root.
pub const ROOT: &str = ".";

/// Normalize a stored entry name into a path inside the archive root.
///
/// Backslashes become slashes, `.` and `..` segments are resolved
/// lexically, and whatever would climb above the root is dropped. A name
/// that resolves to the root itself becomes `"."`.
pub fn normalize(name: &str) -> String {
    let name = name.replace('\\', "/");
    let mut parts: Vec<&str> = Vec::new();
    for part in name.split('/') {
        match part {
            "" | "." => {}
            ".." if parts.last().is_some_and(|last| *last != "..") => {
                parts.pop();
            }
            _ => parts.push(part),
        }
    }
    let escaping = parts.iter().take_while(|part| **part == "..").count();
    let cleaned = parts[escaping..].join("/");
    if cleaned.is_empty() {
        ROOT.to_owned()
    } else {
        cleaned
    }
}

/// Whether `path` is a well-formed query path: `"."`, or slash-separated
/// non-empty segments other than `.` and `..`, without leading or trailing
/// slashes.
pub fn valid_path(path: &str) -> bool {
    path == ROOT
        || (!path.is_empty()
            && path
                .split('/')
                .all(|part| !matches!(part, "" | "." | "..")))
}

/// Split a normalized path into (parent, base name). Top-level names have
/// the root as parent.
fn split(path: &str) -> (&str, &str) {
    path.rsplit_once('/').unwrap_or((ROOT, path))
}

#[derive(Debug, Clone)]
pub(crate) struct TreeEntry {
    name: String,
    /// Index into the archive's file list; `None` for synthesized directories.
    file: Option<usize>,
    is_dir: bool,
}

impl TreeEntry {
    fn key(&self) -> (&str, &str) {
        split(&self.name)
    }
}

#[derive(Debug)]
pub(crate) struct Tree {
    entries: Vec<TreeEntry>,
    root: TreeEntry,
}

impl Tree {
    pub(crate) fn build(files: &[FileHeader]) -> Self {
        let mut entries = Vec::with_capacity(files.len());
        let mut dirs = BTreeSet::new();

        for (index, file) in files.iter().enumerate() {
            let name = normalize(&file.name());
            if name == ROOT {
                continue;
            }
            let mut child = name.as_str();
            while let Some((parent, _)) = child.rsplit_once('/') {
                // ancestors of a known directory are already known
                if !dirs.insert(parent.to_owned()) {
                    break;
                }
                child = parent;
            }
            entries.push(TreeEntry {
                name,
                file: Some(index),
                is_dir: file.is_dir(),
            });
        }
        entries.extend(dirs.into_iter().map(|name| TreeEntry {
            name,
            file: None,
            is_dir: true,
        }));

        // On duplicate names directories win over files and stored records
        // win over synthesized ones.
        entries.sort_by(|a, b| {
            a.key()
                .cmp(&b.key())
                .then_with(|| b.is_dir.cmp(&a.is_dir))
                .then_with(|| a.file.is_none().cmp(&b.file.is_none()))
        });
        let before = entries.len();
        entries.dedup_by(|later, first| later.name == first.name);
        if entries.len() != before {
            tracing::warn!(dropped = before - entries.len(), "duplicate entry names");
        }

        Self {
            entries,
            root: TreeEntry {
                name: ROOT.to_owned(),
                file: None,
                is_dir: true,
            },
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn lookup<'a>(&'a self, path: &str, files: &'a [FileHeader]) -> Option<Entry<'a>> {
        if path == ROOT {
            return Some(Entry::new(&self.root, files));
        }
        if !valid_path(path) {
            return None;
        }
        let query = split(path);
        let i = self
            .entries
            .partition_point(|e| e.key().cmp(&query) == Ordering::Less);
        self.entries
            .get(i)
            .filter(|e| e.name == path)
            .map(|e| Entry::new(e, files))
    }

    /// Children of `dir`, which must be `"."` or a normalized path.
    pub(crate) fn list<'a>(&'a self, dir: &str, files: &'a [FileHeader]) -> ReadDir<'a> {
        let lo = self.entries.partition_point(|e| e.key().0 < dir);
        let hi = self.entries.partition_point(|e| e.key().0 <= dir);
        ReadDir {
            entries: &self.entries[lo..hi],
            files,
            cursor: 0,
        }
    }
}

/// A file or directory in the archive namespace.
#[derive(Debug, Clone, Copy)]
pub struct Entry<'a> {
    path: &'a str,
    header: Option<&'a FileHeader>,
    is_dir: bool,
}

impl<'a> Entry<'a> {
    fn new(entry: &'a TreeEntry, files: &'a [FileHeader]) -> Self {
        Self {
            path: &entry.name,
            header: entry.file.and_then(|i| files.get(i)),
            is_dir: entry.is_dir,
        }
    }

    /// Full normalized path; `"."` for the root.
    pub fn path(&self) -> &'a str {
        self.path
    }

    /// Last path segment.
    pub fn name(&self) -> &'a str {
        split(self.path).1
    }

    pub fn is_dir(&self) -> bool {
        self.is_dir
    }

    /// The stored record, absent for synthesized directories and the root.
    pub fn header(&self) -> Option<&'a FileHeader> {
        self.header
    }

    pub fn size(&self) -> u64 {
        match self.header {
            Some(h) if !self.is_dir => h.uncompressed_size,
            _ => 0,
        }
    }

    pub fn modified(&self) -> Option<DateTime<FixedOffset>> {
        self.header.map(|h| h.modified)
    }
}

/// Paginated listing of one directory.
#[derive(Debug, Clone)]
pub struct ReadDir<'a> {
    entries: &'a [TreeEntry],
    files: &'a [FileHeader],
    cursor: usize,
}

impl<'a> ReadDir<'a> {
    /// The next `n` children, or `None` once the listing is exhausted.
    /// `n == 0` returns everything left.
    pub fn next_page(&mut self, n: usize) -> Option<Vec<Entry<'a>>> {
        if self.cursor >= self.entries.len() {
            return None;
        }
        let end = if n == 0 {
            self.entries.len()
        } else {
            self.cursor.saturating_add(n).min(self.entries.len())
        };
        let page = self.entries[self.cursor..end]
            .iter()
            .map(|e| Entry::new(e, self.files))
            .collect();
        self.cursor = end;
        Some(page)
    }

    /// All children not yet returned.
    pub fn remaining(&mut self) -> Vec<Entry<'a>> {
        self.next_page(0).unwrap_or_default()
    }

    /// Total number of children, read or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> Iterator for ReadDir<'a> {
    type Item = Entry<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.entries.get(self.cursor)?;
        self.cursor += 1;
        Some(Entry::new(entry, self.files))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.entries.len().saturating_sub(self.cursor);
        (left, Some(left))
    }
}
