//! Snapshot entry tree.
//!
//! An [`Entry`] describes the state of a file, directory or symbolic link,
//! composed recursively. Absence is expressed as `Option<Entry>::None`.
//!
//! Entries are plain values with no back references. Published snapshots are
//! shared as `&Entry` or `Arc<Entry>`; only the exclusive owner of a copy can
//! call the `&mut self` primitives [`Entry::insert`] and [`Entry::remove`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use duosync_common::{join_path, Digest};

/// Kind discriminator for an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Directory,
    File,
    SymbolicLink,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntryKind::Directory => "directory",
            EntryKind::File => "file",
            EntryKind::SymbolicLink => "symbolic link",
        };
        f.write_str(name)
    }
}

/// A node in a snapshot tree.
///
/// Directory contents are kept in a `BTreeMap` so that iteration and
/// serialization follow a canonical order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Entry {
    /// A directory and its children, keyed by single-component names.
    Directory {
        #[serde(default)]
        contents: BTreeMap<String, Entry>,
    },
    /// A regular file.
    File {
        /// Digest of the file contents.
        digest: Digest,
        /// Whether the file carries the executable bit.
        #[serde(default)]
        executable: bool,
    },
    /// A symbolic link.
    SymbolicLink {
        /// Link target, stored verbatim.
        target: String,
    },
}

impl Entry {
    /// Create an empty directory entry.
    pub fn directory() -> Self {
        Entry::Directory {
            contents: BTreeMap::new(),
        }
    }

    /// Create a directory entry with the given children.
    pub fn directory_with<I, S>(children: I) -> Self
    where
        I: IntoIterator<Item = (S, Entry)>,
        S: Into<String>,
    {
        Entry::Directory {
            contents: children
                .into_iter()
                .map(|(name, entry)| (name.into(), entry))
                .collect(),
        }
    }

    /// Create a file entry.
    pub fn file(digest: Digest, executable: bool) -> Self {
        Entry::File { digest, executable }
    }

    /// Create a symbolic link entry.
    pub fn symlink(target: impl Into<String>) -> Self {
        Entry::SymbolicLink {
            target: target.into(),
        }
    }

    /// Get the entry kind.
    pub fn kind(&self) -> EntryKind {
        match self {
            Entry::Directory { .. } => EntryKind::Directory,
            Entry::File { .. } => EntryKind::File,
            Entry::SymbolicLink { .. } => EntryKind::SymbolicLink,
        }
    }

    /// Check if this is a directory.
    pub fn is_directory(&self) -> bool {
        matches!(self, Entry::Directory { .. })
    }

    /// Directory contents, or `None` for files and links.
    pub fn contents(&self) -> Option<&BTreeMap<String, Entry>> {
        match self {
            Entry::Directory { contents } => Some(contents),
            _ => None,
        }
    }

    /// Look up an immediate child by name.
    ///
    /// Returns `None` if this entry is not a directory or has no such child.
    pub fn find(&self, name: &str) -> Option<&Entry> {
        self.contents().and_then(|contents| contents.get(name))
    }

    /// Mutable counterpart of [`Entry::find`].
    pub fn find_mut(&mut self, name: &str) -> Option<&mut Entry> {
        match self {
            Entry::Directory { contents } => contents.get_mut(name),
            _ => None,
        }
    }

    /// Set or replace the child under `name`.
    ///
    /// Returns `false` without modifying anything if this entry is not a
    /// directory or `name` is not a single non-empty component. `.` and `..`
    /// are not valid names.
    pub fn insert(&mut self, name: &str, entry: Entry) -> bool {
        if name.is_empty() || name.contains('/') || name == "." || name == ".." {
            return false;
        }
        match self {
            Entry::Directory { contents } => {
                contents.insert(name.to_string(), entry);
                true
            }
            _ => false,
        }
    }

    /// Remove the child under `name`, reporting whether one existed.
    pub fn remove(&mut self, name: &str) -> bool {
        match self {
            Entry::Directory { contents } => contents.remove(name).is_some(),
            _ => false,
        }
    }

    /// Produce a deep, independent copy of this subtree.
    ///
    /// Equivalent to `clone()`; spelled out where the intent is to obtain a
    /// tree that is exclusively owned and about to be mutated.
    pub fn copy(&self) -> Entry {
        self.clone()
    }

    /// Resolve a `/`-joined path relative to this entry.
    ///
    /// The empty path resolves to `self`.
    pub fn get(&self, path: &str) -> Option<&Entry> {
        if path.is_empty() {
            return Some(self);
        }
        path.split('/')
            .try_fold(self, |current, component| current.find(component))
    }

    /// Total number of entries in this subtree, including `self`.
    pub fn count(&self) -> usize {
        match self {
            Entry::Directory { contents } => 1 + contents.values().map(Entry::count).sum::<usize>(),
            _ => 1,
        }
    }

    /// All entries of this subtree with their paths, depth first, parents
    /// before children, siblings in canonical order.
    pub fn walk(&self) -> Vec<(String, &Entry)> {
        let mut out = Vec::with_capacity(self.count());
        walk_into(String::new(), self, &mut out);
        out
    }
}

fn walk_into<'a>(path: String, entry: &'a Entry, out: &mut Vec<(String, &'a Entry)>) {
    let children = entry.contents();
    out.push((path.clone(), entry));
    if let Some(contents) = children {
        for (name, child) in contents {
            walk_into(join_path(&path, name), child, out);
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use proptest::prelude::*;

    /// File entry whose digest is derived from a short label.
    pub fn file(label: &str) -> Entry {
        Entry::file(Digest::of(label.as_bytes()), false)
    }

    /// Arbitrary entry of any kind, drawn from a small name space so that
    /// independently generated trees overlap.
    pub fn arb_entry() -> impl Strategy<Value = Entry> {
        let leaf = prop_oneof![
            (prop::array::uniform32(0u8..4), any::<bool>())
                .prop_map(|(bytes, executable)| Entry::file(Digest::from_bytes(bytes), executable)),
            "[a-c]{1,3}".prop_map(Entry::symlink),
        ];
        leaf.prop_recursive(4, 48, 4, |inner| {
            prop::collection::btree_map("[a-d]", inner, 0..4)
                .prop_map(|contents| Entry::Directory { contents })
        })
    }

    /// Arbitrary tree whose root is a directory.
    pub fn arb_root() -> impl Strategy<Value = Entry> {
        prop::collection::btree_map("[a-d]", arb_entry(), 0..5)
            .prop_map(|contents| Entry::Directory { contents })
    }
}
