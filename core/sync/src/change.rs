//! Changes between entry values.

use serde::{Deserialize, Serialize};

use crate::entry::Entry;

/// A transition at a single tree path.
///
/// `new == None` deletes the entry at `path`; `Some` creates or replaces it.
/// `old` records the value the producer observed and is informational for
/// [`crate::apply::apply`]; [`crate::apply::apply_checked`] verifies it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    /// `/`-joined path; the empty string is the root.
    pub path: String,
    pub old: Option<Entry>,
    pub new: Option<Entry>,
}

impl Change {
    /// Create a change.
    pub fn new(path: impl Into<String>, old: Option<Entry>, new: Option<Entry>) -> Self {
        Self {
            path: path.into(),
            old,
            new,
        }
    }

    /// A change that creates `entry` at `path` where nothing existed.
    pub fn creation(path: impl Into<String>, entry: Entry) -> Self {
        Self::new(path, None, Some(entry))
    }

    /// A change that deletes whatever is at `path`.
    pub fn deletion(path: impl Into<String>, old: Option<Entry>) -> Self {
        Self::new(path, old, None)
    }

    /// Check if this change targets the root.
    pub fn is_root(&self) -> bool {
        self.path.is_empty()
    }

    /// Check if this change removes its target.
    pub fn is_deletion(&self) -> bool {
        self.new.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::testing::file;

    #[test]
    fn test_constructors() {
        let create = Change::creation("a/b", file("x"));
        assert_eq!(create.old, None);
        assert!(!create.is_deletion());
        assert!(!create.is_root());

        let delete = Change::deletion("", Some(Entry::directory()));
        assert!(delete.is_deletion());
        assert!(delete.is_root());
    }
}
