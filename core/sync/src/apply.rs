//! Application of ordered change lists to entry trees.

use duosync_common::{Error, Result};

use crate::change::Change;
use crate::entry::Entry;

/// Apply `changes` in order to a copy of `base` and return the new tree.
///
/// Each change is resolved against the tree as it stands after all prior
/// changes, so a change may target a path created earlier in the same list.
/// A change at the root path replaces the whole tree. The `old` value of each
/// change is not consulted.
///
/// `base` is never mutated. On error no partial tree is returned and the
/// caller may retry from `base`.
///
/// # Errors
/// - [`Error::PathResolution`] if a parent path cannot be descended into, or
///   if a deletion targets a path with no entry.
pub fn apply(base: Option<&Entry>, changes: &[Change]) -> Result<Option<Entry>> {
    apply_changes(base, changes, false)
}

/// Like [`apply`], but first checks that the value at each change's path
/// equals the change's `old` value.
///
/// # Errors
/// - [`Error::Conflict`] if the current value differs from `old`.
/// - [`Error::PathResolution`] as for [`apply`].
pub fn apply_checked(base: Option<&Entry>, changes: &[Change]) -> Result<Option<Entry>> {
    apply_changes(base, changes, true)
}

fn apply_changes(base: Option<&Entry>, changes: &[Change], check_old: bool) -> Result<Option<Entry>> {
    let mut result = base.map(Entry::copy);

    for change in changes {
        if change.is_root() {
            if check_old && result != change.old {
                return Err(stale(change));
            }
            result = change.new.clone();
            continue;
        }

        let (parent_path, leaf) = match change.path.rsplit_once('/') {
            Some((parent_path, leaf)) => (Some(parent_path), leaf),
            None => (None, change.path.as_str()),
        };

        let mut parent = result.as_mut().ok_or_else(|| unresolved_parent(change))?;
        if let Some(parent_path) = parent_path {
            for component in parent_path.split('/') {
                parent = parent
                    .find_mut(component)
                    .ok_or_else(|| unresolved_parent(change))?;
            }
        }

        if check_old && parent.find(leaf) != change.old.as_ref() {
            return Err(stale(change));
        }

        match &change.new {
            None => {
                if !parent.remove(leaf) {
                    return Err(Error::PathResolution(format!(
                        "unable to resolve path for deletion: '{}'",
                        change.path
                    )));
                }
            }
            Some(entry) => {
                if !parent.insert(leaf, entry.clone()) {
                    return Err(unresolved_parent(change));
                }
            }
        }
    }

    Ok(result)
}

fn unresolved_parent(change: &Change) -> Error {
    Error::PathResolution(format!("unable to resolve parent path: '{}'", change.path))
}

fn stale(change: &Change) -> Error {
    Error::Conflict(format!(
        "entry at '{}' does not match the expected old value",
        change.path
    ))
}
