//! Two-way comparison of entry trees.

use duosync_common::join_path;

use crate::change::Change;
use crate::entry::Entry;

/// Compute the changes that transform `base` into `target`.
///
/// Directories present on both sides are compared child by child; any other
/// difference is reported as a single change replacing the whole subtree.
/// The result applies cleanly to `base`:
/// `apply(base, &diff(base, target)) == target`.
pub fn diff(base: Option<&Entry>, target: Option<&Entry>) -> Vec<Change> {
    let mut changes = Vec::new();
    diff_into("", base, target, &mut changes);
    changes
}

pub(crate) fn diff_into(path: &str, base: Option<&Entry>, target: Option<&Entry>, changes: &mut Vec<Change>) {
    match (base, target) {
        (Some(Entry::Directory { contents: old }), Some(Entry::Directory { contents: new })) => {
            for (name, old_child) in old {
                diff_into(&join_path(path, name), Some(old_child), new.get(name), changes);
            }
            for (name, new_child) in new {
                if !old.contains_key(name) {
                    changes.push(Change::creation(join_path(path, name), new_child.clone()));
                }
            }
        }
        _ => {
            if base != target {
                changes.push(Change::new(path, base.cloned(), target.cloned()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apply::{apply, apply_checked};
    use crate::entry::testing::{arb_entry, arb_root, file};
    use proptest::prelude::*;

    #[test]
    fn test_identical_trees_have_no_changes() {
        let tree = Entry::directory_with([("a", file("a"))]);
        assert!(diff(Some(&tree), Some(&tree)).is_empty());
        assert!(diff(None, None).is_empty());
    }

    #[test]
    fn test_nested_modification() {
        let base = Entry::directory_with([(
            "dir",
            Entry::directory_with([("keep", file("k")), ("edit", file("v1"))]),
        )]);
        let target = Entry::directory_with([(
            "dir",
            Entry::directory_with([("keep", file("k")), ("edit", file("v2")), ("add", file("n"))]),
        )]);

        let changes = diff(Some(&base), Some(&target));
        assert_eq!(
            changes,
            vec![
                Change::new("dir/edit", Some(file("v1")), Some(file("v2"))),
                Change::creation("dir/add", file("n")),
            ]
        );
    }

    #[test]
    fn test_kind_change_replaces_subtree() {
        let base = Entry::directory_with([("x", Entry::directory_with([("y", file("y"))]))]);
        let target = Entry::directory_with([("x", Entry::symlink("elsewhere"))]);

        let changes = diff(Some(&base), Some(&target));
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].path, "x");
        assert_eq!(changes[0].new, Some(Entry::symlink("elsewhere")));
    }

    #[test]
    fn test_root_level_changes() {
        let tree = Entry::directory();
        assert_eq!(diff(None, Some(&tree)), vec![Change::creation("", tree.clone())]);
        assert_eq!(diff(Some(&tree), None), vec![Change::deletion("", Some(tree))]);
    }

    proptest! {
        #[test]
        fn prop_apply_diff_reaches_target(base in arb_root(), target in arb_root()) {
            let changes = diff(Some(&base), Some(&target));
            let result = apply_checked(Some(&base), &changes).unwrap();
            prop_assert_eq!(result, Some(target));
        }

        #[test]
        fn prop_apply_diff_any_shape(base in prop::option::of(arb_entry()), target in prop::option::of(arb_entry())) {
            let changes = diff(base.as_ref(), target.as_ref());
            prop_assert_eq!(apply(base.as_ref(), &changes).unwrap(), target);
        }
    }
}
