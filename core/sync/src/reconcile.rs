//! Three-way reconciliation of endpoint snapshots.
//!
//! Alpha and beta are compared against their last agreed state (the
//! ancestor). One-sided modifications are propagated to the other side,
//! identical modifications are recorded in the ancestor, and divergent
//! modifications are reported as [`Conflict`]s. Choosing a winner for a
//! conflict is left to the caller.

use serde::{Deserialize, Serialize};

use duosync_common::join_path;

use crate::change::Change;
use crate::diff::diff_into;
use crate::entry::Entry;

/// A path at which alpha and beta diverged from the ancestor differently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    pub path: String,
    pub ancestor: Option<Entry>,
    pub alpha: Option<Entry>,
    pub beta: Option<Entry>,
}

/// Outcome of a reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// Changes bringing the ancestor up to date. Apply these only after both
    /// endpoint transitions have succeeded.
    pub ancestor_changes: Vec<Change>,
    /// Changes to perform on alpha, with `old` set to alpha's current value.
    pub alpha_transitions: Vec<Change>,
    /// Changes to perform on beta, with `old` set to beta's current value.
    pub beta_transitions: Vec<Change>,
    pub conflicts: Vec<Conflict>,
}

impl Reconciliation {
    /// Check whether neither endpoint needs any transition.
    pub fn is_quiescent(&self) -> bool {
        self.alpha_transitions.is_empty() && self.beta_transitions.is_empty()
    }

    /// Check whether any conflicts were detected.
    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }
}

/// Reconcile alpha and beta against their common ancestor.
pub fn reconcile(
    ancestor: Option<&Entry>,
    alpha: Option<&Entry>,
    beta: Option<&Entry>,
) -> Reconciliation {
    let mut outcome = Reconciliation::default();
    reconcile_into("", ancestor, alpha, beta, &mut outcome);
    outcome
}

fn reconcile_into(
    path: &str,
    ancestor: Option<&Entry>,
    alpha: Option<&Entry>,
    beta: Option<&Entry>,
    outcome: &mut Reconciliation,
) {
    if alpha == beta {
        diff_into(path, ancestor, alpha, &mut outcome.ancestor_changes);
        return;
    }

    if let (
        Some(Entry::Directory {
            contents: alpha_contents,
        }),
        Some(Entry::Directory {
            contents: beta_contents,
        }),
    ) = (alpha, beta)
    {
        // Children are recorded in the ancestor individually, so it needs a
        // directory at this path first.
        let ancestor_contents = match ancestor {
            Some(Entry::Directory { contents }) => Some(contents),
            _ => {
                outcome
                    .ancestor_changes
                    .push(Change::new(path, ancestor.cloned(), Some(Entry::directory())));
                None
            }
        };

        let mut names: Vec<&String> = alpha_contents.keys().chain(beta_contents.keys()).collect();
        if let Some(contents) = ancestor_contents {
            names.extend(contents.keys());
        }
        names.sort();
        names.dedup();

        for name in names {
            reconcile_into(
                &join_path(path, name),
                ancestor_contents.and_then(|contents| contents.get(name)),
                alpha_contents.get(name),
                beta_contents.get(name),
                outcome,
            );
        }
        return;
    }

    if alpha == ancestor {
        outcome
            .alpha_transitions
            .push(Change::new(path, alpha.cloned(), beta.cloned()));
        outcome
            .ancestor_changes
            .push(Change::new(path, ancestor.cloned(), beta.cloned()));
    } else if beta == ancestor {
        outcome
            .beta_transitions
            .push(Change::new(path, beta.cloned(), alpha.cloned()));
        outcome
            .ancestor_changes
            .push(Change::new(path, ancestor.cloned(), alpha.cloned()));
    } else {
        outcome.conflicts.push(Conflict {
            path: path.to_string(),
            ancestor: ancestor.cloned(),
            alpha: alpha.cloned(),
            beta: beta.cloned(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apply::apply_checked;
    use crate::diff::diff;
    use crate::entry::testing::{arb_root, file};
    use proptest::prelude::*;

    fn ancestor() -> Entry {
        Entry::directory_with([
            ("shared.txt", file("v1")),
            ("docs", Entry::directory_with([("a.md", file("a"))])),
        ])
    }

    #[test]
    fn test_identical_sides_need_nothing() {
        let tree = ancestor();
        let outcome = reconcile(Some(&tree), Some(&tree), Some(&tree));
        assert_eq!(outcome, Reconciliation::default());
        assert!(outcome.is_quiescent());
    }

    #[test]
    fn test_one_sided_edit_propagates() {
        let base = ancestor();
        let mut alpha = base.copy();
        alpha.insert("shared.txt", file("v2"));

        let outcome = reconcile(Some(&base), Some(&alpha), Some(&base));
        assert!(outcome.alpha_transitions.is_empty());
        assert_eq!(
            outcome.beta_transitions,
            vec![Change::new("shared.txt", Some(file("v1")), Some(file("v2")))]
        );
        assert!(!outcome.has_conflicts());

        let beta = apply_checked(Some(&base), &outcome.beta_transitions).unwrap();
        assert_eq!(beta.as_ref(), Some(&alpha));
        let new_ancestor = apply_checked(Some(&base), &outcome.ancestor_changes).unwrap();
        assert_eq!(new_ancestor.as_ref(), Some(&alpha));
    }

    #[test]
    fn test_deletion_on_beta_propagates() {
        let base = ancestor();
        let mut beta = base.copy();
        beta.remove("docs");

        let outcome = reconcile(Some(&base), Some(&base), Some(&beta));
        assert_eq!(
            outcome.alpha_transitions,
            vec![Change::deletion("docs", base.find("docs").cloned())]
        );
    }

    #[test]
    fn test_divergent_edits_conflict() {
        let base = ancestor();
        let mut alpha = base.copy();
        alpha.insert("shared.txt", file("alpha"));
        let mut beta = base.copy();
        beta.insert("shared.txt", file("beta"));
        beta.find_mut("docs").unwrap().insert("b.md", file("b"));

        let outcome = reconcile(Some(&base), Some(&alpha), Some(&beta));
        assert_eq!(
            outcome.conflicts,
            vec![Conflict {
                path: "shared.txt".to_string(),
                ancestor: Some(file("v1")),
                alpha: Some(file("alpha")),
                beta: Some(file("beta")),
            }]
        );
        // The non-conflicting part still propagates.
        assert_eq!(
            outcome.alpha_transitions,
            vec![Change::creation("docs/b.md", file("b"))]
        );
        assert!(outcome.beta_transitions.is_empty());
    }

    #[test]
    fn test_delete_versus_modify_conflicts_at_directory() {
        let base = ancestor();
        let mut alpha = base.copy();
        alpha.remove("docs");
        let mut beta = base.copy();
        beta.find_mut("docs").unwrap().insert("a.md", file("edited"));

        let outcome = reconcile(Some(&base), Some(&alpha), Some(&beta));
        assert_eq!(outcome.conflicts.len(), 1);
        assert_eq!(outcome.conflicts[0].path, "docs");
        assert_eq!(outcome.conflicts[0].alpha, None);
    }

    #[test]
    fn test_same_creation_on_both_sides_updates_ancestor_only() {
        let base = ancestor();
        let mut both = base.copy();
        both.insert("new.txt", file("same"));

        let outcome = reconcile(Some(&base), Some(&both), Some(&both));
        assert!(outcome.is_quiescent());
        assert_eq!(outcome.ancestor_changes, diff(Some(&base), Some(&both)));
        assert_eq!(
            outcome.ancestor_changes,
            vec![Change::creation("new.txt", file("same"))]
        );
    }

    #[test]
    fn test_agreed_edit_in_subdirectory_stays_minimal() {
        let base = ancestor();
        let mut alpha = base.copy();
        alpha.find_mut("docs").unwrap().insert("a.md", file("edited"));
        let mut beta = alpha.copy();
        beta.insert("shared.txt", file("v2"));

        let outcome = reconcile(Some(&base), Some(&alpha), Some(&beta));
        assert_eq!(
            outcome.ancestor_changes,
            vec![
                Change::new("docs/a.md", Some(file("a")), Some(file("edited"))),
                Change::new("shared.txt", Some(file("v1")), Some(file("v2"))),
            ]
        );
    }

    #[test]
    fn test_initial_sync_without_ancestor() {
        let alpha = Entry::directory_with([("only-alpha", file("a")), ("both", file("same"))]);
        let beta = Entry::directory_with([("only-beta", file("b")), ("both", file("same"))]);

        let outcome = reconcile(None, Some(&alpha), Some(&beta));
        assert!(!outcome.has_conflicts());

        let alpha_after = apply_checked(Some(&alpha), &outcome.alpha_transitions).unwrap();
        let beta_after = apply_checked(Some(&beta), &outcome.beta_transitions).unwrap();
        let ancestor_after = apply_checked(None, &outcome.ancestor_changes).unwrap();
        assert_eq!(alpha_after, beta_after);
        assert_eq!(ancestor_after, alpha_after);
        assert_eq!(alpha_after.unwrap().count(), 4);
    }

    proptest! {
        #[test]
        fn prop_changes_apply_and_converge(
            ancestor in arb_root(),
            alpha in arb_root(),
            beta in arb_root(),
        ) {
            let outcome = reconcile(Some(&ancestor), Some(&alpha), Some(&beta));

            let alpha_after = apply_checked(Some(&alpha), &outcome.alpha_transitions).unwrap();
            let beta_after = apply_checked(Some(&beta), &outcome.beta_transitions).unwrap();
            let ancestor_after = apply_checked(Some(&ancestor), &outcome.ancestor_changes).unwrap();

            if !outcome.has_conflicts() {
                prop_assert_eq!(&alpha_after, &beta_after);
                prop_assert_eq!(&ancestor_after, &alpha_after);
            }
        }
    }
}
