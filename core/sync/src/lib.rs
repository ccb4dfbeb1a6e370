//! duosync reconciliation core.
//!
//! This crate provides the snapshot model and the pure algorithms built on it:
//! - Entry trees describing files, directories and symbolic links
//! - Changes between entry values
//! - Applying ordered change lists to a tree without touching the base
//! - Diffing two trees and reconciling two endpoints against an ancestor
//!
//! Nothing here performs I/O; scanning, caching and staging live in
//! `duosync-endpoint`.

pub mod apply;
pub mod change;
pub mod diff;
pub mod entry;
pub mod reconcile;

// Re-export main types
pub use apply::{apply, apply_checked};
pub use change::Change;
pub use diff::diff;
pub use entry::{Entry, EntryKind};
pub use reconcile::{reconcile, Conflict, Reconciliation};
