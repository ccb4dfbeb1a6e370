//! Common utilities and types shared across duosync crates.
//!
//! This module provides the error type, the tree path type used to address
//! entries inside a snapshot, session identifiers and content digests.

pub mod digest;
pub mod error;
pub mod types;

pub use digest::{Digest, DigestWriter};
pub use error::{BoxError, Error, Result};
pub use types::{join_path, SessionId, SyncPath};
