//! Common error types for duosync.

use thiserror::Error;

/// Boxed error returned by user-supplied endpoint overrides.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Top-level error type for duosync operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A change could not be resolved against the tree it was applied to.
    ///
    /// Covers both an unresolvable parent path and a missing deletion target.
    /// Not retryable without a new change list or a new base.
    #[error("Path resolution failure: {0}")]
    PathResolution(String),

    /// A path string is malformed.
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The tree or filesystem no longer matches what a change expected.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A user-supplied endpoint override failed.
    #[error("{name} override failed: {source}")]
    Override {
        /// Which override was invoked.
        name: &'static str,
        /// The error returned by the override, unchanged.
        #[source]
        source: BoxError,
    },

    /// Staging operation failed.
    #[error("Staging error: {0}")]
    Staging(String),
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
