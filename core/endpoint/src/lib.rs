//! duosync local endpoint.
//!
//! This crate provides one side of a synchronization session on the local
//! filesystem, including:
//! - Behavior overrides for cache location, staging location and watching
//! - Default storage policy and polling-based watching
//! - Scanning a root into an entry tree and caching the result
//! - A staging area for atomic installation of file contents
//! - Transitions that bring the root in line with a change list

pub mod cache;
pub mod config;
pub mod endpoint;
pub mod options;
pub mod scan;
pub mod staging;
pub mod watch;

// Re-export main types
pub use cache::{CachedSnapshot, SnapshotCache};
pub use config::EndpointConfig;
pub use endpoint::LocalEndpoint;
pub use options::{
    with_cache_path_callback, with_staging_root_callback, with_watching_mechanism, EndpointOption,
    EndpointOptions, PathCallback, WatchingMechanism,
};
pub use scan::scan;
pub use staging::{StagedFile, StagingArea};
