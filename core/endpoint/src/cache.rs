//! Persistent snapshot cache.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use duosync_common::{Error, Result};
use duosync_sync::Entry;

/// Cache format version.
const CACHE_VERSION: u32 = 1;

/// A snapshot as persisted in the cache file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedSnapshot {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    /// The scanned tree; `None` if the root did not exist.
    pub root: Option<Entry>,
}

/// Snapshot cache stored as a JSON file.
#[derive(Debug, Clone)]
pub struct SnapshotCache {
    path: PathBuf,
}

impl SnapshotCache {
    /// Create a cache handle for the given file path. Nothing is touched on
    /// disk until the first load or save.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the cache file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the cached snapshot, or `None` if no cache file exists.
    ///
    /// # Errors
    /// - I/O errors other than a missing file
    /// - [`Error::Serialization`] for unreadable or incompatible caches
    pub async fn load(&self) -> Result<Option<CachedSnapshot>> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::Io(e)),
        };

        let snapshot: CachedSnapshot =
            serde_json::from_str(&content).map_err(|e| Error::Serialization(e.to_string()))?;
        if snapshot.version != CACHE_VERSION {
            return Err(Error::Serialization(format!(
                "Unsupported cache version {} in {}",
                snapshot.version,
                self.path.display()
            )));
        }
        Ok(Some(snapshot))
    }

    /// Persist a snapshot, replacing the previous cache atomically.
    pub async fn save(&self, root: Option<&Entry>) -> Result<()> {
        let snapshot = CachedSnapshot {
            version: CACHE_VERSION,
            saved_at: Utc::now(),
            root: root.cloned(),
        };
        let json =
            serde_json::to_vec(&snapshot).map_err(|e| Error::Serialization(e.to_string()))?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let temporary = self.path.with_extension("tmp");
        fs::write(&temporary, &json).await?;
        fs::rename(&temporary, &self.path).await?;

        debug!("Saved snapshot cache to {} ({} bytes)", self.path.display(), json.len());
        Ok(())
    }
}
