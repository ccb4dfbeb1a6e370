//! Staging area for file contents awaiting installation.
//!
//! Contents are written into the staging root ahead of a transition and then
//! moved into place with a rename, so a file at its final location is always
//! complete. When the staging root lives on another filesystem the content is
//! first copied next to its target and renamed from there.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

use duosync_common::{Digest, Error, Result, SyncPath};

/// Name of the registry file inside the staging root.
const REGISTRY_FILE: &str = "registry.json";
/// Directory inside the staging root holding staged contents.
const FILES_DIR: &str = "files";

/// A file staged for installation at a tree path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedFile {
    /// Tree path the content is destined for.
    pub path: SyncPath,
    /// Digest of the staged content.
    pub digest: Digest,
    /// Location of the content inside the staging root.
    pub staging_file: PathBuf,
    /// When the content was staged.
    pub staged_at: DateTime<Utc>,
    /// Size of the content in bytes.
    pub size: u64,
}

/// Staging area rooted at an endpoint's staging root.
pub struct StagingArea {
    /// Staging root.
    root: PathBuf,
    /// Directory for staged contents.
    files_dir: PathBuf,
    /// Staged files keyed by destination path.
    staged: BTreeMap<String, StagedFile>,
    /// Path to persist the registry.
    registry_path: PathBuf,
}

impl StagingArea {
    /// Open or create a staging area.
    ///
    /// # Errors
    /// - [`Error::Staging`] if `root` exists but is not a directory
    /// - I/O and registry deserialization errors
    pub async fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        match fs::metadata(&root).await {
            Ok(metadata) if !metadata.is_dir() => {
                return Err(Error::Staging(format!(
                    "Staging root {} is not a directory",
                    root.display()
                )));
            }
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(Error::Io(e)),
        }

        let files_dir = root.join(FILES_DIR);
        let registry_path = root.join(REGISTRY_FILE);
        fs::create_dir_all(&files_dir).await?;

        let staged = match fs::read_to_string(&registry_path).await {
            Ok(content) => {
                serde_json::from_str(&content).map_err(|e| Error::Serialization(e.to_string()))?
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(Error::Io(e)),
        };

        Ok(Self {
            root,
            files_dir,
            staged,
            registry_path,
        })
    }

    /// Get the staging root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Stage content for installation at `path`, replacing anything
    /// previously staged there. Returns the content digest.
    pub async fn stage(&mut self, path: &SyncPath, data: Vec<u8>) -> Result<Digest> {
        if path.is_root() {
            return Err(Error::InvalidInput(
                "Cannot stage content for the root path".to_string(),
            ));
        }

        let staging_file = self.files_dir.join(Uuid::new_v4().to_string());
        fs::write(&staging_file, &data).await?;

        let digest = Digest::of(&data);
        let staged = StagedFile {
            path: path.clone(),
            digest,
            staging_file,
            staged_at: Utc::now(),
            size: data.len() as u64,
        };

        if let Some(previous) = self.staged.insert(path.to_string(), staged) {
            remove_if_exists(&previous.staging_file).await?;
        }
        self.persist_registry().await?;

        debug!("Staged {} bytes for {} ({})", data.len(), path, digest);
        Ok(digest)
    }

    /// Get the staged file for a path.
    pub fn get(&self, path: &SyncPath) -> Option<&StagedFile> {
        self.staged.get(&path.to_string())
    }

    /// Get all staged files in path order.
    pub fn all(&self) -> impl Iterator<Item = &StagedFile> {
        self.staged.values()
    }

    /// Read back staged content.
    pub async fn read(&self, path: &SyncPath) -> Result<Vec<u8>> {
        let staged = self
            .get(path)
            .ok_or_else(|| Error::NotFound(format!("Nothing staged for {}", path)))?;
        Ok(fs::read(&staged.staging_file).await?)
    }

    /// Move staged content for `path` to `target`.
    ///
    /// # Errors
    /// - [`Error::NotFound`] if nothing is staged for `path`
    /// - [`Error::Staging`] if the staged digest differs from `expected`
    pub async fn install(&mut self, path: &SyncPath, expected: &Digest, target: &Path) -> Result<()> {
        let staged = self.verify(path, expected)?;

        move_into_place(&staged.staging_file, target).await?;
        self.staged.remove(&path.to_string());
        self.persist_registry().await?;

        debug!("Installed {} at {}", path, target.display());
        Ok(())
    }

    /// Check that content with digest `expected` is staged for `path`.
    ///
    /// # Errors
    /// - [`Error::NotFound`] if nothing is staged for `path`
    /// - [`Error::Staging`] if the staged digest differs from `expected`
    pub fn verify(&self, path: &SyncPath, expected: &Digest) -> Result<&StagedFile> {
        let staged = self
            .get(path)
            .ok_or_else(|| Error::NotFound(format!("Nothing staged for {}", path)))?;

        if &staged.digest != expected {
            return Err(Error::Staging(format!(
                "Staged content for {} has digest {}, expected {}",
                path, staged.digest, expected
            )));
        }
        Ok(staged)
    }

    /// Drop staged content for a path without installing it.
    pub async fn discard(&mut self, path: &SyncPath) -> Result<()> {
        let staged = self
            .staged
            .remove(&path.to_string())
            .ok_or_else(|| Error::NotFound(format!("Nothing staged for {}", path)))?;

        remove_if_exists(&staged.staging_file).await?;
        self.persist_registry().await
    }

    /// Drop all staged content.
    pub async fn clear(&mut self) -> Result<()> {
        for (_, staged) in std::mem::take(&mut self.staged) {
            remove_if_exists(&staged.staging_file).await?;
        }
        self.persist_registry().await
    }

    /// Get total size of staged data.
    pub fn total_size(&self) -> u64 {
        self.staged.values().map(|s| s.size).sum()
    }

    /// Get count of staged files.
    pub fn count(&self) -> usize {
        self.staged.len()
    }

    /// Check if the staging area is empty.
    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    /// Persist the registry to disk.
    async fn persist_registry(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.staged)
            .map_err(|e| Error::Serialization(e.to_string()))?;
        fs::write(&self.registry_path, json).await?;
        Ok(())
    }

    /// Delete content files that the registry does not reference, such as
    /// leftovers from an interrupted stage.
    pub async fn cleanup_orphaned(&mut self) -> Result<usize> {
        let mut cleaned = 0;
        let mut entries = fs::read_dir(&self.files_dir).await?;

        let known_files: HashSet<&PathBuf> = self.staged.values().map(|s| &s.staging_file).collect();

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_file() && !known_files.contains(&path) {
                fs::remove_file(&path).await?;
                cleaned += 1;
            }
        }

        Ok(cleaned)
    }
}

async fn move_into_place(source: &Path, target: &Path) -> Result<()> {
    match fs::rename(source, target).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            debug!("{} is on another filesystem, copying", target.display());
            copy_into_place(source, target).await
        }
        Err(e) => Err(Error::Io(e)),
    }
}

/// Copy `source` to a temporary sibling of `target`, rename it over `target`
/// and remove `source`.
async fn copy_into_place(source: &Path, target: &Path) -> Result<()> {
    let name = target
        .file_name()
        .ok_or_else(|| Error::InvalidInput(format!("No file name in {}", target.display())))?;
    let mut temporary_name = std::ffi::OsString::from(".");
    temporary_name.push(name);
    temporary_name.push(format!(".{}.tmp", Uuid::new_v4()));
    let temporary = target.with_file_name(temporary_name);

    if let Err(e) = fs::copy(source, &temporary).await {
        remove_if_exists(&temporary).await?;
        return Err(Error::Io(e));
    }
    if let Err(e) = fs::rename(&temporary, target).await {
        remove_if_exists(&temporary).await?;
        return Err(Error::Io(e));
    }
    remove_if_exists(source).await
}

async fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::Io(e)),
    }
}
