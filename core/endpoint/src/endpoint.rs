//! Local endpoint.
//!
//! A [`LocalEndpoint`] is one side of a synchronization session rooted at a
//! local directory. It owns a snapshot cache and a staging area, both located
//! through the endpoint options or the default policy in [`EndpointConfig`],
//! and it can watch, scan and transition its root.

use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use duosync_common::{Digest, Error, Result, SessionId, SyncPath};
use duosync_sync::{apply_checked, Change, Entry};

use crate::cache::SnapshotCache;
use crate::config::{side_name, EndpointConfig};
use crate::options::{EndpointOption, EndpointOptions};
use crate::scan::scan;
use crate::staging::StagingArea;
use crate::watch;

/// One side of a synchronization session backed by the local filesystem.
pub struct LocalEndpoint {
    /// Synchronization root.
    root: PathBuf,
    session: SessionId,
    alpha: bool,
    config: EndpointConfig,
    /// Overrides, resolved once at construction.
    options: EndpointOptions,
    cache: SnapshotCache,
    staging: StagingArea,
    /// Last known state of the root, from a scan or a transition.
    snapshot: Option<Entry>,
}

impl LocalEndpoint {
    /// Create an endpoint.
    ///
    /// Resolves the cache path and staging root through the options, falling
    /// back to the defaults of `config`, opens the staging area and loads any
    /// cached snapshot.
    ///
    /// # Errors
    /// - [`Error::Override`] if an override callback fails
    /// - I/O, staging and cache errors
    pub async fn new(
        root: impl Into<PathBuf>,
        session: SessionId,
        alpha: bool,
        config: EndpointConfig,
        options: impl IntoIterator<Item = EndpointOption>,
    ) -> Result<Self> {
        let root = root.into();
        let options = EndpointOptions::new(options);

        let cache_path =
            options.resolve_cache_path(&session, alpha, || config.default_cache_path(&session, alpha))?;
        let staging_root = options
            .resolve_staging_root(&session, alpha, || config.default_staging_root(&session, alpha))?;

        let cache = SnapshotCache::new(cache_path);
        let snapshot = cache.load().await?.and_then(|cached| cached.root);
        let staging = StagingArea::new(&staging_root).await?;

        info!(
            "Opened {} endpoint for session {} at {} (cache {}, staging {})",
            side_name(alpha),
            session,
            root.display(),
            cache.path().display(),
            staging_root.display()
        );

        Ok(Self {
            root,
            session,
            alpha,
            config,
            options,
            cache,
            staging,
            snapshot,
        })
    }

    /// Get the synchronization root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn session(&self) -> &SessionId {
        &self.session
    }

    /// Check if this is the alpha side.
    pub fn is_alpha(&self) -> bool {
        self.alpha
    }

    pub fn cache_path(&self) -> &Path {
        self.cache.path()
    }

    pub fn staging_root(&self) -> &Path {
        self.staging.root()
    }

    /// Get the staging area.
    pub fn staging(&self) -> &StagingArea {
        &self.staging
    }

    /// Last known snapshot of the root.
    pub fn snapshot(&self) -> Option<&Entry> {
        self.snapshot.as_ref()
    }

    /// Scan the root, store the result in the cache and return it.
    pub async fn scan(&mut self) -> Result<Option<Entry>> {
        let root = self.root.clone();
        let probe_executable = self.config.probe_executable;
        let started = std::time::Instant::now();

        let snapshot = tokio::task::spawn_blocking(move || scan(&root, probe_executable))
            .await
            .map_err(|e| Error::Io(io::Error::other(e)))??;

        debug!(
            "Scanned {} in {:?}: {} entries",
            self.root.display(),
            started.elapsed(),
            snapshot.as_ref().map_or(0, Entry::count)
        );

        self.cache.save(snapshot.as_ref()).await?;
        self.snapshot = snapshot.clone();
        Ok(snapshot)
    }

    /// Start watching the root.
    ///
    /// Uses the watching mechanism override if one was supplied, polling
    /// otherwise. The returned receiver yields a unit value whenever the root
    /// may have changed and closes when watching stops, either because
    /// `cancel` fired or because the mechanism failed. Must be called within
    /// a tokio runtime.
    pub fn watch(&self, cancel: CancellationToken) -> mpsc::Receiver<()> {
        let (events, receiver) = watch::channel();
        let root = self.root.clone();

        match self.options.watching_mechanism() {
            Some(mechanism) => {
                debug!("Watching {} with custom mechanism", root.display());
                tokio::spawn(mechanism(cancel, root, events));
            }
            None => {
                tokio::spawn(watch::poll(cancel, root, events, self.config.poll_interval));
            }
        }

        receiver
    }

    /// Stage file content destined for `path`. Returns the content digest.
    pub async fn stage(&mut self, path: &SyncPath, data: Vec<u8>) -> Result<Digest> {
        self.staging.stage(path, data).await
    }

    /// Perform `changes` on the root.
    ///
    /// The changes are first validated against the current snapshot; each
    /// change's `old` value must match it. File contents must have been
    /// staged beforehand under the file's path, and are checked before
    /// anything on disk is touched. On success the snapshot and cache are
    /// updated and the new snapshot returned.
    ///
    /// A failure part-way leaves earlier changes on disk. The root is then
    /// rescanned so the snapshot describes what is actually there.
    ///
    /// # Errors
    /// - [`Error::Conflict`] or [`Error::PathResolution`] if the changes do
    ///   not fit the current snapshot
    /// - [`Error::NotFound`] or [`Error::Staging`] for missing or mismatched
    ///   staged content
    /// - I/O errors
    pub async fn transition(&mut self, changes: &[Change]) -> Result<Option<Entry>> {
        let expected = apply_checked(self.snapshot.as_ref(), changes)?;
        self.check_staged(changes)?;

        for change in changes {
            let path = SyncPath::parse(&change.path)?;
            if let Err(e) = self.perform(&path, change).await {
                warn!("Transition of {} failed at '{}': {}", self.root.display(), path, e);
                self.recover().await;
                return Err(e);
            }
        }

        self.cache.save(expected.as_ref()).await?;
        self.snapshot = expected.clone();
        info!(
            "Applied {} changes to {} endpoint",
            changes.len(),
            side_name(self.alpha)
        );
        Ok(expected)
    }

    fn check_staged(&self, changes: &[Change]) -> Result<()> {
        for change in changes {
            let Some(entry) = &change.new else { continue };
            let path = SyncPath::parse(&change.path)?;
            for (relative, node) in entry.walk() {
                if let Entry::File { digest, .. } = node {
                    let node_path = if relative.is_empty() {
                        path.clone()
                    } else {
                        join_relative(&path, &relative)?
                    };
                    self.staging.verify(&node_path, digest)?;
                }
            }
        }
        Ok(())
    }

    /// Replace the snapshot with a fresh scan after a failed transition.
    async fn recover(&mut self) {
        self.snapshot = None;
        if let Err(e) = self.scan().await {
            warn!("Rescan of {} failed: {}", self.root.display(), e);
            if let Err(e) = self.cache.save(None).await {
                warn!("Failed to reset cache {}: {}", self.cache.path().display(), e);
            }
        }
    }

    async fn perform(&mut self, path: &SyncPath, change: &Change) -> Result<()> {
        let target = self.fs_path(path);

        // A file replacing a file is swapped in by the rename in `install`.
        let replace_in_place = matches!(
            (&change.old, &change.new),
            (Some(Entry::File { .. }), Some(Entry::File { .. }))
        );
        if change.old.is_some() && !replace_in_place {
            remove_path(&target).await?;
        }

        let Some(entry) = &change.new else {
            return Ok(());
        };

        for (relative, node) in entry.walk() {
            let node_path = if relative.is_empty() {
                path.clone()
            } else {
                join_relative(path, &relative)?
            };
            let node_target = self.fs_path(&node_path);

            match node {
                Entry::Directory { .. } => fs::create_dir(&node_target).await?,
                Entry::File { digest, executable } => {
                    self.staging.install(&node_path, digest, &node_target).await?;
                    set_executable(&node_target, *executable).await?;
                }
                Entry::SymbolicLink { target } => create_symlink(target, &node_target).await?,
            }
        }
        Ok(())
    }

    fn fs_path(&self, path: &SyncPath) -> PathBuf {
        let mut fs_path = self.root.clone();
        for component in path.components() {
            fs_path.push(component);
        }
        fs_path
    }
}

fn join_relative(base: &SyncPath, relative: &str) -> Result<SyncPath> {
    relative
        .split('/')
        .try_fold(base.clone(), |path, component| path.join(component))
}

async fn remove_path(path: &Path) -> Result<()> {
    let metadata = match fs::symlink_metadata(path).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(Error::Conflict(format!(
                "Expected an entry at {}",
                path.display()
            )));
        }
        Err(e) => return Err(Error::Io(e)),
    };

    if metadata.is_dir() {
        fs::remove_dir_all(path).await?;
    } else {
        fs::remove_file(path).await?;
    }
    Ok(())
}

#[cfg(unix)]
async fn set_executable(path: &Path, executable: bool) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut permissions = fs::metadata(path).await?.permissions();
    let mode = permissions.mode();
    let mode = if executable {
        mode | ((mode & 0o444) >> 2)
    } else {
        mode & !0o111
    };
    permissions.set_mode(mode);
    fs::set_permissions(path, permissions).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn set_executable(_path: &Path, _executable: bool) -> Result<()> {
    Ok(())
}

#[cfg(unix)]
async fn create_symlink(target: &str, link: &Path) -> Result<()> {
    fs::symlink(target, link).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn create_symlink(_target: &str, link: &Path) -> Result<()> {
    Err(Error::InvalidInput(format!(
        "Symbolic links are not supported here: {}",
        link.display()
    )))
}
