//! Endpoint behavior overrides.
//!
//! An endpoint consults these overrides instead of its default policy for
//! locating its snapshot cache and staging root, and for watching its
//! synchronization root. Options are opaque values that can only be produced
//! by [`with_cache_path_callback`], [`with_staging_root_callback`] and
//! [`with_watching_mechanism`]; each touches exactly one field, so when the
//! same field is set twice the later option wins.

use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use duosync_common::{BoxError, Error, Result, SessionId};

/// Computes a per-endpoint storage path from the session identifier and a
/// flag that is `true` for alpha and `false` for beta.
///
/// Repeated calls with the same arguments must return the same path for the
/// lifetime of the session.
pub type PathCallback =
    Arc<dyn Fn(&SessionId, bool) -> std::result::Result<PathBuf, BoxError> + Send + Sync>;

/// Watches a path recursively until cancelled.
///
/// The mechanism signals every detected change on the events channel without
/// blocking (see [`crate::watch::notify`]) and closes the channel, by dropping
/// its sender, either on an unrecoverable error or once the token is
/// cancelled.
pub type WatchingMechanism =
    Arc<dyn Fn(CancellationToken, PathBuf, mpsc::Sender<()>) -> BoxFuture<'static, ()> + Send + Sync>;

/// Resolved endpoint overrides. Unset fields mean "use the default policy".
#[derive(Clone, Default)]
pub struct EndpointOptions {
    cache_path_callback: Option<PathCallback>,
    staging_root_callback: Option<PathCallback>,
    watching_mechanism: Option<WatchingMechanism>,
}

impl EndpointOptions {
    /// Resolve a sequence of options, applying them in order.
    pub fn new(options: impl IntoIterator<Item = EndpointOption>) -> Self {
        let mut resolved = Self::default();
        for option in options {
            option.apply(&mut resolved);
        }
        resolved
    }

    pub fn cache_path_callback(&self) -> Option<&PathCallback> {
        self.cache_path_callback.as_ref()
    }

    pub fn staging_root_callback(&self) -> Option<&PathCallback> {
        self.staging_root_callback.as_ref()
    }

    pub fn watching_mechanism(&self) -> Option<&WatchingMechanism> {
        self.watching_mechanism.as_ref()
    }

    /// Compute the cache path, using `default` when no override is set.
    ///
    /// # Errors
    /// - [`Error::Override`] carrying the callback's error unchanged
    /// - whatever `default` returns
    pub fn resolve_cache_path<F>(&self, session: &SessionId, alpha: bool, default: F) -> Result<PathBuf>
    where
        F: FnOnce() -> Result<PathBuf>,
    {
        resolve_path(self.cache_path_callback.as_ref(), "cache path", session, alpha, default)
    }

    /// Compute the staging root, using `default` when no override is set.
    pub fn resolve_staging_root<F>(&self, session: &SessionId, alpha: bool, default: F) -> Result<PathBuf>
    where
        F: FnOnce() -> Result<PathBuf>,
    {
        resolve_path(
            self.staging_root_callback.as_ref(),
            "staging root",
            session,
            alpha,
            default,
        )
    }
}

fn resolve_path<F>(
    callback: Option<&PathCallback>,
    name: &'static str,
    session: &SessionId,
    alpha: bool,
    default: F,
) -> Result<PathBuf>
where
    F: FnOnce() -> Result<PathBuf>,
{
    match callback {
        Some(callback) => callback(session, alpha).map_err(|source| Error::Override { name, source }),
        None => default(),
    }
}

impl fmt::Debug for EndpointOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointOptions")
            .field("cache_path_callback", &self.cache_path_callback.is_some())
            .field("staging_root_callback", &self.staging_root_callback.is_some())
            .field("watching_mechanism", &self.watching_mechanism.is_some())
            .finish()
    }
}

/// A single endpoint override.
pub struct EndpointOption(OptionKind);

enum OptionKind {
    CachePath(PathCallback),
    StagingRoot(PathCallback),
    Watching(WatchingMechanism),
}

impl EndpointOption {
    fn apply(self, options: &mut EndpointOptions) {
        match self.0 {
            OptionKind::CachePath(callback) => options.cache_path_callback = Some(callback),
            OptionKind::StagingRoot(callback) => options.staging_root_callback = Some(callback),
            OptionKind::Watching(mechanism) => options.watching_mechanism = Some(mechanism),
        }
    }
}

impl fmt::Debug for EndpointOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self.0 {
            OptionKind::CachePath(_) => "CachePath",
            OptionKind::StagingRoot(_) => "StagingRoot",
            OptionKind::Watching(_) => "Watching",
        };
        write!(f, "EndpointOption({})", name)
    }
}

/// Override how the endpoint computes its snapshot cache path.
pub fn with_cache_path_callback<F>(callback: F) -> EndpointOption
where
    F: Fn(&SessionId, bool) -> std::result::Result<PathBuf, BoxError> + Send + Sync + 'static,
{
    EndpointOption(OptionKind::CachePath(Arc::new(callback)))
}

/// Override how the endpoint computes its staging root.
///
/// The returned path may already exist, but if it does it must be a directory.
pub fn with_staging_root_callback<F>(callback: F) -> EndpointOption
where
    F: Fn(&SessionId, bool) -> std::result::Result<PathBuf, BoxError> + Send + Sync + 'static,
{
    EndpointOption(OptionKind::StagingRoot(Arc::new(callback)))
}

/// Override the filesystem watching mechanism.
pub fn with_watching_mechanism<F, Fut>(mechanism: F) -> EndpointOption
where
    F: Fn(CancellationToken, PathBuf, mpsc::Sender<()>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let mechanism: WatchingMechanism = Arc::new(
        move |cancel: CancellationToken, path: PathBuf, events: mpsc::Sender<()>| -> BoxFuture<'static, ()> {
            Box::pin(mechanism(cancel, path, events))
        },
    );
    EndpointOption(OptionKind::Watching(mechanism))
}
