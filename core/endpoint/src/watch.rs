//! Watch notifications.
//!
//! A watching mechanism reports "something changed under the root" through a
//! bounded channel of capacity one. Signals carry no payload: the consumer
//! rescans the whole tree on any signal, so redundant signals may be dropped.
//! Closure of the channel is the only termination event the consumer sees,
//! whether the mechanism failed or observed cancellation.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Create a notification channel with a single pending slot.
pub fn channel() -> (mpsc::Sender<()>, mpsc::Receiver<()>) {
    mpsc::channel(1)
}

/// Signal a change without blocking.
///
/// A full channel already holds a pending signal, so the new one is dropped.
/// Returns `false` once the consumer has gone away, after which the mechanism
/// should stop.
pub fn notify(events: &mpsc::Sender<()>) -> bool {
    match events.try_send(()) {
        Ok(()) | Err(mpsc::error::TrySendError::Full(())) => true,
        Err(mpsc::error::TrySendError::Closed(())) => false,
    }
}

/// Lightweight per-path state compared between polls.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Fingerprint {
    is_dir: bool,
    len: u64,
    modified: Option<SystemTime>,
}

/// Polling watching mechanism.
///
/// Walks `root` every `interval` and signals when any path's type, size or
/// modification time differs from the previous walk. The first walk only
/// establishes the baseline. Stops, dropping `events`, when `cancel` fires,
/// when the consumer closes its receiver, or when a walk fails.
pub async fn poll(cancel: CancellationToken, root: PathBuf, events: mpsc::Sender<()>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut previous: Option<BTreeMap<PathBuf, Fingerprint>> = None;

    debug!("Polling {} every {:?}", root.display(), interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Polling of {} cancelled", root.display());
                break;
            }
            _ = ticker.tick() => {}
        }

        let walk_root = root.clone();
        let current = match tokio::task::spawn_blocking(move || fingerprint_tree(&walk_root)).await {
            Ok(Ok(current)) => current,
            Ok(Err(e)) => {
                warn!("Polling of {} failed: {}", root.display(), e);
                break;
            }
            Err(e) => {
                warn!("Polling task for {} failed: {}", root.display(), e);
                break;
            }
        };

        if let Some(previous) = &previous {
            if *previous != current && !notify(&events) {
                debug!("Watch consumer for {} went away", root.display());
                break;
            }
        }
        previous = Some(current);
    }
}

fn fingerprint_tree(root: &Path) -> io::Result<BTreeMap<PathBuf, Fingerprint>> {
    let mut out = BTreeMap::new();
    match fs::symlink_metadata(root) {
        Ok(metadata) => fingerprint_into(root, &metadata, &mut out)?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    Ok(out)
}

fn fingerprint_into(
    path: &Path,
    metadata: &fs::Metadata,
    out: &mut BTreeMap<PathBuf, Fingerprint>,
) -> io::Result<()> {
    out.insert(
        path.to_path_buf(),
        Fingerprint {
            is_dir: metadata.is_dir(),
            len: metadata.len(),
            modified: metadata.modified().ok(),
        },
    );

    if metadata.is_dir() {
        for entry in fs::read_dir(path)? {
            let entry = entry?;
            // Entries may vanish between listing and inspection.
            match entry.path().symlink_metadata() {
                Ok(child) => fingerprint_into(&entry.path(), &child, out)?,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::time::timeout;

    const DEADLINE: Duration = Duration::from_secs(10);

    #[tokio::test]
    async fn test_notify_never_blocks() {
        let (tx, mut rx) = channel();
        assert!(notify(&tx));
        assert!(notify(&tx));
        assert!(notify(&tx));

        assert_eq!(rx.recv().await, Some(()));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_notify_reports_closed_consumer() {
        let (tx, rx) = channel();
        drop(rx);
        assert!(!notify(&tx));
    }

    #[tokio::test]
    async fn test_poll_signals_on_change() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().to_path_buf();
        let cancel = CancellationToken::new();
        let (tx, mut rx) = channel();

        let task = tokio::spawn(poll(cancel.clone(), root.clone(), tx, Duration::from_millis(20)));

        // Keep modifying until the watcher, which may not have taken its
        // baseline yet, reports a change.
        let signalled = timeout(DEADLINE, async {
            let mut counter = 0u32;
            loop {
                counter += 1;
                std::fs::write(root.join(format!("file-{}", counter)), b"x").unwrap();
                if timeout(Duration::from_millis(100), rx.recv()).await.is_ok() {
                    break;
                }
            }
        })
        .await;
        assert!(signalled.is_ok());

        cancel.cancel();
        let closed = timeout(DEADLINE, async {
            while rx.recv().await.is_some() {}
        })
        .await;
        assert!(closed.is_ok());
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_poll_stops_when_consumer_drops() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().to_path_buf();
        let (tx, rx) = channel();
        let task = tokio::spawn(poll(
            CancellationToken::new(),
            root.clone(),
            tx,
            Duration::from_millis(10),
        ));
        drop(rx);

        let finished = timeout(DEADLINE, async {
            let mut counter = 0u32;
            while !task.is_finished() {
                counter += 1;
                std::fs::write(root.join(format!("f{}", counter)), b"x").unwrap();
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await;
        assert!(finished.is_ok());
    }

    #[test]
    fn test_fingerprint_missing_root_is_empty() {
        let temp = TempDir::new().unwrap();
        assert!(fingerprint_tree(&temp.path().join("absent")).unwrap().is_empty());
    }
}
