//! Debounced change detection for watched logs
//!
//! A change signal for a key starts a detector task that records the file
//! size, sleeps one quantum and compares. While the size keeps changing the
//! detector keeps waiting; once two consecutive readings agree the key is
//! stable and the handler runs once. Further signals for a key that already has
//! a detector reset that detector's window instead of starting a second one.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Default polling interval between size readings
pub const DEFAULT_QUANTUM: Duration = Duration::from_secs(1);

/// Where the detector reads sizes from
#[async_trait]
pub trait SizeSource: Send + Sync + 'static {
    /// Current size for a key; a missing file reads as 0
    async fn size(&self, key: &str) -> u64;
}

/// Called once per settled change
#[async_trait]
pub trait StableHandler: Send + Sync + 'static {
    async fn on_stable(&self, key: String);
}

/// Reads sizes of files named by key inside one directory
#[derive(Debug, Clone)]
pub struct DirSizes {
    dir: PathBuf,
}

impl DirSizes {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl SizeSource for DirSizes {
    async fn size(&self, key: &str) -> u64 {
        tokio::fs::metadata(self.dir.join(key))
            .await
            .map(|m| m.len())
            .unwrap_or(0)
    }
}

struct Inner<S, H> {
    sizes: S,
    handler: H,
    quantum: Duration,
    // Reset channel of every key with a running detector
    active: Mutex<HashMap<String, mpsc::UnboundedSender<()>>>,
}

/// Per-key debounce of change signals
pub struct StabilityDetector<S, H> {
    inner: Arc<Inner<S, H>>,
}

impl<S, H> Clone for StabilityDetector<S, H> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: SizeSource, H: StableHandler> StabilityDetector<S, H> {
    pub fn new(sizes: S, handler: H, quantum: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                sizes,
                handler,
                quantum,
                active: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Report that `key` changed
    pub fn signal(&self, key: &str) {
        let mut active = self
            .inner
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(reset) = active.get(key) {
            if reset.send(()).is_ok() {
                debug!(key, "change during stabilization, window reset");
                return;
            }
        }

        let (reset_tx, reset_rx) = mpsc::unbounded_channel();
        active.insert(key.to_string(), reset_tx);
        drop(active);

        let inner = Arc::clone(&self.inner);
        let key = key.to_string();
        tokio::spawn(async move {
            stabilize(&inner, &key, reset_rx).await;
            inner.handler.on_stable(key).await;
        });
    }

    /// Number of keys with a running detector
    #[cfg(test)]
    pub fn active(&self) -> usize {
        self.inner
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Wait until the size of `key` stops changing, then deregister it
async fn stabilize<S: SizeSource, H>(
    inner: &Inner<S, H>,
    key: &str,
    mut resets: mpsc::UnboundedReceiver<()>,
) {
    let mut last = inner.sizes.size(key).await;
    loop {
        tokio::select! {
            _ = tokio::time::sleep(inner.quantum) => {}
            Some(()) = resets.recv() => {
                last = inner.sizes.size(key).await;
                continue;
            }
        }

        let current = inner.sizes.size(key).await;
        if current != last {
            last = current;
            continue;
        }

        // A signal may have landed between the last reading and taking the lock
        let reset_pending = {
            let mut active = inner.active.lock().unwrap_or_else(PoisonError::into_inner);
            let pending = resets.try_recv().is_ok();
            if !pending {
                active.remove(key);
            }
            pending
        };
        if reset_pending {
            while resets.try_recv().is_ok() {}
            last = inner.sizes.size(key).await;
            continue;
        }
        debug!(key, size = current, "stable");
        return;
    }
}

/// Forward filesystem events for the watched names to the detector
///
/// Events for shadow files (`~name`) and for other files in the directory
/// are ignored. The returned watcher must be kept alive.
pub fn watch_logs<S: SizeSource, H: StableHandler>(
    dir: &Path,
    names: Vec<String>,
    detector: StabilityDetector<S, H>,
) -> Result<RecommendedWatcher, String> {
    // Bridge notify's sync callback into the tokio world.
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();

    let mut watcher =
        notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| {
            let _ = event_tx.send(res);
        })
        .map_err(|e| format!("failed to create log watcher: {}", e))?;

    watcher
        .watch(dir, RecursiveMode::NonRecursive)
        .map_err(|e| format!("failed to watch {}: {}", dir.display(), e))?;
    info!("watching {} for {}", dir.display(), names.join(", "));

    tokio::spawn(async move {
        while let Some(res) = event_rx.recv().await {
            match res {
                Ok(event) => {
                    for name in changed_names(&event, &names) {
                        detector.signal(&name);
                    }
                }
                Err(e) => warn!(error = %e, "log watcher error"),
            }
        }
    });

    Ok(watcher)
}

/// Watched names touched by a create or modify event
fn changed_names(event: &notify::Event, names: &[String]) -> Vec<String> {
    if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
        return Vec::new();
    }
    let mut changed: Vec<String> = event
        .paths
        .iter()
        .filter_map(|p| p.file_name().and_then(|n| n.to_str()))
        .filter(|name| !name.starts_with('~'))
        .filter(|name| names.iter().any(|n| n == name))
        .map(str::to_string)
        .collect();
    changed.dedup();
    changed
}
