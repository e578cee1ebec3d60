//! Bounded FIFO of display entries shared between producers and the UI

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::entry::DisplayEntry;

/// Default number of entries held before the overflow policy applies
pub const DEFAULT_CAPACITY: usize = 2000;

/// What `push` does when the queue is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Evict the oldest entry to make room. Never blocks.
    #[default]
    DropOldest,
    /// Wait up to `timeout` for the consumer to make room, then reject
    ///
    /// The wait parks the calling thread. Async callers must not push from a
    /// runtime worker without `tokio::task::block_in_place` or
    /// `spawn_blocking`.
    Block { timeout: Duration },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    /// The queue stayed full for the whole blocking window
    #[error("relay queue full ({capacity} entries), entry dropped")]
    Full { capacity: usize },
}

/// Bounded multi-producer queue of display entries
///
/// Producers call [`push`](Self::push) from any thread. The UI consumer reads
/// either a non-destructive [`snapshot`](Self::snapshot) or removes entries
/// with [`drain_timeout`](Self::drain_timeout).
#[derive(Debug)]
pub struct RelayQueue {
    entries: Mutex<VecDeque<DisplayEntry>>,
    changed: Condvar,
    capacity: usize,
    policy: OverflowPolicy,
}

impl Default for RelayQueue {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, OverflowPolicy::default())
    }
}

impl RelayQueue {
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(DEFAULT_CAPACITY))),
            changed: Condvar::new(),
            capacity,
            policy,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    /// Append an entry, applying the overflow policy when full
    pub fn push(&self, entry: DisplayEntry) -> Result<(), QueueError> {
        let mut entries = self.lock();
        match self.policy {
            OverflowPolicy::DropOldest => {
                while entries.len() >= self.capacity {
                    entries.pop_front();
                }
            }
            OverflowPolicy::Block { timeout } => {
                let deadline = Instant::now() + timeout;
                while entries.len() >= self.capacity {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(QueueError::Full {
                            capacity: self.capacity,
                        });
                    }
                    entries = self
                        .changed
                        .wait_timeout(entries, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0;
                }
            }
        }
        entries.push_back(entry);
        drop(entries);
        self.changed.notify_all();
        Ok(())
    }

    /// Append an entry built from text, stamped with the current time
    pub fn push_text(&self, text: impl Into<String>) -> Result<(), QueueError> {
        self.push(DisplayEntry::now(text))
    }

    /// Copy of the current contents in arrival order
    pub fn snapshot(&self) -> Vec<DisplayEntry> {
        self.lock().iter().cloned().collect()
    }

    /// Remove and return everything currently queued
    pub fn drain(&self) -> Vec<DisplayEntry> {
        let drained: Vec<_> = self.lock().drain(..).collect();
        self.changed.notify_all();
        drained
    }

    /// Wait up to `timeout` for at least one entry, then drain everything
    ///
    /// Returns an empty vector if nothing arrived in time.
    pub fn drain_timeout(&self, timeout: Duration) -> Vec<DisplayEntry> {
        let entries = self.lock();
        let (mut entries, _) = self
            .changed
            .wait_timeout_while(entries, timeout, |e| e.is_empty())
            .unwrap_or_else(PoisonError::into_inner);
        let drained: Vec<_> = entries.drain(..).collect();
        drop(entries);
        self.changed.notify_all();
        drained
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<DisplayEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
