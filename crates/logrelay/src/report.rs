//! User-facing status reporting into the relay queue

use std::fmt::Display;
use std::sync::Arc;

use logrelay_core::{DisplayEntry, Notice, OverflowPolicy, RelayQueue};
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::warn;

/// Pushes display entries, adding system error detail in verbose mode
#[derive(Debug, Clone)]
pub struct Reporter {
    queue: Arc<RelayQueue>,
    verbose: bool,
}

impl Reporter {
    pub fn new(queue: Arc<RelayQueue>, verbose: bool) -> Self {
        Self { queue, verbose }
    }

    pub fn queue(&self) -> &Arc<RelayQueue> {
        &self.queue
    }

    /// Push one entry
    ///
    /// Under the block policy a full queue makes the push wait. On a
    /// multi-threaded runtime that wait runs through `block_in_place`, so the
    /// other tasks on this worker move elsewhere and the drain keeps running.
    pub fn entry(&self, entry: DisplayEntry) {
        let result = if self.may_block_worker() {
            tokio::task::block_in_place(|| self.queue.push(entry))
        } else {
            self.queue.push(entry)
        };
        if let Err(e) = result {
            warn!(error = %e, "display entry dropped");
        }
    }

    fn may_block_worker(&self) -> bool {
        matches!(self.queue.policy(), OverflowPolicy::Block { .. })
            && Handle::try_current()
                .is_ok_and(|handle| handle.runtime_flavor() == RuntimeFlavor::MultiThread)
    }

    pub fn text(&self, text: impl Into<String>) {
        self.entry(DisplayEntry::now(text));
    }

    pub fn notice(&self, notice: Notice) {
        self.text(notice.text());
    }

    /// Report a failure as a notice, followed by `---> <err>` when verbose
    pub fn failure(&self, notice: Notice, err: &dyn Display) {
        self.notice(notice);
        if self.verbose {
            self.text(format!("---> {err}"));
        }
    }
}
