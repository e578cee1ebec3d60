//! Editor logs watched by the Terminal and the relay cycle that ships them
//!
//! A relay copies the live log to a `~<name>` shadow file beside it, truncates
//! the live log so the editor keeps appending to an empty file, filters the
//! shadow copy and sends it to the peer as one log package. The shadow is
//! always removed afterwards.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use logrelay_core::Message;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::connection::MessageSink;

/// Substrings of editor boilerplate lines that are never relayed
const NOISE: &[&str] = &[
    "UnityEngine.StackTraceUtility:ExtractStackTrace",
    "UnityEngine.DebugLogHandler:Internal_Log",
    "UnityEngine.Debug:Log",
    "UnityEngine.Logger:Log",
    "(Filename: ",
    "Refreshing native plugins",
    "[Licensing::",
    "Unloading ",
    "System memory in use",
    "UnloadTime:",
];

/// One editor log and its shadow copy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedLog {
    pub name: String,
    pub path: PathBuf,
    pub shadow_path: PathBuf,
}

impl WatchedLog {
    pub fn new(dir: &Path, name: &str) -> Self {
        Self {
            name: name.to_string(),
            path: dir.join(name),
            shadow_path: dir.join(format!("~{name}")),
        }
    }
}

/// What started a relay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// The user asked for the current log
    Manual,
    /// The stability detector saw the log settle after a change
    Automatic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    /// A package with this many lines was handed to the sink
    Sent { lines: usize, delivered: bool },
    /// The live log was empty
    Empty,
    /// The live log does not exist
    Missing,
    /// The name is not one of the watched logs
    Unknown,
}

/// Drop editor noise and blank lines from a log dump
pub fn filter_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| line.trim_end_matches(['\t', '\r']))
        .filter(|line| !line.trim().is_empty())
        .filter(|line| !NOISE.iter().any(|noise| line.contains(noise)))
        .map(str::to_string)
        .collect()
}

/// Runs relay cycles for a fixed set of watched logs
pub struct LogRelay {
    logs: Vec<WatchedLog>,
    // At most one shadow file per log at a time
    locks: HashMap<String, Mutex<()>>,
    sink: Arc<dyn MessageSink>,
}

impl LogRelay {
    pub fn new(dir: &Path, names: &[String], sink: Arc<dyn MessageSink>) -> Self {
        let logs: Vec<WatchedLog> = names.iter().map(|n| WatchedLog::new(dir, n)).collect();
        let locks = logs
            .iter()
            .map(|log| (log.name.clone(), Mutex::new(())))
            .collect();
        Self { logs, locks, sink }
    }

    /// Remove shadow files left behind by a previous session and report missing logs
    pub async fn prepare(&self) {
        for log in &self.logs {
            if tokio::fs::try_exists(&log.shadow_path).await.unwrap_or(false) {
                warn!(path = %log.shadow_path.display(), "removing stale shadow file");
                if let Err(e) = tokio::fs::remove_file(&log.shadow_path).await {
                    warn!(path = %log.shadow_path.display(), error = %e, "failed to remove stale shadow file");
                }
            }
            if !tokio::fs::try_exists(&log.path).await.unwrap_or(false) {
                warn!(path = %log.path.display(), "watched log does not exist yet");
            }
        }
    }

    /// Relay every watched log on user request
    ///
    /// If all logs are empty the peer gets a single `AllLogsEmpty` instead of
    /// one `LogEmpty` per log.
    pub async fn relay_all(&self) -> Vec<(String, io::Result<RelayOutcome>)> {
        let mut any_content = false;
        for log in &self.logs {
            if live_size(&log.path).await.unwrap_or(0) > 0 {
                any_content = true;
                break;
            }
        }
        if !any_content {
            info!("no watched log has new content");
            self.sink.send(&Message::AllLogsEmpty).await;
            return self
                .logs
                .iter()
                .map(|log| (log.name.clone(), Ok(RelayOutcome::Empty)))
                .collect();
        }

        let mut results = Vec::with_capacity(self.logs.len());
        for log in &self.logs {
            let outcome = self.relay(&log.name, Trigger::Manual).await;
            results.push((log.name.clone(), outcome));
        }
        results
    }

    /// Run one relay cycle for a watched log
    pub async fn relay(&self, name: &str, trigger: Trigger) -> io::Result<RelayOutcome> {
        let (Some(log), Some(lock)) = (
            self.logs.iter().find(|log| log.name == name),
            self.locks.get(name),
        ) else {
            return Ok(RelayOutcome::Unknown);
        };
        let _guard = lock.lock().await;

        let size = match live_size(&log.path).await {
            Ok(size) => size,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(RelayOutcome::Missing),
            Err(e) => return Err(e),
        };
        if size == 0 {
            // Truncating the live log fires another change event; only a user
            // request reports emptiness.
            if trigger == Trigger::Manual {
                self.sink
                    .send(&Message::LogEmpty {
                        log_name: log.name.clone(),
                    })
                    .await;
            }
            return Ok(RelayOutcome::Empty);
        }

        tokio::fs::copy(&log.path, &log.shadow_path).await?;
        let result = self.ship_shadow(log).await;
        if let Err(e) = tokio::fs::remove_file(&log.shadow_path).await {
            warn!(path = %log.shadow_path.display(), error = %e, "failed to remove shadow file");
        }
        result
    }

    async fn ship_shadow(&self, log: &WatchedLog) -> io::Result<RelayOutcome> {
        tokio::fs::OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&log.path)
            .await?;

        let raw = tokio::fs::read(&log.shadow_path).await?;
        let lines = filter_lines(&String::from_utf8_lossy(&raw));
        let count = lines.len();
        debug!(log = %log.name, lines = count, "relaying log package");

        let delivered = self.sink.send(&Message::LogPackage { lines }).await;
        if delivered {
            info!(log = %log.name, lines = count, "log package sent");
        }
        Ok(RelayOutcome::Sent {
            lines: count,
            delivered,
        })
    }
}

async fn live_size(path: &Path) -> io::Result<u64> {
    tokio::fs::metadata(path).await.map(|m| m.len())
}
