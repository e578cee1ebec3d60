//! Console stand-in for the display: drains the relay queue once per second

use std::sync::Arc;
use std::time::Duration;

use logrelay_core::{DisplayEntry, RelayQueue};
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// How long one drain waits for new entries
pub const DRAIN_INTERVAL: Duration = Duration::from_secs(1);

/// Drain `queue` until cancelled, handing every batch to `emit`
pub async fn pump<F>(queue: Arc<RelayQueue>, cancel: CancellationToken, mut emit: F)
where
    F: FnMut(Vec<DisplayEntry>) + Send,
{
    loop {
        let waiting = Arc::clone(&queue);
        let mut drain = tokio::task::spawn_blocking(move || waiting.drain_timeout(DRAIN_INTERVAL));
        let finished = tokio::select! {
            batch = &mut drain => Some(batch),
            _ = cancel.cancelled() => None,
        };
        // An in-flight drain may already hold entries, so wait for it on shutdown
        let (batch, stop) = match finished {
            Some(batch) => (batch, false),
            None => (drain.await, true),
        };
        match batch {
            Ok(entries) if !entries.is_empty() => emit(entries),
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "display drain task failed");
                break;
            }
        }
        if stop {
            break;
        }
    }
    // Flush whatever arrived before shutdown
    let rest = queue.drain();
    if !rest.is_empty() {
        emit(rest);
    }
}

/// Render one entry for the terminal
pub fn render(entry: &DisplayEntry, json: bool) -> String {
    if json {
        serde_json::to_string(entry).unwrap_or_else(|_| entry.to_string())
    } else {
        entry.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn entry(text: &str) -> DisplayEntry {
        DisplayEntry {
            timestamp: "10:15AM".to_string(),
            text: text.to_string(),
        }
    }

    #[test]
    fn test_render_text_and_json() {
        let e = entry("ready");
        assert_eq!(render(&e, false), "10:15AM: ready");
        assert_eq!(
            render(&e, true),
            r#"{"timestamp":"10:15AM","text":"ready"}"#
        );
    }

    #[tokio::test]
    async fn test_pump_delivers_in_order_and_flushes_on_cancel() {
        let queue = Arc::new(RelayQueue::default());
        let cancel = CancellationToken::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let task = {
            let queue = Arc::clone(&queue);
            let cancel = cancel.clone();
            let seen = Arc::clone(&seen);
            tokio::spawn(pump(queue, cancel, move |batch| {
                seen.lock().unwrap().extend(batch.into_iter().map(|e| e.text));
            }))
        };

        queue.push(entry("one")).unwrap();
        queue.push(entry("two")).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        queue.push(entry("three")).unwrap();
        cancel.cancel();
        task.await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["one", "two", "three"]);
    }
}
