//! Terminal role: watch editor logs and ship them to the Application

use std::sync::Arc;

use async_trait::async_trait;
use logrelay_core::{Notice, ParsedCommand, RelayQueue, parse};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::connection::{self, ConnectionError, Listener, Outbound};
use crate::console;
use crate::dispatch::{Dispatcher, Endpoint};
use crate::logs::dated::DatedLogStore;
use crate::logs::watched::{LogRelay, RelayOutcome, Trigger};
use crate::report::Reporter;
use crate::settings::{Settings, WatchSettings};
use crate::stability::{self, DirSizes, StabilityDetector, StableHandler};

/// Handles commands forwarded by the Application
pub struct TerminalEndpoint {
    relay: Arc<LogRelay>,
    reporter: Reporter,
}

impl TerminalEndpoint {
    pub fn new(relay: Arc<LogRelay>, reporter: Reporter) -> Self {
        Self { relay, reporter }
    }
}

#[async_trait]
impl Endpoint for TerminalEndpoint {
    async fn on_known_command(&self, body: &str) {
        if parse(body) != ParsedCommand::ShowCurrent {
            // Dated log commands act on the Application's own files
            info!(command = %body, "command handled by the app");
            self.reporter.text(format!("received command: {body}"));
            return;
        }

        info!("manual log update requested");
        for (name, result) in self.relay.relay_all().await {
            if let Err(e) = result {
                warn!(log = %name, error = %e, "manual relay failed");
                self.reporter.failure(Notice::Unknown, &e);
            }
        }
    }
}

/// Relays a log once the stability detector reports it settled
pub struct RelayWhenStable {
    relay: Arc<LogRelay>,
    reporter: Reporter,
}

impl RelayWhenStable {
    pub fn new(relay: Arc<LogRelay>, reporter: Reporter) -> Self {
        Self { relay, reporter }
    }
}

#[async_trait]
impl StableHandler for RelayWhenStable {
    async fn on_stable(&self, key: String) {
        match self.relay.relay(&key, Trigger::Automatic).await {
            Ok(RelayOutcome::Sent { lines, delivered }) => {
                info!(log = %key, lines, delivered, "relayed")
            }
            Ok(_) => {}
            Err(e) => {
                warn!(log = %key, error = %e, "relay failed");
                self.reporter.failure(Notice::Unknown, &e);
            }
        }
    }
}

/// Run the Terminal until cancelled
///
/// Only a bind failure is returned; everything else is reported and survived.
pub async fn run(
    settings: Settings,
    watch: WatchSettings,
    cancel: CancellationToken,
) -> Result<(), ConnectionError> {
    let queue = Arc::new(RelayQueue::new(settings.queue_capacity, settings.overflow));
    let reporter = Reporter::new(Arc::clone(&queue), settings.verbose);

    let store = DatedLogStore::new(&settings.log_dir);
    if let Err(e) = store.ensure_dir() {
        warn!(dir = %settings.log_dir.display(), error = %e, "failed to create log directory");
    }

    let outbound = Arc::new(Outbound::new(
        &settings.target,
        settings.peer_port,
        settings.connect_timeout,
        reporter.clone(),
    ));
    let relay = Arc::new(LogRelay::new(&watch.dir, &watch.logs, outbound));
    relay.prepare().await;

    let detector = StabilityDetector::new(
        DirSizes::new(&watch.dir),
        RelayWhenStable::new(Arc::clone(&relay), reporter.clone()),
        watch.quantum,
    );
    // Dropping the watcher stops the events
    let _watcher = match stability::watch_logs(&watch.dir, watch.logs.clone(), detector) {
        Ok(watcher) => Some(watcher),
        Err(e) => {
            warn!("{}; only manual updates will be relayed", e);
            None
        }
    };

    let listener = Listener::bind(
        &settings.host,
        settings.listen_port,
        settings.timeout,
        reporter.clone(),
    )
    .await?;
    connection::trace_state(listener.state());
    let endpoint = Arc::new(TerminalEndpoint::new(Arc::clone(&relay), reporter.clone()));
    let dispatcher = Arc::new(Dispatcher::new(endpoint, store, reporter));

    let display = tokio::spawn(console::pump(queue, cancel.clone(), |batch| {
        for entry in batch {
            info!(target: "logrelay::display", "{}", entry);
        }
    }));

    listener.run(dispatcher, cancel).await;
    let _ = display.await;
    Ok(())
}
