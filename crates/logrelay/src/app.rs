//! Application role: receive logs, run commands and feed the display

use std::sync::Arc;

use async_trait::async_trait;
use logrelay_core::{DisplayEntry, Message, RelayQueue, parse};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::commands::CommandExecutor;
use crate::connection::{self, ConnectionError, Listener, MessageSink, Outbound};
use crate::console;
use crate::dispatch::{Dispatcher, Endpoint};
use crate::logs::dated::DatedLogStore;
use crate::report::Reporter;
use crate::settings::Settings;

/// The interface a display uses to drive the Application
pub struct Controller {
    executor: CommandExecutor,
    outbound: Arc<dyn MessageSink>,
    reporter: Reporter,
}

impl Controller {
    pub fn new(
        executor: CommandExecutor,
        outbound: Arc<dyn MessageSink>,
        reporter: Reporter,
    ) -> Self {
        Self {
            executor,
            outbound,
            reporter,
        }
    }

    /// Run a user command locally, then forward it to the Terminal
    ///
    /// Returns whether the forward reached the peer.
    pub async fn submit_command(&self, raw: &str) -> bool {
        let parsed = parse(raw);
        debug!(command = %raw, ?parsed, "submitting command");
        for entry in self.executor.execute(&parsed) {
            self.reporter.entry(entry);
        }
        self.outbound
            .send(&Message::command(parsed.is_known(), raw))
            .await
    }

    /// Current display contents, oldest first
    #[allow(dead_code)] // Polled by display front ends
    pub fn snapshot(&self) -> Vec<DisplayEntry> {
        self.reporter.queue().snapshot()
    }

    /// Test the connection to the Terminal and report the result
    pub async fn check_connection(&self) -> bool {
        self.outbound.probe().await
    }
}

/// Runs commands that the Terminal forwards to the Application
pub struct ApplicationEndpoint {
    executor: CommandExecutor,
    reporter: Reporter,
}

impl ApplicationEndpoint {
    pub fn new(executor: CommandExecutor, reporter: Reporter) -> Self {
        Self { executor, reporter }
    }
}

#[async_trait]
impl Endpoint for ApplicationEndpoint {
    async fn on_known_command(&self, body: &str) {
        for entry in self.executor.execute(&parse(body)) {
            self.reporter.entry(entry);
        }
    }
}

/// Run the Application until cancelled, printing entries and reading commands
///
/// Only a bind failure is returned; everything else is reported and survived.
pub async fn run(
    settings: Settings,
    json: bool,
    cancel: CancellationToken,
) -> Result<(), ConnectionError> {
    let queue = Arc::new(RelayQueue::new(settings.queue_capacity, settings.overflow));
    let reporter = Reporter::new(Arc::clone(&queue), settings.verbose);

    let store = DatedLogStore::new(&settings.log_dir);
    if let Err(e) = store.ensure_dir() {
        warn!(dir = %settings.log_dir.display(), error = %e, "failed to create log directory");
    }
    let executor = CommandExecutor::new(store.clone(), settings.line_cap, settings.verbose);

    let listener = Listener::bind(
        &settings.host,
        settings.listen_port,
        settings.timeout,
        reporter.clone(),
    )
    .await?;
    connection::trace_state(listener.state());
    let endpoint = Arc::new(ApplicationEndpoint::new(executor.clone(), reporter.clone()));
    let dispatcher = Arc::new(Dispatcher::new(endpoint, store, reporter.clone()));
    let listening = tokio::spawn(listener.run(dispatcher, cancel.clone()));

    let outbound = Arc::new(Outbound::new(
        &settings.target,
        settings.peer_port,
        settings.connect_timeout,
        reporter.clone(),
    ));
    let controller = Controller::new(executor, outbound, reporter);

    let display = tokio::spawn(console::pump(queue, cancel.clone(), move |batch| {
        for entry in batch {
            println!("{}", console::render(&entry, json));
        }
    }));

    info!("type a command and press enter; `?` lists commands");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.next_line() => line,
        };
        match line {
            Ok(Some(line)) if line.trim().is_empty() => {}
            Ok(Some(line)) if line.trim() == "reconnect" => {
                controller.check_connection().await;
            }
            Ok(Some(line)) => {
                controller.submit_command(&line).await;
            }
            Ok(None) => {
                debug!("stdin closed, running until interrupted");
                cancel.cancelled().await;
                break;
            }
            Err(e) => {
                warn!(error = %e, "failed to read command");
                cancel.cancelled().await;
                break;
            }
        }
    }

    let _ = listening.await;
    let _ = display.await;
    Ok(())
}
