//! Routing of decoded messages to the endpoint, the display queue and disk

use std::sync::Arc;

use async_trait::async_trait;
use logrelay_core::{CommandTag, Message, Notice};
use tracing::{debug, info, warn};

use crate::connection::MessageHandler;
use crate::logs::dated::DatedLogStore;
use crate::report::Reporter;

/// Endpoint-specific reaction to a command that matched the grammar
#[async_trait]
pub trait Endpoint: Send + Sync {
    async fn on_known_command(&self, body: &str);
}

/// Classifies every message received from the peer
pub struct Dispatcher {
    endpoint: Arc<dyn Endpoint>,
    store: DatedLogStore,
    reporter: Reporter,
}

impl Dispatcher {
    pub fn new(endpoint: Arc<dyn Endpoint>, store: DatedLogStore, reporter: Reporter) -> Self {
        Self {
            endpoint,
            store,
            reporter,
        }
    }

    pub async fn dispatch(&self, message: Message) {
        match message {
            Message::Command {
                tag: CommandTag::Known,
                body,
            } => {
                debug!(command = %body, "known command received");
                self.endpoint.on_known_command(&body).await;
            }
            Message::Command {
                tag: CommandTag::Unknown,
                body,
            } => self.reporter.text(body),
            Message::LogEmpty { log_name } => self.reporter.notice(Notice::LogEmpty(log_name)),
            Message::AllLogsEmpty => self.reporter.notice(Notice::AllLogsEmpty),
            Message::LogPackage { lines } => self.store_package(lines),
        }
    }

    fn store_package(&self, lines: Vec<String>) {
        info!(lines = lines.len(), "log package received");
        if let Err(e) = self.store.append_today(&lines) {
            warn!(dir = %self.store.dir().display(), error = %e, "failed to persist log package");
            self.reporter.failure(Notice::Unknown, &e);
        }
        for line in lines {
            if !line.trim().is_empty() {
                self.reporter.text(line);
            }
        }
    }
}

#[async_trait]
impl MessageHandler for Dispatcher {
    async fn handle(&self, message: Message) {
        self.dispatch(message).await;
    }
}
