//! TCP plumbing between the two endpoints
//!
//! Each endpoint runs one [`Listener`] for messages coming in from its peer
//! and uses an [`Outbound`] sender that opens a short-lived connection per
//! message going out.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use logrelay_core::{Message, MessageReader, Notice, ProtocolError};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::report::Reporter;

/// Default connect timeout for outbound sends
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("no peer connected within {secs}s")]
    AcceptTimeout { secs: u64 },

    #[error("connecting to {addr} timed out after {secs}s")]
    ConnectTimeout { addr: String, secs: u64 },

    #[error("failed to send to {addr}: {source}")]
    Send {
        addr: String,
        #[source]
        source: io::Error,
    },
}

/// Lifecycle of a listening endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Bound,
    Listening,
    /// A peer connected and nothing has been decoded yet
    Accepted,
    /// At least one message has arrived from the current peer
    Streaming,
    Closed,
    Failed,
}

/// Receives every message decoded from the peer
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: Message);
}

/// Anything that can deliver a message to the peer
#[async_trait]
pub trait MessageSink: Send + Sync {
    /// Deliver a message, returning whether it went out
    async fn send(&self, message: &Message) -> bool;

    /// Check that the peer is reachable
    async fn probe(&self) -> bool;
}

/// Accepts one peer at a time and decodes its messages
pub struct Listener {
    listener: TcpListener,
    timeout: Duration,
    state: watch::Sender<ConnectionState>,
    reporter: Reporter,
}

impl Listener {
    /// Bind the listening socket
    ///
    /// A bind failure is fatal for the endpoint.
    pub async fn bind(
        host: &str,
        port: u16,
        timeout: Duration,
        reporter: Reporter,
    ) -> Result<Self, ConnectionError> {
        let (state, _) = watch::channel(ConnectionState::Idle);
        let listener = match TcpListener::bind((host, port)).await {
            Ok(listener) => listener,
            Err(source) => {
                state.send_replace(ConnectionState::Failed);
                reporter.failure(Notice::BindFailed, &source);
                return Err(ConnectionError::Bind {
                    addr: format!("{host}:{port}"),
                    source,
                });
            }
        };
        state.send_replace(ConnectionState::Bound);
        reporter.notice(Notice::ServerEstablished);
        Ok(Self {
            listener,
            timeout,
            state,
            reporter,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Observe state changes
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Accept loop; runs until `cancel` fires
    pub async fn run(self, handler: Arc<dyn MessageHandler>, cancel: CancellationToken) {
        let addr = self
            .local_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        info!(%addr, "listening");

        loop {
            self.state.send_replace(ConnectionState::Listening);
            let accepted = tokio::select! {
                _ = cancel.cancelled() => break,
                res = tokio::time::timeout(self.timeout, self.listener.accept()) => res,
            };

            let (stream, peer) = match accepted {
                Err(_) => {
                    let err = ConnectionError::AcceptTimeout {
                        secs: self.timeout.as_secs(),
                    };
                    info!(%addr, "{}", err);
                    continue;
                }
                Ok(Err(e)) => {
                    warn!(%addr, error = %e, "accept failed");
                    continue;
                }
                Ok(Ok(conn)) => conn,
            };

            self.state.send_replace(ConnectionState::Accepted);
            debug!(%peer, "peer connected");
            if !self.serve_peer(stream, handler.as_ref(), &cancel).await {
                break;
            }
            debug!(%peer, "peer disconnected");
        }

        self.state.send_replace(ConnectionState::Closed);
        info!(%addr, "listener stopped");
    }

    /// Read messages from one peer until it leaves; false if cancelled
    async fn serve_peer(
        &self,
        stream: TcpStream,
        handler: &dyn MessageHandler,
        cancel: &CancellationToken,
    ) -> bool {
        let mut reader = MessageReader::new(stream);
        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return false,
                next = reader.next_message(self.timeout) => next,
            };
            match next {
                Ok(Some(message)) => {
                    self.state.send_replace(ConnectionState::Streaming);
                    handler.handle(message).await;
                }
                Ok(None) => return true,
                Err(e @ ProtocolError::FramingTimeout { .. }) => {
                    warn!(error = %e, "dropping partial message");
                    self.reporter.failure(Notice::TimedOut, &e);
                    return true;
                }
                Err(e) => {
                    warn!(error = %e, "failed to read from peer");
                    return true;
                }
            }
        }
    }
}

/// Trace every state change of a listener
pub fn trace_state(mut state: watch::Receiver<ConnectionState>) {
    tokio::spawn(async move {
        while state.changed().await.is_ok() {
            let current = *state.borrow_and_update();
            debug!(state = ?current, "connection state");
        }
    });
}

/// Sends each message on its own short-lived connection
#[derive(Debug, Clone)]
pub struct Outbound {
    target: String,
    port: u16,
    connect_timeout: Duration,
    reporter: Reporter,
}

impl Outbound {
    pub fn new(target: &str, port: u16, connect_timeout: Duration, reporter: Reporter) -> Self {
        Self {
            target: target.to_string(),
            port,
            connect_timeout,
            reporter,
        }
    }

    fn addr(&self) -> String {
        format!("{}:{}", self.target, self.port)
    }

    async fn connect(&self) -> Result<TcpStream, ConnectionError> {
        let addr = self.addr();
        match tokio::time::timeout(self.connect_timeout, TcpStream::connect(&addr)).await {
            Err(_) => Err(ConnectionError::ConnectTimeout {
                addr,
                secs: self.connect_timeout.as_secs(),
            }),
            Ok(Err(source)) => Err(ConnectionError::Send { addr, source }),
            Ok(Ok(stream)) => Ok(stream),
        }
    }

    /// Connect, write the encoded message and close
    pub async fn try_send(&self, message: &Message) -> Result<(), ConnectionError> {
        let mut stream = self.connect().await?;
        let bytes = message.encode();
        let write = async {
            stream.write_all(&bytes).await?;
            stream.shutdown().await
        };
        match tokio::time::timeout(self.connect_timeout, write).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(source)) => Err(ConnectionError::Send {
                addr: self.addr(),
                source,
            }),
            Err(_) => Err(ConnectionError::Send {
                addr: self.addr(),
                source: io::Error::new(io::ErrorKind::TimedOut, "write timed out"),
            }),
        }
    }
}

#[async_trait]
impl MessageSink for Outbound {
    async fn send(&self, message: &Message) -> bool {
        match self.try_send(message).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "send failed");
                self.reporter.failure(Notice::NoConnection, &e);
                false
            }
        }
    }

    async fn probe(&self) -> bool {
        match self.connect().await {
            Ok(mut stream) => {
                let _ = stream.shutdown().await;
                self.reporter.notice(Notice::ConnectionEstablished);
                true
            }
            Err(e) => {
                warn!(error = %e, "connection test failed");
                self.reporter.failure(Notice::ConnectFailed, &e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logrelay_core::RelayQueue;
    use tokio::sync::mpsc;

    struct Forward(mpsc::UnboundedSender<Message>);

    #[async_trait]
    impl MessageHandler for Forward {
        async fn handle(&self, message: Message) {
            let _ = self.0.send(message);
        }
    }

    fn reporter(verbose: bool) -> (Arc<RelayQueue>, Reporter) {
        let queue = Arc::new(RelayQueue::default());
        (Arc::clone(&queue), Reporter::new(queue, verbose))
    }

    fn texts(queue: &RelayQueue) -> Vec<String> {
        queue.snapshot().into_iter().map(|e| e.text).collect()
    }

    async fn start(
        timeout: Duration,
    ) -> (
        SocketAddr,
        mpsc::UnboundedReceiver<Message>,
        watch::Receiver<ConnectionState>,
        Arc<RelayQueue>,
        CancellationToken,
    ) {
        let (queue, reporter) = reporter(false);
        let listener = Listener::bind("127.0.0.1", 0, timeout, reporter).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = listener.state();
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        tokio::spawn(listener.run(Arc::new(Forward(tx)), cancel.clone()));
        (addr, rx, state, queue, cancel)
    }

    #[tokio::test]
    async fn test_package_over_socket() {
        let (addr, mut rx, _state, queue, cancel) = start(Duration::from_secs(5)).await;
        let (_, out_reporter) = reporter(false);
        let outbound = Outbound::new("127.0.0.1", addr.port(), DEFAULT_CONNECT_TIMEOUT, out_reporter);

        assert!(outbound.send(&Message::package(["a", "b"])).await);
        assert_eq!(rx.recv().await, Some(Message::package(["a", "b"])));

        assert!(outbound.send(&Message::package(Vec::<String>::new())).await);
        assert_eq!(rx.recv().await, Some(Message::LogPackage { lines: vec![] }));

        assert_eq!(texts(&queue), vec!["established server"]);
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_bind_failure() {
        let (_, reporter_a) = reporter(false);
        let first = Listener::bind("127.0.0.1", 0, Duration::from_secs(5), reporter_a)
            .await
            .unwrap();
        let port = first.local_addr().unwrap().port();

        let (queue, reporter_b) = reporter(false);
        let err = Listener::bind("127.0.0.1", port, Duration::from_secs(5), reporter_b)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ConnectionError::Bind { .. }));
        assert_eq!(
            texts(&queue),
            vec!["The host or target IP specified cannot be reached"]
        );
    }

    #[tokio::test]
    async fn test_accept_timeout_keeps_listening() {
        let (addr, mut rx, state, _queue, cancel) = start(Duration::from_millis(50)).await;
        // Let a few accept timeouts pass
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(*state.borrow(), ConnectionState::Listening);

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"tga:>\n").await.unwrap();
        stream.shutdown().await.unwrap();
        assert_eq!(rx.recv().await, Some(Message::AllLogsEmpty));
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_framing_timeout_reports_and_recovers() {
        let (addr, mut rx, _state, queue, cancel) = start(Duration::from_millis(100)).await;

        let mut stalled = TcpStream::connect(addr).await.unwrap();
        stalled.write_all(b"half a package\n").await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(texts(&queue).contains(&"connection timed out".to_string()));

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"uc:>hi\n").await.unwrap();
        stream.shutdown().await.unwrap();
        assert_eq!(rx.recv().await, Some(Message::command(false, "hi")));
        drop(stalled);
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_state_closed_after_cancel() {
        let (_addr, _rx, mut state, _queue, cancel) = start(Duration::from_secs(5)).await;
        cancel.cancel();
        state
            .wait_for(|s| *s == ConnectionState::Closed)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_send_without_peer_reports_failure() {
        // Reserve a port and release it so nothing is listening there
        let port = {
            let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };
        let (queue, reporter) = reporter(true);
        let outbound = Outbound::new("127.0.0.1", port, Duration::from_secs(1), reporter);

        assert!(!outbound.send(&Message::command(true, "get log")).await);
        let texts = texts(&queue);
        assert_eq!(
            texts[0],
            "failed to send message because no connection was found"
        );
        assert!(texts[1].starts_with("---> "));
    }

    #[tokio::test]
    async fn test_probe() {
        let (addr, _rx, _state, _queue, cancel) = start(Duration::from_secs(5)).await;
        let (queue, reporter) = reporter(false);
        let outbound = Outbound::new("127.0.0.1", addr.port(), DEFAULT_CONNECT_TIMEOUT, reporter);
        assert!(outbound.probe().await);
        assert_eq!(texts(&queue), vec!["connection established"]);
        cancel.cancel();
    }
}
