//! Stream reader that turns a byte stream into protocol messages

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::Instant;

use crate::protocol::{Message, ProtocolError};

const READ_CHUNK: usize = 4096;

/// Reads successive messages from an async byte stream
///
/// Bytes left over after one message stay buffered for the next call, so a
/// peer may pipeline several messages on one connection. Package lines already
/// searched for the sentinel are not searched again as more bytes arrive.
pub struct MessageReader<R> {
    reader: R,
    buf: Vec<u8>,
    // Line start in `buf` up to which no sentinel exists
    scanned: usize,
}

impl<R: AsyncRead + Unpin> MessageReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
            scanned: 0,
        }
    }

    /// Read until one complete message is available
    ///
    /// Returns `Ok(None)` when the peer closes the stream cleanly between
    /// messages. If the message is not complete within `timeout`, the partial
    /// bytes are discarded and `ProtocolError::FramingTimeout` is returned.
    pub async fn next_message(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<Message>, ProtocolError> {
        let deadline = Instant::now() + timeout;
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            match Message::decode_resume(&self.buf, &mut self.scanned) {
                Ok((message, consumed)) => {
                    self.buf.drain(..consumed);
                    return Ok(Some(message));
                }
                Err(ProtocolError::Incomplete { .. }) => {}
                Err(e) => {
                    self.discard();
                    return Err(e);
                }
            }

            let read = tokio::time::timeout_at(deadline, self.reader.read(&mut chunk)).await;
            match read {
                Err(_) => {
                    self.discard();
                    return Err(ProtocolError::FramingTimeout {
                        secs: timeout.as_secs(),
                    });
                }
                Ok(Err(e)) => {
                    self.discard();
                    return Err(ProtocolError::Io(e.to_string()));
                }
                Ok(Ok(0)) => {
                    self.scanned = 0;
                    let rest = std::mem::take(&mut self.buf);
                    return Message::decode_final(&rest);
                }
                Ok(Ok(n)) => self.buf.extend_from_slice(&chunk[..n]),
            }
        }
    }

    fn discard(&mut self) {
        self.buf.clear();
        self.scanned = 0;
    }

    /// Number of bytes buffered but not yet decoded
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}
