//! Line-oriented wire protocol for logrelay
//!
//! This module implements the wire format exchanged between the Terminal and
//! Application endpoints. Two shapes of message share one stream:
//! - Tagged control lines: a tag (`kc:>`, `uc:>`, `tg:>`, `tga:>`) immediately
//!   followed by the payload and terminated by `\n`
//! - Log packages: zero or more `\n`-terminated lines followed by the literal
//!   sentinel `--EOF` with no trailing separator

/// Sentinel marking the end of a log package
pub const SENTINEL: &str = "--EOF";

/// Tag prefix for a command that matched the command grammar
pub const TAG_KNOWN_COMMAND: &str = "kc:>";

/// Tag prefix for a command that did not match the command grammar
pub const TAG_UNKNOWN_COMMAND: &str = "uc:>";

/// Tag prefix for "this watched log is empty"
pub const TAG_LOG_EMPTY: &str = "tg:>";

/// Tag for "every watched log is empty"
pub const TAG_ALL_LOGS_EMPTY: &str = "tga:>";

/// Classification of a forwarded command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandTag {
    /// The command matched the grammar (`kc:>`)
    Known,
    /// The command did not match the grammar (`uc:>`)
    Unknown,
}

impl CommandTag {
    /// Wire prefix for this tag
    pub fn prefix(&self) -> &'static str {
        match self {
            CommandTag::Known => TAG_KNOWN_COMMAND,
            CommandTag::Unknown => TAG_UNKNOWN_COMMAND,
        }
    }
}

/// Errors that can occur while decoding messages
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// Not enough bytes buffered to decode a complete message
    #[error("incomplete message: {have} bytes buffered")]
    Incomplete { have: usize },

    /// The peer closed the stream in the middle of a log package
    #[error("stream closed before the --EOF sentinel ({have} bytes dropped)")]
    Truncated { have: usize },

    /// The message terminator was not received within the connection timeout
    #[error("no complete message received within {secs}s")]
    FramingTimeout { secs: u64 },

    /// The payload is not valid UTF-8
    #[error("message is not valid UTF-8")]
    InvalidUtf8,

    /// Reading from the underlying stream failed
    #[error("read failed: {0}")]
    Io(String),
}

/// A logical unit sent over the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// A user command forwarded to the peer
    Command { tag: CommandTag, body: String },
    /// A watched log had no content when a relay was requested
    LogEmpty { log_name: String },
    /// None of the watched logs had content when a relay was requested
    AllLogsEmpty,
    /// A batch of log lines
    LogPackage { lines: Vec<String> },
}

impl Message {
    /// Create a command message, tagged by whether it matched the grammar
    pub fn command(known: bool, body: impl Into<String>) -> Self {
        let tag = if known {
            CommandTag::Known
        } else {
            CommandTag::Unknown
        };
        Message::Command {
            tag,
            body: body.into(),
        }
    }

    /// Create a log package from any sequence of lines
    pub fn package<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Message::LogPackage {
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }

    /// Encode this message into wire bytes
    ///
    /// Tabs are stripped from all text for compatibility with older peers.
    /// Command bodies and package lines are flattened onto one line each, so a
    /// package of N lines always decodes to N lines. Package lines that begin
    /// with the sentinel are dropped so the sentinel never appears as data.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Message::Command { tag, body } => {
                encode_control(tag.prefix(), &body.replace(['\r', '\n'], " "))
            }
            Message::LogEmpty { log_name } => {
                encode_control(TAG_LOG_EMPTY, &log_name.replace(['\r', '\n'], ""))
            }
            Message::AllLogsEmpty => encode_control(TAG_ALL_LOGS_EMPTY, ""),
            Message::LogPackage { lines } => encode_lines(lines),
        }
    }

    /// Decode one message from the front of a buffer
    ///
    /// Returns the message and the number of bytes consumed. Returns
    /// `ProtocolError::Incomplete` when the buffer does not yet hold a
    /// complete message; the caller should read more bytes and retry.
    pub fn decode(bytes: &[u8]) -> Result<(Message, usize), ProtocolError> {
        Message::decode_resume(bytes, &mut 0)
    }

    /// Decode like [`Message::decode`], resuming the sentinel search at `*scanned`
    ///
    /// `*scanned` is a line start before which the buffer holds no sentinel.
    /// On `Incomplete` it is advanced to the first line not yet ruled out, so
    /// repeated calls over a growing buffer look at each package line once. It
    /// is reset to 0 when a message is returned.
    pub fn decode_resume(
        bytes: &[u8],
        scanned: &mut usize,
    ) -> Result<(Message, usize), ProtocolError> {
        if *scanned == 0 {
            if bytes.is_empty() || is_partial_prefix(bytes) {
                return Err(ProtocolError::Incomplete { have: bytes.len() });
            }

            if let Some(tag_len) = control_tag_len(bytes) {
                let end = bytes
                    .iter()
                    .position(|b| *b == b'\n')
                    .ok_or(ProtocolError::Incomplete { have: bytes.len() })?;
                let message = parse_control(&bytes[..tag_len], &bytes[tag_len..end])?;
                return Ok((message, end + 1));
            }
        }

        let start = match scan_sentinel(bytes, *scanned) {
            Ok(start) => start,
            Err(resume) => {
                *scanned = resume;
                return Err(ProtocolError::Incomplete { have: bytes.len() });
            }
        };
        *scanned = 0;
        let lines = split_package(&bytes[..start])?;
        Ok((Message::LogPackage { lines }, start + SENTINEL.len()))
    }

    /// Decode the remaining bytes of a stream that the peer has closed
    ///
    /// Legacy peers send a single tagged message without a trailing newline
    /// and close the connection; those bytes are accepted as one message.
    /// Anything else left over is a truncated log package.
    pub fn decode_final(bytes: &[u8]) -> Result<Option<Message>, ProtocolError> {
        if bytes.is_empty() {
            return Ok(None);
        }
        match Message::decode(bytes) {
            Ok((message, _)) => Ok(Some(message)),
            Err(ProtocolError::Incomplete { .. }) => match control_tag_len(bytes) {
                Some(tag_len) => {
                    let payload = strip_line_end(&bytes[tag_len..]);
                    parse_control(&bytes[..tag_len], payload).map(Some)
                }
                None => Err(ProtocolError::Truncated { have: bytes.len() }),
            },
            Err(e) => Err(e),
        }
    }
}

/// Encode a sequence of lines as a sentinel-terminated log package
pub fn encode_lines<S: AsRef<str>>(lines: &[S]) -> Vec<u8> {
    let mut bytes = Vec::new();
    for line in lines {
        let line = line.as_ref().replace('\t', "").replace(['\r', '\n'], " ");
        if line.starts_with(SENTINEL) {
            continue;
        }
        bytes.extend_from_slice(line.as_bytes());
        bytes.push(b'\n');
    }
    bytes.extend_from_slice(SENTINEL.as_bytes());
    bytes
}

fn encode_control(prefix: &str, payload: &str) -> Vec<u8> {
    let payload = payload.replace('\t', "");
    let mut bytes = Vec::with_capacity(prefix.len() + payload.len() + 1);
    bytes.extend_from_slice(prefix.as_bytes());
    bytes.extend_from_slice(payload.as_bytes());
    bytes.push(b'\n');
    bytes
}

/// Length of the control tag at the start of `bytes`, if any
fn control_tag_len(bytes: &[u8]) -> Option<usize> {
    [
        TAG_ALL_LOGS_EMPTY,
        TAG_KNOWN_COMMAND,
        TAG_UNKNOWN_COMMAND,
        TAG_LOG_EMPTY,
    ]
    .iter()
    .find(|tag| bytes.starts_with(tag.as_bytes()))
    .map(|tag| tag.len())
}

/// True when the buffer is too short to tell a tag or sentinel from data
fn is_partial_prefix(bytes: &[u8]) -> bool {
    [
        TAG_ALL_LOGS_EMPTY,
        TAG_KNOWN_COMMAND,
        TAG_UNKNOWN_COMMAND,
        TAG_LOG_EMPTY,
        SENTINEL,
    ]
    .iter()
    .any(|token| bytes.len() < token.len() && token.as_bytes().starts_with(bytes))
}

/// Offset of the first sentinel that starts a line at or after `from`
///
/// `from` must be a line start. When no sentinel is found, the error holds
/// the start of the last line, which may still grow into one.
fn scan_sentinel(bytes: &[u8], from: usize) -> Result<usize, usize> {
    let sentinel = SENTINEL.as_bytes();
    let mut start = from;
    while start + sentinel.len() <= bytes.len() {
        if bytes[start..].starts_with(sentinel) {
            return Ok(start);
        }
        // Jump to the beginning of the next line
        match bytes[start..].iter().position(|b| *b == b'\n') {
            Some(offset) => start += offset + 1,
            None => return Err(start),
        }
    }
    Err(start)
}

fn split_package(body: &[u8]) -> Result<Vec<String>, ProtocolError> {
    let text = std::str::from_utf8(body).map_err(|_| ProtocolError::InvalidUtf8)?;
    let mut lines: Vec<String> = text.split('\n').map(str::to_string).collect();
    // Every line is newline-terminated, so the final segment is always empty
    lines.pop();
    Ok(lines)
}

fn parse_control(tag: &[u8], payload: &[u8]) -> Result<Message, ProtocolError> {
    let payload = std::str::from_utf8(payload)
        .map_err(|_| ProtocolError::InvalidUtf8)?
        .trim_end_matches('\r')
        .to_string();
    let message = match tag {
        t if t == TAG_KNOWN_COMMAND.as_bytes() => Message::Command {
            tag: CommandTag::Known,
            body: payload,
        },
        t if t == TAG_UNKNOWN_COMMAND.as_bytes() => Message::Command {
            tag: CommandTag::Unknown,
            body: payload,
        },
        t if t == TAG_LOG_EMPTY.as_bytes() => Message::LogEmpty { log_name: payload },
        _ => Message::AllLogsEmpty,
    };
    Ok(message)
}

fn strip_line_end(bytes: &[u8]) -> &[u8] {
    match bytes.iter().position(|b| *b == b'\n') {
        Some(end) => &bytes[..end],
        None => bytes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_golden_package_two_lines() {
        let encoded = Message::package(["a", "b"]).encode();
        assert_eq!(encoded, b"a\nb\n--EOF".to_vec());
    }

    #[test]
    fn test_golden_empty_package_is_sentinel_only() {
        let encoded = Message::package(Vec::<String>::new()).encode();
        assert_eq!(encoded, b"--EOF".to_vec());
    }

    #[test]
    fn test_golden_control_messages() {
        assert_eq!(Message::command(true, "get log").encode(), b"kc:>get log\n");
        assert_eq!(Message::command(false, "hello").encode(), b"uc:>hello\n");
        assert_eq!(
            Message::LogEmpty {
                log_name: "upm.log".to_string()
            }
            .encode(),
            b"tg:>upm.log\n"
        );
        assert_eq!(Message::AllLogsEmpty.encode(), b"tga:>\n");
    }

    #[test]
    fn test_package_round_trip() {
        let original = Message::package(["first line", "", "  indented", "last"]);
        let encoded = original.encode();
        let (decoded, consumed) = Message::decode(&encoded).unwrap();
        assert_eq!(decoded, original);
        assert_eq!(consumed, encoded.len());
    }

    #[test]
    fn test_empty_package_round_trip() {
        let encoded = Message::package(Vec::<String>::new()).encode();
        let (decoded, consumed) = Message::decode(&encoded).unwrap();
        assert_eq!(decoded, Message::LogPackage { lines: vec![] });
        assert_eq!(consumed, SENTINEL.len());
    }

    #[test]
    fn test_tabs_stripped_before_send() {
        let encoded = Message::package(["col\tumn"]).encode();
        assert_eq!(encoded, b"column\n--EOF".to_vec());

        let encoded = Message::command(true, "get\tlog").encode();
        assert_eq!(encoded, b"kc:>getlog\n".to_vec());
    }

    #[test]
    fn test_sentinel_lines_never_sent_as_data() {
        let encoded = Message::package(["a", "--EOF", "--EOF trailing", "b"]).encode();
        let (decoded, _) = Message::decode(&encoded).unwrap();
        assert_eq!(decoded, Message::package(["a", "b"]));
    }

    #[test]
    fn test_sentinel_inside_line_is_data() {
        let encoded = Message::package(["value --EOF here"]).encode();
        let (decoded, _) = Message::decode(&encoded).unwrap();
        assert_eq!(decoded, Message::package(["value --EOF here"]));
    }

    #[test]
    fn test_command_body_flattened_to_one_line() {
        let encoded = Message::command(false, "two\nlines").encode();
        let (decoded, _) = Message::decode(&encoded).unwrap();
        assert_eq!(decoded, Message::command(false, "two lines"));
    }

    #[test]
    fn test_package_line_breaks_flattened() {
        let original = Message::package(["one\ntwo", "three\r\n", "four"]);
        let (decoded, _) = Message::decode(&original.encode()).unwrap();
        assert_eq!(decoded, Message::package(["one two", "three  ", "four"]));
    }

    #[test]
    fn test_decode_resume_tracks_checked_lines() {
        let encoded = Message::package(["alpha", "beta", "gamma"]).encode();
        let mut scanned = 0;

        // "alpha\nbe": only the first line is ruled out
        assert!(matches!(
            Message::decode_resume(&encoded[..8], &mut scanned),
            Err(ProtocolError::Incomplete { .. })
        ));
        assert_eq!(scanned, 6);

        // Through "gamma\n--E": the partial sentinel line stays open
        let upto = encoded.len() - 2;
        assert!(matches!(
            Message::decode_resume(&encoded[..upto], &mut scanned),
            Err(ProtocolError::Incomplete { .. })
        ));
        assert_eq!(scanned, 17);

        let (decoded, consumed) = Message::decode_resume(&encoded, &mut scanned).unwrap();
        assert_eq!(decoded, Message::package(["alpha", "beta", "gamma"]));
        assert_eq!(consumed, encoded.len());
        assert_eq!(scanned, 0);
    }

    #[test]
    fn test_decode_control_variants() {
        let (msg, _) = Message::decode(b"kc:>clear logs\n").unwrap();
        assert_eq!(
            msg,
            Message::Command {
                tag: CommandTag::Known,
                body: "clear logs".to_string()
            }
        );

        let (msg, _) = Message::decode(b"tg:>Editor.log\n").unwrap();
        assert_eq!(
            msg,
            Message::LogEmpty {
                log_name: "Editor.log".to_string()
            }
        );

        let (msg, consumed) = Message::decode(b"tga:>\n").unwrap();
        assert_eq!(msg, Message::AllLogsEmpty);
        assert_eq!(consumed, 6);
    }

    #[test]
    fn test_decode_incomplete() {
        assert_eq!(
            Message::decode(b""),
            Err(ProtocolError::Incomplete { have: 0 })
        );
        assert_eq!(
            Message::decode(b"kc:>get lo"),
            Err(ProtocolError::Incomplete { have: 10 })
        );
        assert_eq!(
            Message::decode(b"a\nb\n"),
            Err(ProtocolError::Incomplete { have: 4 })
        );
        // Could still become a sentinel or a tag
        assert_eq!(
            Message::decode(b"--E"),
            Err(ProtocolError::Incomplete { have: 3 })
        );
        assert_eq!(
            Message::decode(b"tg"),
            Err(ProtocolError::Incomplete { have: 2 })
        );
    }

    #[test]
    fn test_decode_consecutive_messages() {
        let mut stream = Message::package(["x"]).encode();
        stream.extend(Message::AllLogsEmpty.encode());
        stream.extend(Message::package(["y", "z"]).encode());

        let (first, used) = Message::decode(&stream).unwrap();
        assert_eq!(first, Message::package(["x"]));
        let rest = &stream[used..];

        let (second, used) = Message::decode(rest).unwrap();
        assert_eq!(second, Message::AllLogsEmpty);
        let rest = &rest[used..];

        let (third, used) = Message::decode(rest).unwrap();
        assert_eq!(third, Message::package(["y", "z"]));
        assert_eq!(used, rest.len());
    }

    #[test]
    fn test_decode_final_accepts_unterminated_command() {
        let msg = Message::decode_final(b"uc:>hello there").unwrap();
        assert_eq!(msg, Some(Message::command(false, "hello there")));
    }

    #[test]
    fn test_decode_final_rejects_truncated_package() {
        assert_eq!(
            Message::decode_final(b"line one\nline"),
            Err(ProtocolError::Truncated { have: 13 })
        );
        assert_eq!(Message::decode_final(b""), Ok(None));
    }

    #[test]
    fn test_decode_invalid_utf8() {
        let bytes = [0xff, 0xfe, b'\n', b'-', b'-', b'E', b'O', b'F'];
        assert_eq!(Message::decode(&bytes), Err(ProtocolError::InvalidUtf8));
    }

    #[test]
    fn test_command_tag_prefix() {
        assert_eq!(CommandTag::Known.prefix(), "kc:>");
        assert_eq!(CommandTag::Unknown.prefix(), "uc:>");
    }
}
