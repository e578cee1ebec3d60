//! Display entries and the fixed user-facing message templates

use std::fmt;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Timestamp format for display entries, e.g. `03:41PM`
pub const TIMESTAMP_FORMAT: &str = "%I:%M%p";

/// One timestamped line of user-facing text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayEntry {
    pub timestamp: String,
    pub text: String,
}

impl DisplayEntry {
    /// Create an entry stamped with the current local time
    pub fn now(text: impl Into<String>) -> Self {
        Self::at(Local::now(), text)
    }

    /// Create an entry stamped with the given time
    pub fn at(time: DateTime<Local>, text: impl Into<String>) -> Self {
        Self {
            timestamp: time.format(TIMESTAMP_FORMAT).to_string(),
            text: text.into(),
        }
    }
}

impl fmt::Display for DisplayEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.timestamp, self.text)
    }
}

impl From<Notice> for DisplayEntry {
    fn from(notice: Notice) -> Self {
        DisplayEntry::now(notice.text())
    }
}

/// Fixed status messages shown to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    ServerEstablished,
    BindFailed,
    ConnectFailed,
    ConnectionEstablished,
    NoConnection,
    TimedOut,
    LogEmpty(String),
    AllLogsEmpty,
    Unknown,
}

impl Notice {
    pub fn text(&self) -> String {
        match self {
            Notice::ServerEstablished => "established server".to_string(),
            Notice::BindFailed => {
                "The host or target IP specified cannot be reached".to_string()
            }
            Notice::ConnectFailed => "failed to connect to the server".to_string(),
            Notice::ConnectionEstablished => "connection established".to_string(),
            Notice::NoConnection => {
                "failed to send message because no connection was found".to_string()
            }
            Notice::TimedOut => "connection timed out".to_string(),
            Notice::LogEmpty(name) => format!("Log file {name} is empty"),
            Notice::AllLogsEmpty => "No new updates from unity".to_string(),
            Notice::Unknown => "unknown error, please restart terminal".to_string(),
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text())
    }
}
