//! logrelay-core: Shared types for the logrelay endpoints
//!
//! This crate provides the wire protocol, the stream reader, the command
//! grammar, display entries and the relay queue used by both the Terminal and
//! Application sides of logrelay.

pub mod codec;
pub mod command;
pub mod entry;
pub mod protocol;
pub mod queue;

pub use codec::MessageReader;
pub use command::{LogDay, ParsedCommand, parse};
pub use entry::{DisplayEntry, Notice};
pub use protocol::{CommandTag, Message, ProtocolError, SENTINEL};
pub use queue::{OverflowPolicy, QueueError, RelayQueue};
