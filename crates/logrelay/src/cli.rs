use clap::{Args, Parser, Subcommand, ValueEnum};
use logrelay_core::queue::DEFAULT_CAPACITY;
use std::path::PathBuf;

use crate::commands::DEFAULT_LINE_CAP;
use crate::connection::DEFAULT_CONNECT_TIMEOUT;
use crate::stability::DEFAULT_QUANTUM;

/// logrelay: relay editor logs and commands between a terminal and an app
#[derive(Parser, Debug)]
#[command(name = "logrelay")]
#[command(about = "Relay debug logs and commands between two endpoints", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub role: RoleCommand,
}

#[derive(Subcommand, Debug)]
pub enum RoleCommand {
    /// Run next to the editor: watch its logs and ship them to the app
    Terminal(TerminalArgs),
    /// Run the consumer side: receive logs, persist them and accept commands
    App(AppArgs),
}

/// What to do when the display queue is full
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overflow {
    /// Evict the oldest entry
    DropOldest,
    /// Wait for room, then drop the new entry
    Block,
}

/// Flags shared by both roles
#[derive(Args, Debug)]
pub struct CommonArgs {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Address of the peer endpoint
    #[arg(long, default_value = "127.0.0.1")]
    pub target: String,

    /// Port to listen on (defaults: terminal 5554, app 5555)
    #[arg(long)]
    pub listen_port: Option<u16>,

    /// Port the peer listens on (defaults: terminal 5555, app 5554)
    #[arg(long)]
    pub peer_port: Option<u16>,

    /// Idle and framing timeout in seconds
    #[arg(long, default_value_t = 3600)]
    pub timeout: u64,

    /// Outbound connect timeout in seconds
    #[arg(long, default_value_t = DEFAULT_CONNECT_TIMEOUT.as_secs())]
    pub connect_timeout: u64,

    /// Show system error text alongside user-facing errors
    #[arg(long, default_value_t = false)]
    pub verbose: bool,

    /// Directory for dated log files
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Maximum number of queued display entries
    #[arg(long, default_value_t = DEFAULT_CAPACITY)]
    pub queue_capacity: usize,

    /// Queue overflow policy
    #[arg(long, value_enum, default_value_t = Overflow::DropOldest)]
    pub overflow: Overflow,

    /// How long a producer waits for room under the block policy, in milliseconds
    #[arg(long, default_value_t = 1000)]
    pub block_timeout_ms: u64,

    /// Maximum number of lines shown by `get log --<day>`
    #[arg(long, default_value_t = DEFAULT_LINE_CAP)]
    pub line_cap: usize,
}

#[derive(Args, Debug)]
pub struct TerminalArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Directory holding the editor logs (defaults to the platform editor log dir)
    #[arg(long)]
    pub watch_dir: Option<PathBuf>,

    /// Log file name to watch; repeat for several (defaults: Editor.log, Editor-prev.log, upm.log)
    #[arg(long = "log")]
    pub logs: Vec<String>,

    /// Size polling interval for change detection, in milliseconds
    #[arg(long, default_value_t = DEFAULT_QUANTUM.as_millis() as u64)]
    pub quantum_ms: u64,
}

#[derive(Args, Debug)]
pub struct AppArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Print display entries as JSON lines instead of text
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

impl Cli {
    /// Parse CLI arguments from the environment
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }
}
