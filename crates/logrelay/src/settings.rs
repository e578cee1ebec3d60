//! Validated runtime settings built from the command line

use std::path::PathBuf;
use std::time::Duration;

use logrelay_core::OverflowPolicy;

use crate::cli::{AppArgs, CommonArgs, Overflow, TerminalArgs};

/// Port the Terminal listens on
pub const TERMINAL_PORT: u16 = 5554;
/// Port the Application listens on
pub const APP_PORT: u16 = 5555;

/// Log names watched when none are given
pub const DEFAULT_LOGS: [&str; 3] = ["Editor.log", "Editor-prev.log", "upm.log"];

/// Read-only view of the connection settings shared with the UI
pub trait SettingsStore: Send + Sync {
    fn host(&self) -> &str;
    fn target(&self) -> &str;
    fn timeout(&self) -> Duration;
    fn verbose(&self) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettingsError {
    #[error("listen port and peer port are both {0}")]
    SamePort(u16),

    #[error("timeout must be greater than zero")]
    ZeroTimeout,

    #[error("connect timeout must be greater than zero")]
    ZeroConnectTimeout,

    #[error("queue capacity must be greater than zero")]
    ZeroCapacity,

    #[error("no log directory given and no default data directory is available")]
    NoLogDir,

    #[error("no watch directory given and no default editor log directory is available")]
    NoWatchDir,
}

/// Which endpoint this process runs as
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Terminal,
    Application,
}

impl Role {
    pub fn name(&self) -> &'static str {
        match self {
            Role::Terminal => "terminal",
            Role::Application => "app",
        }
    }

    fn default_ports(&self) -> (u16, u16) {
        match self {
            Role::Terminal => (TERMINAL_PORT, APP_PORT),
            Role::Application => (APP_PORT, TERMINAL_PORT),
        }
    }
}

/// Settings for watching editor logs (Terminal role only)
#[derive(Debug, Clone)]
pub struct WatchSettings {
    pub dir: PathBuf,
    pub logs: Vec<String>,
    pub quantum: Duration,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub role: Role,
    pub host: String,
    pub target: String,
    pub listen_port: u16,
    pub peer_port: u16,
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub verbose: bool,
    pub log_dir: PathBuf,
    pub queue_capacity: usize,
    pub overflow: OverflowPolicy,
    pub line_cap: usize,
}

impl Settings {
    pub fn for_terminal(args: &TerminalArgs) -> Result<(Self, WatchSettings), SettingsError> {
        let settings = Self::from_common(Role::Terminal, &args.common)?;
        let dir = match &args.watch_dir {
            Some(dir) => dir.clone(),
            None => default_watch_dir().ok_or(SettingsError::NoWatchDir)?,
        };
        let logs = if args.logs.is_empty() {
            DEFAULT_LOGS.iter().map(|s| s.to_string()).collect()
        } else {
            args.logs.clone()
        };
        let watch = WatchSettings {
            dir,
            logs,
            quantum: Duration::from_millis(args.quantum_ms.max(1)),
        };
        Ok((settings, watch))
    }

    pub fn for_app(args: &AppArgs) -> Result<Self, SettingsError> {
        Self::from_common(Role::Application, &args.common)
    }

    fn from_common(role: Role, common: &CommonArgs) -> Result<Self, SettingsError> {
        let (default_listen, default_peer) = role.default_ports();
        let listen_port = common.listen_port.unwrap_or(default_listen);
        let peer_port = common.peer_port.unwrap_or(default_peer);

        // Both endpoints usually share a host, so equal ports would loop back
        if listen_port == peer_port {
            return Err(SettingsError::SamePort(listen_port));
        }
        if common.timeout == 0 {
            return Err(SettingsError::ZeroTimeout);
        }
        if common.connect_timeout == 0 {
            return Err(SettingsError::ZeroConnectTimeout);
        }
        if common.queue_capacity == 0 {
            return Err(SettingsError::ZeroCapacity);
        }

        let log_dir = match &common.log_dir {
            Some(dir) => dir.clone(),
            None => default_log_dir().ok_or(SettingsError::NoLogDir)?,
        };
        let overflow = match common.overflow {
            Overflow::DropOldest => OverflowPolicy::DropOldest,
            Overflow::Block => OverflowPolicy::Block {
                timeout: Duration::from_millis(common.block_timeout_ms),
            },
        };

        Ok(Self {
            role,
            host: common.host.clone(),
            target: common.target.clone(),
            listen_port,
            peer_port,
            timeout: Duration::from_secs(common.timeout),
            connect_timeout: Duration::from_secs(common.connect_timeout),
            verbose: common.verbose,
            log_dir,
            queue_capacity: common.queue_capacity,
            overflow,
            line_cap: common.line_cap,
        })
    }
}

impl SettingsStore for Settings {
    fn host(&self) -> &str {
        &self.host
    }

    fn target(&self) -> &str {
        &self.target
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn verbose(&self) -> bool {
        self.verbose
    }
}

/// Where dated log files live when `--log-dir` is not given
fn default_log_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("logrelay").join("logs"))
}

/// Where the Unity editor writes its logs on this platform
fn default_watch_dir() -> Option<PathBuf> {
    if cfg!(target_os = "macos") {
        dirs::home_dir().map(|h| h.join("Library").join("Logs").join("Unity"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir().map(|d| d.join("Unity").join("Editor"))
    } else {
        dirs::config_dir().map(|d| d.join("unity3d"))
    }
}
