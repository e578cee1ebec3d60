mod app;
mod cli;
mod commands;
mod connection;
mod console;
mod dispatch;
mod logs;
mod report;
mod settings;
mod stability;
mod terminal;


use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::RoleCommand;
use crate::settings::{Settings, SettingsStore};

#[tokio::main]
async fn main() {
    // Initialize tracing with RUST_LOG support
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Parse CLI arguments
    let cli = cli::Cli::parse();

    // Shut down on Ctrl-C
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("interrupt received, shutting down"),
            Err(e) => warn!(error = %e, "failed to listen for interrupt"),
        }
        signal_cancel.cancel();
    });

    let result = match cli.role {
        RoleCommand::Terminal(args) => {
            let (settings, watch) = settings_or_exit(Settings::for_terminal(&args));
            log_start(&settings);
            info!(dir = %watch.dir.display(), logs = ?watch.logs, "watching editor logs");
            terminal::run(settings, watch, cancel).await
        }
        RoleCommand::App(args) => {
            let settings = settings_or_exit(Settings::for_app(&args));
            log_start(&settings);
            app::run(settings, args.json, cancel).await
        }
    };

    if let Err(e) = result {
        eprintln!("logrelay: error: {}", e);
        std::process::exit(1);
    }

    info!("logrelay shut down");
    // The stdin reader thread cannot be cancelled, so do not wait for it
    std::process::exit(0);
}

fn settings_or_exit<T>(result: Result<T, settings::SettingsError>) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            eprintln!("logrelay: error: {}", e);
            std::process::exit(1);
        }
    }
}

fn log_start(settings: &Settings) {
    info!(
        role = settings.role.name(),
        host = %settings.host(),
        listen_port = settings.listen_port,
        target = %settings.target(),
        peer_port = settings.peer_port,
        timeout_secs = settings.timeout().as_secs(),
        verbose = settings.verbose(),
        log_dir = %settings.log_dir.display(),
        "logrelay starting"
    );
}
