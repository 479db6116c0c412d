use bridge_common::constants::{BRIDGES_DIR, BRIDGE_LOGS_DIR};
use bridge_registry::{HomeProvider, OsHomeProvider};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// The long-running process backing one MCP session (spec §4.7). Spawned by
/// the Bridge Manager (spec §4.8) with the session it should serve and the
/// bridge home directory its registry lives under.
#[derive(Parser, Debug)]
#[command(name = "mcp-bridge-daemon")]
#[command(version, about)]
struct Args {
    /// The session name this daemon serves; must already exist in the
    /// registry at `--home` (the Bridge Manager creates it before spawning).
    #[arg(long)]
    name: String,

    /// Bridge home directory holding `sessions.json`/`auth-profiles.json`.
    /// Defaults to the OS config directory's `mcp-bridge` subdirectory.
    #[arg(long)]
    home: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let home = args.home.unwrap_or_else(|| OsHomeProvider.home_dir());

    let _log_guard = init_logging(&home, &args.name);

    tracing::info!(session = %args.name, home = %home.display(), "mcp-bridge-daemon starting");

    match bridge_daemon::run(args.name, home).await {
        Ok(()) => Ok(()),
        Err(err) => {
            let bridge_error: bridge_common::BridgeError = err.into();
            tracing::error!(error = %bridge_error, "bridge daemon exited with error");
            std::process::exit(bridge_error.exit_code());
        }
    }
}

/// Per-session rolling file writer, landing logs at
/// `<home>/bridges/logs/<name>.log` (spec §10.1) — this is the file the
/// Bridge Manager redirects a freshly spawned bridge's stdout/stderr into.
/// Returns the `WorkerGuard`: dropping it flushes the non-blocking writer,
/// so the caller must hold it for the lifetime of `main`.
fn init_logging(home: &std::path::Path, name: &str) -> tracing_appender::non_blocking::WorkerGuard {
    let log_dir = home.join(BRIDGES_DIR).join(BRIDGE_LOGS_DIR);
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::never(&log_dir, format!("{name}.log"));
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();

    guard
}
