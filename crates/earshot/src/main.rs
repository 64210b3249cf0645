//! Earshot - an accessible terminal you can read by ear.
//!
//! Main entry point: runs the user's shell inside a PTY on the current
//! terminal and adds a reading mode for navigating everything it printed.

use std::fs::OpenOptions;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use once_cell::sync::Lazy;
use session::{
    Announcer, CommandAnnouncer, LogAnnouncer, PseudoTerminal, Session, SessionEvent,
    SessionOptions, SilentTones, Speaker,
};
use settings::Config;
use terminal::TerminalDimensions;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Application startup time for performance monitoring
static STARTUP_TIME: Lazy<Instant> = Lazy::new(Instant::now);

/// Events buffered between the reader threads and the session loop.
const EVENT_QUEUE_DEPTH: usize = 256;

/// How long the final announcement may keep speaking after the session ends.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[derive(Parser, Debug)]
#[command(name = "earshot")]
#[command(about = "An accessible terminal with a navigable reading mode", long_about = None)]
#[command(version)]
struct Args {
    /// Shell to run, tried before $SHELL and the built-in fallbacks
    #[arg(long, value_name = "PATH")]
    shell: Option<String>,

    /// Working directory for the shell
    #[arg(long, value_name = "DIR")]
    cwd: Option<PathBuf>,

    /// Run without a shell; typed lines are added to the history
    #[arg(long)]
    manual: bool,

    /// Path to configuration file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Check if debug mode is enabled via environment variable.
fn is_debug_mode() -> bool {
    std::env::var("EARSHOT_DEBUG").is_ok()
}

fn default_filter(debug: bool) -> &'static str {
    if debug {
        "earshot=trace,session=trace,terminal=trace,reading_view=trace,settings=trace,info"
    } else {
        "earshot=info,session=info,terminal=info,reading_view=info,settings=info,warn"
    }
}

fn build_filter() -> tracing_subscriber::EnvFilter {
    use tracing_subscriber::EnvFilter;

    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(is_debug_mode())))
}

fn log_path() -> Result<PathBuf> {
    let dir = dirs::data_dir()
        .context("Could not determine data directory")?
        .join("earshot")
        .join("logs");
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create log directory: {:?}", dir))?;
    Ok(dir.join("earshot.log"))
}

/// Initialize the logging system.
///
/// Logs go to a file: stdout is the live terminal the shell is drawing on.
fn init_logging() -> Result<PathBuf> {
    use tracing_subscriber::{fmt, prelude::*};

    let path = log_path()?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open log file: {:?}", path))?;

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::sync::Mutex::new(file))
                .with_ansi(false)
                .with_target(true)
                .with_line_number(true),
        )
        .with(build_filter())
        .init();

    if is_debug_mode() {
        info!(
            "Earshot v{} starting up (DEBUG MODE ENABLED)",
            env!("CARGO_PKG_VERSION")
        );
    } else {
        info!("Earshot v{} starting up", env!("CARGO_PKG_VERSION"));
    }
    Ok(path)
}

/// Load the config file and apply command-line overrides.
fn resolve_config(args: &Args) -> Config {
    let mut config = match &args.config {
        Some(path) => settings::load_config_from(path),
        None => {
            settings::ensure_config_file();
            settings::load_config()
        }
    };
    if let Some(shell) = &args.shell {
        config.shell = Some(shell.clone());
    }
    if let Some(cwd) = &args.cwd {
        config.working_directory = Some(cwd.display().to_string());
    }
    config
}

fn build_speaker(config: &Config) -> Speaker {
    let announcer: Arc<dyn Announcer> = match config
        .speech_command
        .as_deref()
        .and_then(CommandAnnouncer::new)
    {
        Some(command) => {
            info!(command = ?config.speech_command, "Speaking through external command");
            Arc::new(command)
        }
        None => {
            info!("No speech command configured, announcements go to the log");
            Arc::new(LogAnnouncer)
        }
    };
    Speaker::new(announcer, Arc::new(SilentTones), config.announce_delay())
        .with_tones_enabled(config.tones)
}

/// Size of the host terminal, or the default when it cannot be queried.
fn host_dimensions() -> TerminalDimensions {
    match crossterm::terminal::size() {
        Ok((columns, rows)) => TerminalDimensions::new(columns, rows).or_default_if_empty(),
        Err(e) => {
            debug!("Could not query terminal size: {}", e);
            TerminalDimensions::default()
        }
    }
}

/// Raw mode on the host terminal, restored on drop.
struct RawMode;

impl RawMode {
    fn enable() -> Result<Self> {
        crossterm::terminal::enable_raw_mode().context("Failed to enable raw mode")?;
        debug!("Enabled raw mode");
        Ok(Self)
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        if let Err(e) = crossterm::terminal::disable_raw_mode() {
            warn!("Failed to disable raw mode: {}", e);
        }
    }
}

/// Forward raw stdin bytes to the session from a dedicated thread.
fn spawn_stdin_reader(events: mpsc::Sender<SessionEvent>) -> Result<()> {
    thread::Builder::new()
        .name("stdin-reader".into())
        .spawn(move || {
            let mut stdin = std::io::stdin().lock();
            let mut buf = [0u8; 1024];
            loop {
                match stdin.read(&mut buf) {
                    Ok(0) => {
                        debug!("stdin closed");
                        break;
                    }
                    Ok(n) => {
                        let event = SessionEvent::KeyPressed(buf[..n].to_vec());
                        if events.blocking_send(event).is_err() {
                            break;
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        warn!("stdin read failed: {}", e);
                        break;
                    }
                }
            }
        })
        .context("Failed to spawn stdin reader")?;
    Ok(())
}

/// Turn SIGWINCH into resize events.
#[cfg(unix)]
fn watch_resize(events: mpsc::Sender<SessionEvent>) -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut winch =
        signal(SignalKind::window_change()).context("Failed to listen for SIGWINCH")?;
    tokio::spawn(async move {
        while winch.recv().await.is_some() {
            let event = SessionEvent::Resized(host_dimensions());
            if events.send(event).await.is_err() {
                break;
            }
        }
    });
    Ok(())
}

#[cfg(not(unix))]
fn watch_resize(_events: mpsc::Sender<SessionEvent>) -> Result<()> {
    debug!("Resize notifications are not supported on this platform");
    Ok(())
}

async fn run_host(args: &Args, config: Config) -> Result<()> {
    let dimensions = host_dimensions();
    let (tx, rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
    let speaker = build_speaker(&config);
    let screen: Box<dyn Write + Send> = Box::new(std::io::stdout());

    let mut session = if args.manual {
        let options = SessionOptions::from_config(&config, dimensions);
        Session::manual(screen, speaker, options)
    } else {
        session::launch(&config, dimensions, screen, speaker, tx.clone())
    };

    let _raw_mode = RawMode::enable()?;
    spawn_stdin_reader(tx.clone())?;
    watch_resize(tx)?;

    session.open(dimensions);
    info!(
        session = %session.id(),
        mode = ?session.mode(),
        "Ready in {:?}",
        STARTUP_TIME.elapsed()
    );
    session::run(&mut session, rx).await;
    session.finish(SHUTDOWN_GRACE).await;
    Ok(())
}

fn main() -> Result<()> {
    Lazy::force(&STARTUP_TIME);
    let args = Args::parse();

    if let Err(e) = init_logging() {
        eprintln!("earshot: logging disabled: {:#}", e);
    }
    let config = resolve_config(&args);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    let result = runtime.block_on(run_host(&args, config));
    if let Err(e) = &result {
        tracing::error!("Earshot stopped: {:#}", e);
    }
    info!("Earshot exiting");
    result
}
