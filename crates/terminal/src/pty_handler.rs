//! PTY process management.

use crate::types::TerminalDimensions;
use anyhow::{anyhow, Context, Result};
use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use settings::constants::shell::TERM;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::thread;

/// Something that happened on the PTY's reader thread.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PtyEvent {
    /// A chunk of raw output, in arrival order.
    Output(Vec<u8>),
    /// The shell closed its side of the PTY.
    Exited,
}

/// How to launch the shell.
#[derive(Clone, Debug, Default)]
pub struct SpawnOptions {
    /// Shells to try, in order. The first one that spawns wins.
    pub candidates: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub dimensions: TerminalDimensions,
}

/// Handles PTY spawning and I/O for a shell session.
///
/// Output is pushed to a callback from a dedicated reader thread, so the
/// owner never polls. Dropping the handler kills and reaps the child.
pub struct PtyHandler {
    master: Box<dyn MasterPty + Send>,
    writer: Box<dyn Write + Send>,
    child: Box<dyn Child + Send + Sync>,
    shell: String,
    _reader_thread: thread::JoinHandle<()>,
}

impl PtyHandler {
    /// Open a PTY and start the first shell candidate that launches.
    ///
    /// `on_event` runs on the reader thread for every output chunk and once
    /// more with [`PtyEvent::Exited`] when the shell goes away.
    pub fn spawn(
        options: &SpawnOptions,
        on_event: impl Fn(PtyEvent) + Send + 'static,
    ) -> Result<Self> {
        let dims = options.dimensions.or_default_if_empty();
        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(pty_size(dims))
            .context("Failed to open PTY")?;

        let mut spawned = None;
        for shell in &options.candidates {
            let mut cmd = CommandBuilder::new(shell);
            cmd.env("TERM", TERM);
            if let Some(cwd) = &options.cwd {
                cmd.cwd(cwd);
            }
            match pair.slave.spawn_command(cmd) {
                Ok(child) => {
                    tracing::info!(shell = %shell, pid = ?child.process_id(), "Shell started");
                    spawned = Some((shell.clone(), child));
                    break;
                }
                Err(e) => tracing::warn!(shell = %shell, "Failed to spawn shell: {e:#}"),
            }
        }
        let (shell, child) =
            spawned.ok_or_else(|| anyhow!("No shell could be started from {:?}", options.candidates))?;
        // The child holds its own copy; ours would keep the reader from seeing EOF.
        drop(pair.slave);

        let writer = pair
            .master
            .take_writer()
            .context("Failed to get PTY writer")?;
        let mut reader = pair
            .master
            .try_clone_reader()
            .context("Failed to get PTY reader")?;

        let reader_thread = thread::Builder::new()
            .name("pty-reader".into())
            .spawn(move || {
                let mut buf = [0u8; 4096];
                loop {
                    match reader.read(&mut buf) {
                        Ok(0) => break,
                        Ok(n) => on_event(PtyEvent::Output(buf[..n].to_vec())),
                        Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                        Err(e) => {
                            tracing::debug!("PTY read ended: {e}");
                            break;
                        }
                    }
                }
                on_event(PtyEvent::Exited);
            })
            .context("Failed to start PTY reader thread")?;

        Ok(Self {
            master: pair.master,
            writer,
            child,
            shell,
            _reader_thread: reader_thread,
        })
    }

    /// The shell that was started.
    pub fn shell(&self) -> &str {
        &self.shell
    }

    /// Write input bytes to the PTY.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        self.writer.write_all(data)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Resize the PTY window.
    pub fn resize(&self, dims: TerminalDimensions) -> Result<()> {
        self.master
            .resize(pty_size(dims.or_default_if_empty()))
            .context("Failed to resize PTY")?;
        Ok(())
    }

    /// Terminate the shell. Safe to call more than once.
    pub fn kill(&mut self) {
        if let Err(e) = self.child.kill() {
            // ESRCH (no such process) is expected if already exited
            tracing::debug!("Kill child process: {}", e);
        }
    }
}

impl Drop for PtyHandler {
    fn drop(&mut self) {
        self.kill();

        // Reap to avoid a zombie.
        if let Err(e) = self.child.wait() {
            tracing::debug!("Wait for child process: {}", e);
        }

        tracing::debug!(shell = %self.shell, "PTY handler dropped, child process cleaned up");
    }
}

fn pty_size(dims: TerminalDimensions) -> PtySize {
    PtySize {
        rows: dims.rows,
        cols: dims.columns,
        pixel_width: 0,
        pixel_height: 0,
    }
}
