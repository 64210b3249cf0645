//! The session controller.
//!
//! A [`Session`] owns every piece of per-session state: the shell handle,
//! the history, the navigation cursor and the reading overlay. Events from
//! the PTY reader, the host keyboard and the host window are funnelled
//! through [`run`] and handled one at a time on a single task, so nothing
//! here needs a lock.

use std::io::Write;
use std::time::{Duration, Instant};

use actions::NavigationAction;
use anyhow::Result;
use reading_view::{
    classify, render, Cursor, EntryKind, History, Movement, Navigator, ReadingModeState,
};
use settings::constants::overlay::HEADER_ROWS;
use settings::Config;
use terminal::{ansi, Decoded, DecodedKey, KeyDecoder, PtyHandler, SpawnOptions};
use terminal::{LineSegmenter, TerminalDimensions};
use termwiz::input::{KeyCode, Modifiers};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use util::pluralize;
use uuid::Uuid;

use crate::announce::{Speaker, Tone};
use crate::events::{SessionEvent, SessionStatus};
use crate::keymap::{KeyAction, KeyMap};

/// The running shell, as far as the session is concerned.
pub trait ShellProcess: Send {
    fn write(&mut self, data: &[u8]) -> Result<()>;
    fn resize(&self, dimensions: TerminalDimensions) -> Result<()>;
    fn kill(&mut self);
}

impl ShellProcess for PtyHandler {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        PtyHandler::write(self, data)
    }

    fn resize(&self, dimensions: TerminalDimensions) -> Result<()> {
        PtyHandler::resize(self, dimensions)
    }

    fn kill(&mut self) {
        PtyHandler::kill(self)
    }
}

/// Conventional terminal surface a host drives.
pub trait PseudoTerminal {
    fn open(&mut self, dimensions: TerminalDimensions);
    fn close(&mut self);
    fn handle_input(&mut self, bytes: &[u8]);
    fn set_dimensions(&mut self, dimensions: TerminalDimensions);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionMode {
    /// Attached to a live shell.
    Shell,
    /// No shell; typed lines and [`SessionEvent::ManualContent`] fill the history.
    Manual,
    /// No shell could be started. Keys are echoed locally, nothing is navigable.
    Degraded,
}

#[derive(Clone, Debug)]
pub struct SessionOptions {
    pub history_capacity: usize,
    pub command_history_capacity: usize,
    pub pending_output_limit: usize,
    pub escape_timeout: Duration,
    pub keymap: KeyMap,
    pub dimensions: TerminalDimensions,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from_config(&Config::default(), TerminalDimensions::default())
    }
}

impl SessionOptions {
    pub fn from_config(config: &Config, dimensions: TerminalDimensions) -> Self {
        Self {
            history_capacity: config.history_capacity,
            command_history_capacity: config.command_history_capacity,
            pending_output_limit: config.pending_output_limit,
            escape_timeout: config.escape_timeout(),
            keymap: KeyMap::from_config(config),
            dimensions: dimensions.or_default_if_empty(),
        }
    }
}

pub struct Session {
    id: Uuid,
    mode: SessionMode,
    shell: Option<Box<dyn ShellProcess>>,
    shell_exited: bool,
    screen: Box<dyn Write + Send>,
    segmenter: LineSegmenter,
    decoder: KeyDecoder,
    keymap: KeyMap,
    history: History,
    /// Submitted command lines, newest last.
    commands: History,
    navigator: Navigator,
    reading: ReadingModeState,
    dimensions: TerminalDimensions,
    speaker: Speaker,
    /// Provisional command line rebuilt from forwarded keys. Tab completion
    /// and shell history recall happen in the shell and are not seen here.
    input_line: String,
    last_announcement: Option<JoinHandle<()>>,
    degraded_reason: Option<String>,
}

impl Session {
    fn new(
        mode: SessionMode,
        shell: Option<Box<dyn ShellProcess>>,
        screen: Box<dyn Write + Send>,
        speaker: Speaker,
        options: SessionOptions,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            mode,
            shell,
            shell_exited: false,
            screen,
            segmenter: LineSegmenter::new(),
            decoder: KeyDecoder::new(options.escape_timeout),
            keymap: options.keymap,
            history: History::new(options.history_capacity),
            commands: History::new(options.command_history_capacity),
            navigator: Navigator::new(),
            reading: ReadingModeState::new(options.pending_output_limit),
            dimensions: options.dimensions.or_default_if_empty(),
            speaker,
            input_line: String::new(),
            last_announcement: None,
            degraded_reason: None,
        }
    }

    pub fn attached(
        shell: Box<dyn ShellProcess>,
        screen: Box<dyn Write + Send>,
        speaker: Speaker,
        options: SessionOptions,
    ) -> Self {
        Self::new(SessionMode::Shell, Some(shell), screen, speaker, options)
    }

    pub fn manual(screen: Box<dyn Write + Send>, speaker: Speaker, options: SessionOptions) -> Self {
        Self::new(SessionMode::Manual, None, screen, speaker, options)
    }

    pub fn degraded(
        screen: Box<dyn Write + Send>,
        speaker: Speaker,
        options: SessionOptions,
        reason: impl Into<String>,
    ) -> Self {
        let mut session = Self::new(SessionMode::Degraded, None, screen, speaker, options);
        session.degraded_reason = Some(reason.into());
        session
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn command_history(&self) -> &History {
        &self.commands
    }

    pub fn cursor(&self) -> &Cursor {
        self.navigator.cursor()
    }

    pub fn is_reading(&self) -> bool {
        self.reading.active
    }

    pub fn pending_output_chunks(&self) -> usize {
        self.reading.pending_chunks()
    }

    pub fn dimensions(&self) -> TerminalDimensions {
        self.dimensions
    }

    pub fn input_line(&self) -> &str {
        &self.input_line
    }

    pub fn shell_exited(&self) -> bool {
        self.shell_exited
    }

    /// When the key decoder next needs [`Session::on_input_timeout`].
    pub fn input_deadline(&self) -> Option<Instant> {
        self.decoder.deadline()
    }

    pub fn handle_event(&mut self, event: SessionEvent, now: Instant) -> SessionStatus {
        match event {
            SessionEvent::DataReceived(bytes) => self.on_data(&bytes),
            SessionEvent::KeyPressed(bytes) => return self.on_input(&bytes, now),
            SessionEvent::Resized(dimensions) => self.on_resize(dimensions),
            SessionEvent::NavigationRequested(action) => self.dispatch(action),
            SessionEvent::ManualContent(text) => self.append_manual(&text),
            SessionEvent::ShellExited => {
                self.on_shell_exit();
                return SessionStatus::Exited;
            }
            SessionEvent::StopSpeech => self.speaker.stop_all(),
        }
        SessionStatus::Running
    }

    fn on_data(&mut self, bytes: &[u8]) {
        if self.reading.active {
            self.reading.queue(bytes);
        } else {
            self.write_screen(bytes);
        }

        let lines = self.segmenter.feed(bytes);
        if lines.is_empty() {
            return;
        }
        tracing::debug!(lines = lines.len(), "Captured output lines");
        for line in lines {
            self.append(EntryKind::Output, line);
        }
        self.render();
    }

    fn append_manual(&mut self, text: &str) {
        let mut appended = 0;
        for line in text.lines() {
            let stripped = ansi::strip(line);
            let line = stripped.trim_end();
            if line.trim().is_empty() {
                continue;
            }
            self.append(EntryKind::Output, line.to_string());
            appended += 1;
        }
        tracing::debug!(appended, "Appended manual content");
        self.render();
    }

    fn append(&mut self, kind: EntryKind, content: String) {
        let evicted = self.history.append(kind, content);
        self.navigator.on_evicted(evicted);
    }

    fn on_input(&mut self, bytes: &[u8], now: Instant) -> SessionStatus {
        let decoded = self.decoder.feed(bytes, now);
        self.process_decoded(decoded)
    }

    /// Resolve a partial escape sequence whose deadline has passed.
    pub fn on_input_timeout(&mut self, now: Instant) -> SessionStatus {
        let decoded = self.decoder.expire(now);
        self.process_decoded(decoded)
    }

    fn process_decoded(&mut self, decoded: Vec<Decoded>) -> SessionStatus {
        for item in decoded {
            let key = match item {
                Decoded::Key(key) => key,
                Decoded::Unrecognized(raw) => {
                    tracing::trace!(?raw, "Forwarding unrecognised sequence");
                    self.forward(&raw);
                    continue;
                }
            };
            let degraded = self.mode == SessionMode::Degraded;
            match self.keymap.classify(&key, self.reading.active, degraded) {
                KeyAction::Navigate(action) => {
                    tracing::debug!(%action, "Navigation key");
                    self.dispatch(action);
                }
                KeyAction::NavigationUnavailable => self.announce_unavailable(),
                KeyAction::Forward => {
                    if self.ordinary_key(&key) == SessionStatus::Exited {
                        return SessionStatus::Exited;
                    }
                }
            }
        }
        SessionStatus::Running
    }

    fn ordinary_key(&mut self, key: &DecodedKey) -> SessionStatus {
        if self.mode == SessionMode::Shell {
            if self.shell_exited {
                tracing::trace!("Shell gone, dropping key");
                return SessionStatus::Running;
            }
            self.forward(&key.raw);
            if let Some(command) = self.track_input(key) {
                self.commit_command(command);
            }
            return SessionStatus::Running;
        }

        if key.matches(&(KeyCode::Char('d'), Modifiers::CTRL)) && self.input_line.is_empty() {
            tracing::info!(session = %self.id, "End of input");
            return SessionStatus::Exited;
        }
        let before = self.input_line.chars().count();
        let committed = self.track_input(key);
        self.local_echo(key, before);
        if let Some(line) = committed {
            if self.mode == SessionMode::Manual && !line.trim().is_empty() {
                self.append(EntryKind::Output, line.trim_end().to_string());
                self.render();
            }
        }
        SessionStatus::Running
    }

    /// Update the provisional command line. Returns the line on Enter.
    fn track_input(&mut self, key: &DecodedKey) -> Option<String> {
        match key.key {
            KeyCode::Enter => return Some(std::mem::take(&mut self.input_line)),
            KeyCode::Backspace => {
                self.input_line.pop();
            }
            KeyCode::Char('c') | KeyCode::Char('u') if key.modifiers == Modifiers::CTRL => {
                self.input_line.clear();
            }
            _ => {
                if let Some(c) = key.text() {
                    self.input_line.push(c);
                }
            }
        }
        None
    }

    fn commit_command(&mut self, command: String) {
        let command = command.trim_end().to_string();
        if command.trim().is_empty() {
            return;
        }
        tracing::debug!(command, "Command submitted");
        self.commands.append(EntryKind::Input, command.clone());
        self.append(EntryKind::Input, command.clone());
        self.segmenter.expect_echo(Some(command));
    }

    fn local_echo(&mut self, key: &DecodedKey, chars_before: usize) {
        let echo: Vec<u8> = match key.key {
            KeyCode::Enter => b"\r\n".to_vec(),
            KeyCode::Backspace if chars_before > 0 => b"\x08 \x08".to_vec(),
            KeyCode::Char('c') if key.modifiers == Modifiers::CTRL => b"^C\r\n".to_vec(),
            KeyCode::Char('u') if key.modifiers == Modifiers::CTRL => b"\r\x1b[K".to_vec(),
            _ => match key.text() {
                Some(c) => c.to_string().into_bytes(),
                None => return,
            },
        };
        if !self.reading.active {
            self.write_screen(&echo);
        }
    }

    fn forward(&mut self, bytes: &[u8]) {
        if self.shell_exited {
            tracing::trace!("Shell gone, dropping input");
            return;
        }
        let Some(shell) = self.shell.as_mut() else {
            return;
        };
        if let Err(e) = shell.write(bytes) {
            tracing::warn!("PTY write failed: {e:#}");
            self.on_shell_exit();
        }
    }

    pub fn dispatch(&mut self, action: NavigationAction) {
        if self.mode == SessionMode::Degraded && action != NavigationAction::StopSpeech {
            self.announce_unavailable();
            return;
        }

        if action.is_movement() && !self.reading.active {
            tracing::debug!(%action, "Ignoring movement outside reading mode");
            return;
        }

        let page = self.page_size();
        let movement = match action {
            NavigationAction::ToggleReadingMode => {
                if self.reading.active {
                    self.exit_reading_mode();
                } else {
                    self.enter_reading_mode();
                }
                return;
            }
            NavigationAction::ExitReadingMode => {
                if self.reading.active {
                    self.exit_reading_mode();
                }
                return;
            }
            NavigationAction::Summarize => {
                self.summarize();
                return;
            }
            NavigationAction::StopSpeech => {
                self.speaker.stop_all();
                return;
            }
            NavigationAction::LineUp => self.navigator.line_up(&self.history),
            NavigationAction::LineDown => self.navigator.line_down(&self.history),
            NavigationAction::FirstLine => self.navigator.line_first(&self.history),
            NavigationAction::LastLine => self.navigator.line_last(&self.history),
            NavigationAction::PageUp => self.navigator.page_up(&self.history, page),
            NavigationAction::PageDown => self.navigator.page_down(&self.history, page),
            NavigationAction::WordLeft => self.navigator.word_left(&self.history),
            NavigationAction::WordRight => self.navigator.word_right(&self.history),
            NavigationAction::CharLeft => self.navigator.char_left(&self.history),
            NavigationAction::CharRight => self.navigator.char_right(&self.history),
        };
        self.render();
        match movement {
            Movement::Boundary(_) => self.tone(Tone::Boundary),
            Movement::EmptyLine => self.tone(Tone::EmptyLine),
            _ => {}
        }
        self.announce(vec![movement.speech()]);
    }

    fn page_size(&self) -> usize {
        (self.dimensions.rows as usize)
            .saturating_sub(HEADER_ROWS)
            .max(1)
    }

    fn enter_reading_mode(&mut self) {
        if self.history.is_empty() {
            self.announce(vec![Movement::NoContent.speech()]);
            return;
        }
        let movement = self.navigator.reset_to_latest_input(&self.history);
        let bytes = self.reading.enter();
        self.write_screen(&bytes);
        self.render();
        tracing::info!(session = %self.id, lines = self.history.len(), "Entered reading mode");
        self.tone(Tone::ReadingModeOn);
        self.announce(vec!["Reading mode".to_string(), movement.speech()]);
    }

    fn exit_reading_mode(&mut self) {
        let flushed = self.reading.pending_bytes();
        let dropped = self.reading.dropped_bytes();
        let bytes = self.reading.exit();
        self.write_screen(&bytes);
        tracing::info!(session = %self.id, flushed, dropped, "Left reading mode");
        self.tone(Tone::ReadingModeOff);
        let mut segments = vec!["Reading mode off".to_string()];
        if dropped > 0 {
            tracing::warn!(dropped, "Output queued during reading mode was truncated");
            segments.push(format!("{} of output dropped", pluralize(dropped, "byte")));
        }
        self.announce(segments);
    }

    fn summarize(&mut self) {
        let classification = classify(self.history.entries_since_last_input());
        if classification.error_count > 0 {
            self.tone(Tone::Error);
        }
        let mut segments = Vec::with_capacity(classification.suggestions.len() + 2);
        if let Some(command) = self.commands.iter().next_back() {
            segments.push(format!("After {}", command.content));
        }
        segments.push(classification.summary);
        segments.extend(classification.suggestions);
        self.announce(segments);
    }

    fn announce_unavailable(&mut self) {
        self.announce(vec!["Navigation unavailable, no shell is running".to_string()]);
    }

    fn render(&mut self) {
        if !self.reading.active {
            return;
        }
        let frame = render(
            &self.history,
            self.navigator.cursor(),
            self.dimensions,
            self.reading.pending_chunks(),
        );
        self.write_screen(frame.to_ansi().as_bytes());
    }

    fn on_resize(&mut self, dimensions: TerminalDimensions) {
        let dimensions = dimensions.or_default_if_empty();
        if dimensions == self.dimensions {
            return;
        }
        tracing::debug!(?dimensions, "Resized");
        self.dimensions = dimensions;
        if let Some(shell) = self.shell.as_ref().filter(|_| !self.shell_exited) {
            if let Err(e) = shell.resize(dimensions) {
                tracing::warn!("PTY resize failed: {e:#}");
            }
        }
        self.render();
    }

    fn on_shell_exit(&mut self) {
        if self.shell_exited {
            return;
        }
        self.shell_exited = true;
        tracing::info!(session = %self.id, "Shell exited");
        self.announce(vec!["Shell exited".to_string()]);
    }

    fn announce(&mut self, segments: Vec<String>) {
        self.last_announcement = Some(self.speaker.announce(segments));
    }

    fn tone(&self, tone: Tone) {
        self.speaker.play_tone(tone);
    }

    fn write_screen(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        if let Err(e) = self
            .screen
            .write_all(bytes)
            .and_then(|()| self.screen.flush())
        {
            tracing::warn!("Screen write failed: {e}");
        }
    }

    /// Close the session and give the last announcement up to `grace` to
    /// finish speaking.
    pub async fn finish(mut self, grace: Duration) {
        self.close();
        if let Some(handle) = self.last_announcement.take() {
            if tokio::time::timeout(grace, handle).await.is_err() {
                tracing::debug!("Last announcement cut short");
            }
        }
    }
}

impl PseudoTerminal for Session {
    fn open(&mut self, dimensions: TerminalDimensions) {
        self.on_resize(dimensions);
        tracing::info!(session = %self.id, mode = ?self.mode, "Session opened");
        match self.mode {
            SessionMode::Shell => {}
            SessionMode::Manual => {
                self.write_screen(b"earshot: manual mode, type lines to add them to the history\r\n");
                self.announce(vec!["Manual mode".to_string()]);
            }
            SessionMode::Degraded => {
                let reason = self.degraded_reason.clone().unwrap_or_default();
                let message =
                    format!("earshot: could not start a shell ({reason}); input is echoed locally\r\n");
                self.write_screen(message.as_bytes());
                self.announce(vec!["Shell could not be started".to_string()]);
            }
        }
    }

    fn close(&mut self) {
        if self.reading.active {
            let bytes = self.reading.exit();
            self.write_screen(&bytes);
        }
        if let Some(shell) = self.shell.as_mut() {
            shell.kill();
        }
        self.shell_exited = true;
        tracing::info!(session = %self.id, entries = self.history.total_appended(), "Session closed");
    }

    fn handle_input(&mut self, bytes: &[u8]) {
        self.on_input(bytes, Instant::now());
    }

    fn set_dimensions(&mut self, dimensions: TerminalDimensions) {
        self.on_resize(dimensions);
    }
}

/// Spawn the configured shell, sending its output to `events`.
pub fn spawn_shell(
    config: &Config,
    dimensions: TerminalDimensions,
    events: mpsc::Sender<SessionEvent>,
) -> Result<PtyHandler> {
    let options = SpawnOptions {
        candidates: config.shell_candidates_with_env(std::env::var("SHELL").ok()),
        cwd: config.working_directory.as_ref().map(Into::into),
        dimensions,
    };
    PtyHandler::spawn(&options, move |event| {
        if events.blocking_send(event.into()).is_err() {
            tracing::trace!("Session gone, dropping PTY event");
        }
    })
}

/// Start a shell session, or a degraded one if no shell can be spawned.
pub fn launch(
    config: &Config,
    dimensions: TerminalDimensions,
    screen: Box<dyn Write + Send>,
    speaker: Speaker,
    events: mpsc::Sender<SessionEvent>,
) -> Session {
    let options = SessionOptions::from_config(config, dimensions);
    match spawn_shell(config, dimensions, events) {
        Ok(pty) => {
            tracing::info!(shell = pty.shell(), "Shell started");
            Session::attached(Box::new(pty), screen, speaker, options)
        }
        Err(e) => {
            tracing::warn!("Could not start a shell: {e:#}");
            Session::degraded(screen, speaker, options, format!("{e:#}"))
        }
    }
}

/// Drive `session` until the shell exits, input ends, or `events` closes.
pub async fn run(session: &mut Session, mut events: mpsc::Receiver<SessionEvent>) {
    loop {
        let deadline = session.input_deadline();
        let wake_at = deadline
            .map(tokio::time::Instant::from_std)
            .unwrap_or_else(tokio::time::Instant::now);

        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    tracing::debug!("Event channel closed");
                    return;
                };
                let now = tokio::time::Instant::now().into_std();
                if session.handle_event(event, now) == SessionStatus::Exited {
                    return;
                }
            }
            () = tokio::time::sleep_until(wake_at), if deadline.is_some() => {
                let now = tokio::time::Instant::now().into_std();
                if session.on_input_timeout(now) == SessionStatus::Exited {
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::announce::{LogAnnouncer, SilentTones};
    use std::sync::Arc;
    use tracing_test::traced_test;

    struct BrokenShell;

    impl ShellProcess for BrokenShell {
        fn write(&mut self, _data: &[u8]) -> Result<()> {
            anyhow::bail!("broken pipe")
        }

        fn resize(&self, _dimensions: TerminalDimensions) -> Result<()> {
            anyhow::bail!("not a tty")
        }

        fn kill(&mut self) {}
    }

    fn broken_session() -> Session {
        let speaker = Speaker::new(Arc::new(LogAnnouncer), Arc::new(SilentTones), Duration::ZERO);
        Session::attached(
            Box::new(BrokenShell),
            Box::new(std::io::sink()),
            speaker,
            SessionOptions::default(),
        )
    }

    #[tokio::test]
    #[traced_test]
    async fn write_failure_is_logged_and_swallowed() {
        let mut session = broken_session();
        session.handle_input(b"x");

        assert!(session.shell_exited());
        assert!(logs_contain("PTY write failed: broken pipe"));
    }

    #[tokio::test]
    #[traced_test]
    async fn resize_failure_is_logged() {
        let mut session = broken_session();
        session.set_dimensions(TerminalDimensions::new(120, 40));

        assert_eq!(session.dimensions(), TerminalDimensions::new(120, 40));
        assert!(logs_contain("PTY resize failed"));
    }

    #[test]
    fn options_follow_config() {
        let config = Config {
            history_capacity: 42,
            escape_timeout_ms: 80,
            ..Config::default()
        };
        let options = SessionOptions::from_config(&config, TerminalDimensions::new(0, 0));

        assert_eq!(options.history_capacity, 42);
        assert_eq!(options.escape_timeout, Duration::from_millis(80));
        assert_eq!(options.dimensions, TerminalDimensions::default());
    }
}
