//! Shared helpers for session integration tests.
//!
//! A [`Harness`] wires a [`Session`] to an in-memory screen, a mocked shell
//! and recording speech/tone players, so tests can drive events and inspect
//! what the user would have seen and heard.

// Not every test file uses every helper.
#![allow(dead_code)]

use std::io::{self, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};

use actions::NavigationAction;
use async_trait::async_trait;
use mockall::mock;
use parking_lot::Mutex;
use session::{
    AnnounceError, Announcer, Session, SessionEvent, SessionOptions, SessionStatus, ShellProcess,
    Speaker, Tone, TonePlayer,
};
use terminal::TerminalDimensions;
use tokio_util::sync::CancellationToken;

/// Settle delay used by every test speaker.
pub const SETTLE: Duration = Duration::from_millis(50);

/// Long enough for any scheduled announcement to have been spoken.
pub const SPEECH_WAIT: Duration = Duration::from_millis(250);

pub const F2: &[u8] = b"\x1bOQ";
pub const F3: &[u8] = b"\x1bOR";

// ============================================================================
// Mocks
// ============================================================================

mock! {
    pub Shell {}

    impl ShellProcess for Shell {
        fn write(&mut self, data: &[u8]) -> anyhow::Result<()>;
        fn resize(&self, dimensions: TerminalDimensions) -> anyhow::Result<()>;
        fn kill(&mut self);
    }
}

/// A shell that accepts everything and records what was written to it.
pub fn recording_shell(written: Arc<Mutex<Vec<u8>>>) -> MockShell {
    let mut shell = MockShell::new();
    shell.expect_write().returning(move |data| {
        written.lock().extend_from_slice(data);
        Ok(())
    });
    shell.expect_resize().returning(|_| Ok(()));
    shell.expect_kill().return_const(());
    shell
}

/// The host screen, shared so tests can read it while the session owns it.
#[derive(Clone, Default)]
pub struct SharedScreen(Arc<Mutex<Vec<u8>>>);

impl SharedScreen {
    pub fn bytes(&self) -> Vec<u8> {
        self.0.lock().clone()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }

    pub fn clear(&self) {
        self.0.lock().clear();
    }
}

impl Write for SharedScreen {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Records every announcement that completed.
#[derive(Default)]
pub struct RecordingAnnouncer {
    spoken: Mutex<Vec<String>>,
}

impl RecordingAnnouncer {
    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().clone()
    }

    pub fn clear(&self) {
        self.spoken.lock().clear();
    }
}

#[async_trait]
impl Announcer for RecordingAnnouncer {
    async fn announce(
        &self,
        segments: Vec<String>,
        cancel: CancellationToken,
    ) -> Result<(), AnnounceError> {
        if cancel.is_cancelled() {
            return Err(AnnounceError::Cancelled);
        }
        self.spoken.lock().push(segments.join(". "));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingTones {
    played: Mutex<Vec<Tone>>,
}

impl RecordingTones {
    pub fn played(&self) -> Vec<Tone> {
        self.played.lock().clone()
    }
}

#[async_trait]
impl TonePlayer for RecordingTones {
    async fn play_tone(&self, tone: Tone) -> anyhow::Result<()> {
        self.played.lock().push(tone);
        Ok(())
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub session: Session,
    pub screen: SharedScreen,
    pub announcer: Arc<RecordingAnnouncer>,
    pub tones: Arc<RecordingTones>,
    /// Everything forwarded to the shell, when built with [`Harness::shell`].
    pub shell_input: Arc<Mutex<Vec<u8>>>,
}

impl Harness {
    fn build(make: impl FnOnce(Box<dyn Write + Send>, Speaker) -> Session) -> Self {
        let screen = SharedScreen::default();
        let announcer = Arc::new(RecordingAnnouncer::default());
        let tones = Arc::new(RecordingTones::default());
        let speaker = Speaker::new(announcer.clone(), tones.clone(), SETTLE);
        let session = make(Box::new(screen.clone()), speaker);
        Self {
            session,
            screen,
            announcer,
            tones,
            shell_input: Arc::default(),
        }
    }

    /// Attached to a shell that records its input.
    pub fn shell() -> Self {
        Self::shell_with_options(SessionOptions::default())
    }

    pub fn shell_with_options(options: SessionOptions) -> Self {
        let written = Arc::new(Mutex::new(Vec::new()));
        let shell = recording_shell(written.clone());
        let mut harness = Self::with_shell(shell, options);
        harness.shell_input = written;
        harness
    }

    pub fn with_shell(shell: MockShell, options: SessionOptions) -> Self {
        Self::build(|screen, speaker| Session::attached(Box::new(shell), screen, speaker, options))
    }

    pub fn manual() -> Self {
        Self::build(|screen, speaker| Session::manual(screen, speaker, SessionOptions::default()))
    }

    pub fn degraded() -> Self {
        Self::build(|screen, speaker| {
            Session::degraded(screen, speaker, SessionOptions::default(), "no shell found")
        })
    }

    pub fn send(&mut self, event: SessionEvent) -> SessionStatus {
        self.session.handle_event(event, Instant::now())
    }

    pub fn output(&mut self, bytes: &[u8]) -> SessionStatus {
        self.send(SessionEvent::DataReceived(bytes.to_vec()))
    }

    pub fn press(&mut self, bytes: &[u8]) -> SessionStatus {
        self.send(SessionEvent::KeyPressed(bytes.to_vec()))
    }

    pub fn navigate(&mut self, action: NavigationAction) -> SessionStatus {
        self.send(SessionEvent::NavigationRequested(action))
    }

    pub fn shell_input(&self) -> Vec<u8> {
        self.shell_input.lock().clone()
    }

    /// `(kind badge, content)` for every history entry, oldest first.
    pub fn entries(&self) -> Vec<(&'static str, String)> {
        self.session
            .history()
            .iter()
            .map(|entry| (entry.kind.badge(), entry.content.clone()))
            .collect()
    }

    /// Let scheduled announcements run, then return what was spoken.
    pub async fn spoken(&self) -> Vec<String> {
        tokio::time::sleep(SPEECH_WAIT).await;
        self.announcer.spoken()
    }
}

pub fn options_with_capacity(history_capacity: usize) -> SessionOptions {
    SessionOptions {
        history_capacity,
        ..SessionOptions::default()
    }
}
