//! Speech and tone seams, and the scheduling around them.
//!
//! The session never synthesizes speech. It hands text to an [`Announcer`]
//! and non-speech cues to a [`TonePlayer`]. [`Speaker`] enforces the
//! interruption contract: a new announcement cancels the previous one,
//! waits a short settle delay, and only one announcement runs at a time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use settings::constants::speech::GUARD_POLL_INTERVAL;
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AnnounceError {
    /// Interrupted by a newer announcement or a stop request.
    #[error("announcement cancelled")]
    Cancelled,
    #[error("announcement failed: {0}")]
    Failed(String),
}

/// Speaks text. Implementations must return promptly once `cancel` fires.
#[async_trait]
pub trait Announcer: Send + Sync {
    async fn announce(
        &self,
        segments: Vec<String>,
        cancel: CancellationToken,
    ) -> Result<(), AnnounceError>;
}

/// Non-speech audio cues.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Tone {
    ReadingModeOn,
    ReadingModeOff,
    Boundary,
    EmptyLine,
    Error,
}

#[async_trait]
pub trait TonePlayer: Send + Sync {
    async fn play_tone(&self, tone: Tone) -> anyhow::Result<()>;
}

/// Writes announcements to the log instead of speaking them.
#[derive(Debug, Default)]
pub struct LogAnnouncer;

#[async_trait]
impl Announcer for LogAnnouncer {
    async fn announce(
        &self,
        segments: Vec<String>,
        cancel: CancellationToken,
    ) -> Result<(), AnnounceError> {
        if cancel.is_cancelled() {
            return Err(AnnounceError::Cancelled);
        }
        tracing::info!(text = %segments.join(". "), "Announcement");
        Ok(())
    }
}

/// Tone player for hosts without audio.
#[derive(Debug, Default)]
pub struct SilentTones;

#[async_trait]
impl TonePlayer for SilentTones {
    async fn play_tone(&self, tone: Tone) -> anyhow::Result<()> {
        tracing::trace!(?tone, "Tone");
        Ok(())
    }
}

/// Speaks through an external program, e.g. `espeak -s 220`. The text is
/// passed as the final argument; cancellation kills the process.
#[derive(Clone, Debug)]
pub struct CommandAnnouncer {
    program: String,
    args: Vec<String>,
}

impl CommandAnnouncer {
    /// `None` for an empty command line.
    pub fn new(command: &[String]) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

#[async_trait]
impl Announcer for CommandAnnouncer {
    async fn announce(
        &self,
        segments: Vec<String>,
        cancel: CancellationToken,
    ) -> Result<(), AnnounceError> {
        let text = segments.join(". ");
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(&text)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AnnounceError::Failed(format!("{}: {e}", self.program)))?;

        tokio::select! {
            _ = cancel.cancelled() => {
                if let Err(e) = child.kill().await {
                    tracing::debug!("Kill speech process: {e}");
                }
                Err(AnnounceError::Cancelled)
            }
            status = child.wait() => match status {
                Ok(status) if status.success() => Ok(()),
                Ok(status) => Err(AnnounceError::Failed(format!("{} exited with {status}", self.program))),
                Err(e) => Err(AnnounceError::Failed(e.to_string())),
            },
        }
    }
}

/// Held while an announcement is in flight; clears the flag on drop no
/// matter how the announcement ended.
struct InFlightGuard(Arc<AtomicBool>);

impl InFlightGuard {
    fn try_acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag.clone()))
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Schedules announcements and tones on the current tokio runtime.
pub struct Speaker {
    announcer: Arc<dyn Announcer>,
    tones: Arc<dyn TonePlayer>,
    tones_enabled: bool,
    settle_delay: Duration,
    /// Parent of every announcement token; cancelled by [`Speaker::stop_all`].
    root: CancellationToken,
    current: Option<CancellationToken>,
    in_flight: Arc<AtomicBool>,
}

impl Speaker {
    pub fn new(
        announcer: Arc<dyn Announcer>,
        tones: Arc<dyn TonePlayer>,
        settle_delay: Duration,
    ) -> Self {
        Self {
            announcer,
            tones,
            tones_enabled: true,
            settle_delay,
            root: CancellationToken::new(),
            current: None,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_tones_enabled(mut self, enabled: bool) -> Self {
        self.tones_enabled = enabled;
        self
    }

    /// Whether an announcement currently holds the in-flight guard.
    pub fn is_speaking(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Interrupt whatever is being said and say `segments` instead.
    pub fn announce(&mut self, segments: Vec<String>) -> JoinHandle<()> {
        if let Some(previous) = self.current.take() {
            previous.cancel();
        }
        let token = self.root.child_token();
        self.current = Some(token.clone());

        let announcer = self.announcer.clone();
        let in_flight = self.in_flight.clone();
        let settle_delay = self.settle_delay;
        tokio::spawn(async move {
            // Give the previous announcement time to observe its cancellation.
            tokio::time::sleep(settle_delay).await;
            if token.is_cancelled() {
                return;
            }

            let _guard = loop {
                if let Some(guard) = InFlightGuard::try_acquire(&in_flight) {
                    break guard;
                }
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = tokio::time::sleep(GUARD_POLL_INTERVAL) => {}
                }
            };
            if token.is_cancelled() {
                return;
            }

            match announcer.announce(segments, token).await {
                Ok(()) => {}
                Err(AnnounceError::Cancelled) => tracing::trace!("Announcement interrupted"),
                Err(AnnounceError::Failed(reason)) => {
                    tracing::warn!("Announcement failed: {reason}");
                }
            }
        })
    }

    /// Play `tone` unless tones are disabled. Failures are logged.
    pub fn play_tone(&self, tone: Tone) -> Option<JoinHandle<()>> {
        if !self.tones_enabled {
            return None;
        }
        let tones = self.tones.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = tones.play_tone(tone).await {
                tracing::warn!(?tone, "Tone playback failed: {e:#}");
            }
        }))
    }

    /// Cancel every pending and in-flight announcement.
    pub fn stop_all(&mut self) {
        self.root.cancel();
        self.root = CancellationToken::new();
        self.current = None;
    }
}

impl Drop for Speaker {
    fn drop(&mut self) {
        self.root.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use tracing_test::traced_test;

    const SETTLE: Duration = Duration::from_millis(50);

    /// Takes `duration` to speak and records what finished or was cut off.
    struct SlowAnnouncer {
        duration: Duration,
        spoken: Mutex<Vec<String>>,
        cancelled: Mutex<Vec<String>>,
    }

    impl SlowAnnouncer {
        fn new(duration: Duration) -> Arc<Self> {
            Arc::new(Self {
                duration,
                spoken: Mutex::new(Vec::new()),
                cancelled: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Announcer for SlowAnnouncer {
        async fn announce(
            &self,
            segments: Vec<String>,
            cancel: CancellationToken,
        ) -> Result<(), AnnounceError> {
            let text = segments.join(" ");
            tokio::select! {
                _ = cancel.cancelled() => {
                    self.cancelled.lock().push(text);
                    Err(AnnounceError::Cancelled)
                }
                _ = tokio::time::sleep(self.duration) => {
                    self.spoken.lock().push(text);
                    Ok(())
                }
            }
        }
    }

    struct FailingAnnouncer;

    #[async_trait]
    impl Announcer for FailingAnnouncer {
        async fn announce(
            &self,
            _segments: Vec<String>,
            _cancel: CancellationToken,
        ) -> Result<(), AnnounceError> {
            Err(AnnounceError::Failed("audio device busy".into()))
        }
    }

    fn speaker(announcer: Arc<dyn Announcer>) -> Speaker {
        Speaker::new(announcer, Arc::new(SilentTones), SETTLE)
    }

    #[tokio::test(start_paused = true)]
    async fn announcement_waits_for_settle_delay() {
        let announcer = SlowAnnouncer::new(Duration::from_millis(10));
        let mut speaker = speaker(announcer.clone());
        let handle = speaker.announce(vec!["hello".into()]);
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(announcer.spoken.lock().is_empty());
        handle.await.unwrap();
        assert_eq!(*announcer.spoken.lock(), vec!["hello"]);
        assert!(!speaker.is_speaking());
    }

    #[tokio::test(start_paused = true)]
    async fn newer_request_before_settle_replaces_older() {
        let announcer = SlowAnnouncer::new(Duration::from_millis(100));
        let mut speaker = speaker(announcer.clone());
        let first = speaker.announce(vec!["first".into()]);
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = speaker.announce(vec!["second".into()]);
        first.await.unwrap();
        second.await.unwrap();
        assert_eq!(*announcer.spoken.lock(), vec!["second"]);
        assert!(announcer.cancelled.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn newer_request_interrupts_in_flight_announcement() {
        let announcer = SlowAnnouncer::new(Duration::from_millis(100));
        let mut speaker = speaker(announcer.clone());
        let first = speaker.announce(vec!["first".into()]);
        // Past the settle delay: "first" is being spoken.
        tokio::time::sleep(Duration::from_millis(70)).await;
        assert!(speaker.is_speaking());
        let second = speaker.announce(vec!["second".into()]);
        first.await.unwrap();
        second.await.unwrap();
        assert_eq!(*announcer.cancelled.lock(), vec!["first"]);
        assert_eq!(*announcer.spoken.lock(), vec!["second"]);
        assert!(!speaker.is_speaking());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_all_cancels_everything() {
        let announcer = SlowAnnouncer::new(Duration::from_millis(100));
        let mut speaker = speaker(announcer.clone());
        let first = speaker.announce(vec!["first".into()]);
        tokio::time::sleep(Duration::from_millis(60)).await;
        speaker.stop_all();
        first.await.unwrap();
        assert_eq!(*announcer.cancelled.lock(), vec!["first"]);
        assert!(announcer.spoken.lock().is_empty());

        // The speaker keeps working after a stop.
        speaker.announce(vec!["again".into()]).await.unwrap();
        assert_eq!(*announcer.spoken.lock(), vec!["again"]);
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn failures_are_logged_and_swallowed() {
        let mut speaker = speaker(Arc::new(FailingAnnouncer));
        speaker.announce(vec!["x".into()]).await.unwrap();
        assert!(logs_contain("audio device busy"));
        assert!(!speaker.is_speaking());
    }

    #[tokio::test]
    async fn disabled_tones_are_not_played() {
        let speaker = speaker(Arc::new(LogAnnouncer)).with_tones_enabled(false);
        assert!(speaker.play_tone(Tone::Boundary).is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_announcer_reports_failure_status() {
        let announcer = CommandAnnouncer::new(&["false".to_string()]).unwrap();
        let result = announcer
            .announce(vec!["hi".into()], CancellationToken::new())
            .await;
        assert!(matches!(result, Err(AnnounceError::Failed(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_announcer_is_killed_on_cancel() {
        let announcer = CommandAnnouncer::new(&["sleep".to_string()]).unwrap();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });
        // `sleep 30` would block for 30 seconds if not killed.
        let result = announcer.announce(vec!["30".into()], cancel).await;
        assert_eq!(result, Err(AnnounceError::Cancelled));
    }

    #[test]
    fn empty_command_is_rejected() {
        assert!(CommandAnnouncer::new(&[]).is_none());
    }
}
