//! Everything that can happen to a session, as one typed queue.

use actions::NavigationAction;
use terminal::{PtyEvent, TerminalDimensions};

/// One unit of work for the session loop. Events are handled to completion
/// one at a time, in arrival order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    /// Raw output from the shell.
    DataReceived(Vec<u8>),
    /// Raw bytes typed on the host terminal.
    KeyPressed(Vec<u8>),
    Resized(TerminalDimensions),
    /// A navigation command issued by something other than the keyboard.
    NavigationRequested(NavigationAction),
    /// Free text appended to the history as if the shell had printed it.
    ManualContent(String),
    ShellExited,
    StopSpeech,
}

impl From<PtyEvent> for SessionEvent {
    fn from(event: PtyEvent) -> Self {
        match event {
            PtyEvent::Output(bytes) => SessionEvent::DataReceived(bytes),
            PtyEvent::Exited => SessionEvent::ShellExited,
        }
    }
}

/// Whether the loop should keep going after an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionStatus {
    Running,
    Exited,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pty_events_map_onto_session_events() {
        assert_eq!(
            SessionEvent::from(PtyEvent::Output(b"hi".to_vec())),
            SessionEvent::DataReceived(b"hi".to_vec())
        );
        assert_eq!(SessionEvent::from(PtyEvent::Exited), SessionEvent::ShellExited);
    }
}
