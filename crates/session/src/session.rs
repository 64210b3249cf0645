//! Session control for Earshot.
//!
//! Wires the PTY, the key decoder, the history and the reading overlay into
//! one event-driven [`Session`], and schedules what gets spoken.

pub mod announce;
pub mod events;
pub mod keymap;
pub mod supervisor;

pub use announce::{
    AnnounceError, Announcer, CommandAnnouncer, LogAnnouncer, SilentTones, Speaker, Tone,
    TonePlayer,
};
pub use events::{SessionEvent, SessionStatus};
pub use keymap::{KeyAction, KeyMap};
pub use supervisor::{
    launch, run, spawn_shell, PseudoTerminal, Session, SessionMode, SessionOptions, ShellProcess,
};
