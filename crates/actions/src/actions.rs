//! Shared action definitions for Earshot.
//!
//! Every reading-mode command is defined here so the key map, the session
//! controller and the host binary agree on one vocabulary without depending
//! on each other.

use std::fmt;

/// A navigation or reading-mode command.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NavigationAction {
    // Line movement
    LineUp,
    LineDown,
    FirstLine,
    LastLine,
    PageUp,
    PageDown,

    // Word and character movement within the current line
    WordLeft,
    WordRight,
    CharLeft,
    CharRight,

    // Mode and speech
    ToggleReadingMode,
    ExitReadingMode,
    Summarize,
    StopSpeech,
}

impl NavigationAction {
    /// Stable kebab-case name, used in logs.
    pub fn name(self) -> &'static str {
        match self {
            Self::LineUp => "line-up",
            Self::LineDown => "line-down",
            Self::FirstLine => "first-line",
            Self::LastLine => "last-line",
            Self::PageUp => "page-up",
            Self::PageDown => "page-down",
            Self::WordLeft => "word-left",
            Self::WordRight => "word-right",
            Self::CharLeft => "char-left",
            Self::CharRight => "char-right",
            Self::ToggleReadingMode => "toggle-reading-mode",
            Self::ExitReadingMode => "exit-reading-mode",
            Self::Summarize => "summarize",
            Self::StopSpeech => "stop-speech",
        }
    }

    /// Whether the action moves the reading cursor.
    pub fn is_movement(self) -> bool {
        !matches!(
            self,
            Self::ToggleReadingMode | Self::ExitReadingMode | Self::Summarize | Self::StopSpeech
        )
    }
}

impl fmt::Display for NavigationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
