//! Decides which keys the session consumes and which reach the shell.
//!
//! Outside reading mode almost everything belongs to the shell: only the
//! reading-mode, summary and stop-speech keys are taken. Inside reading mode
//! the navigation keys are taken as well.

use actions::NavigationAction;
use settings::constants::input::{
    DEFAULT_READING_MODE_KEY, DEFAULT_STOP_SPEECH_KEY, DEFAULT_SUMMARY_KEY,
};
use settings::Config;
use terminal::{parse_key_chord, DecodedKey};
use termwiz::input::{KeyCode, Modifiers};

/// What to do with a decoded key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyAction {
    /// Consumed by the session.
    Navigate(NavigationAction),
    /// Passed to the shell unchanged.
    Forward,
    /// The reading-mode key in a session that cannot navigate.
    NavigationUnavailable,
}

type Chord = (KeyCode, Modifiers);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyMap {
    reading_mode: Chord,
    summary: Chord,
    stop_speech: Chord,
}

impl Default for KeyMap {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

fn chord_or_default(configured: &str, default: &str, name: &str) -> Chord {
    parse_key_chord(configured)
        .or_else(|| {
            tracing::warn!(key = configured, "Unrecognised {name}, using {default}");
            parse_key_chord(default)
        })
        .unwrap_or((KeyCode::Function(2), Modifiers::NONE))
}

impl KeyMap {
    pub fn from_config(config: &Config) -> Self {
        Self {
            reading_mode: chord_or_default(
                &config.reading_mode_key,
                DEFAULT_READING_MODE_KEY,
                "reading-mode-key",
            ),
            summary: chord_or_default(&config.summary_key, DEFAULT_SUMMARY_KEY, "summary-key"),
            stop_speech: chord_or_default(
                &config.stop_speech_key,
                DEFAULT_STOP_SPEECH_KEY,
                "stop-speech-key",
            ),
        }
    }

    pub fn classify(&self, key: &DecodedKey, reading_active: bool, degraded: bool) -> KeyAction {
        if key.matches(&self.reading_mode) {
            return if degraded {
                KeyAction::NavigationUnavailable
            } else if reading_active {
                KeyAction::Navigate(NavigationAction::ExitReadingMode)
            } else {
                KeyAction::Navigate(NavigationAction::ToggleReadingMode)
            };
        }
        if degraded {
            return KeyAction::Forward;
        }
        if key.matches(&self.summary) {
            return KeyAction::Navigate(NavigationAction::Summarize);
        }
        if key.matches(&self.stop_speech) {
            return KeyAction::Navigate(NavigationAction::StopSpeech);
        }
        if !reading_active {
            return KeyAction::Forward;
        }

        let plain = key.modifiers == Modifiers::NONE;
        let alt = key.modifiers == Modifiers::ALT;
        let action = match key.key {
            KeyCode::UpArrow if plain => NavigationAction::LineUp,
            KeyCode::DownArrow if plain => NavigationAction::LineDown,
            KeyCode::LeftArrow if alt => NavigationAction::WordLeft,
            KeyCode::RightArrow if alt => NavigationAction::WordRight,
            KeyCode::LeftArrow if plain => NavigationAction::CharLeft,
            KeyCode::RightArrow if plain => NavigationAction::CharRight,
            KeyCode::Home if plain => NavigationAction::FirstLine,
            KeyCode::End if plain => NavigationAction::LastLine,
            KeyCode::PageUp if plain => NavigationAction::PageUp,
            KeyCode::PageDown if plain => NavigationAction::PageDown,
            KeyCode::Escape if plain => NavigationAction::ExitReadingMode,
            _ => return KeyAction::Forward,
        };
        KeyAction::Navigate(action)
    }
}
