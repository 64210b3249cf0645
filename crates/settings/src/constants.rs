//! Centralized configuration constants for Earshot.
//!
//! Compile-time defaults, organized by the component that consumes them.

/// History (buffer model) configuration.
pub mod history {
    /// Default number of entries kept in the main input/output history.
    pub const DEFAULT_CAPACITY: usize = 500;
    /// Default number of submitted commands kept in the command sub-buffer.
    pub const DEFAULT_COMMAND_CAPACITY: usize = 100;
    /// Smallest capacity accepted from the config file.
    pub const MIN_CAPACITY: usize = 10;
    /// Largest capacity accepted from the config file.
    pub const MAX_CAPACITY: usize = 10_000;
}

/// Reading overlay layout.
pub mod overlay {
    /// Columns a tab expands to when lines are navigated and rendered.
    pub const TAB_WIDTH: usize = 4;
    /// Width of the metadata column: sequence number, `IN`/`OUT` badge, `HH:MM:SS`.
    pub const METADATA_WIDTH: usize = 24;
    /// Rows reserved above the entry list.
    pub const HEADER_ROWS: usize = 1;
    /// Default cap on raw shell output queued while reading mode is active.
    pub const DEFAULT_PENDING_OUTPUT_LIMIT: usize = 4 * 1024 * 1024;
}

/// Keyboard input decoding.
pub mod input {
    use std::time::Duration;

    /// How long a partial escape sequence may wait for its remaining bytes.
    pub const DEFAULT_ESCAPE_TIMEOUT: Duration = Duration::from_millis(30);
    /// Upper bound for a configured escape timeout.
    pub const MAX_ESCAPE_TIMEOUT: Duration = Duration::from_millis(500);
    /// Default key that toggles reading mode.
    pub const DEFAULT_READING_MODE_KEY: &str = "f2";
    /// Default key that announces the last command's output summary.
    pub const DEFAULT_SUMMARY_KEY: &str = "f3";
    /// Default key that silences the current announcement.
    pub const DEFAULT_STOP_SPEECH_KEY: &str = "ctrl-space";
}

/// Announcement scheduling.
pub mod speech {
    use std::time::Duration;

    /// Delay between cancelling a prior announcement and starting the next.
    pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(50);
    /// Upper bound for a configured settle delay.
    pub const MAX_SETTLE_DELAY: Duration = Duration::from_millis(1000);
    /// Poll interval while waiting for a prior announcement to release the guard.
    pub const GUARD_POLL_INTERVAL: Duration = Duration::from_millis(5);
}

/// Shell spawning.
pub mod shell {
    /// Ordered fallback shells tried after the configured shell and `$SHELL`.
    #[cfg(not(target_os = "windows"))]
    pub const FALLBACK_CANDIDATES: &[&str] = &["/bin/zsh", "/bin/bash", "/bin/sh"];

    /// Ordered fallback shells tried after the configured shell.
    #[cfg(target_os = "windows")]
    pub const FALLBACK_CANDIDATES: &[&str] = &["pwsh.exe", "powershell.exe", "cmd.exe"];

    /// `TERM` value exported to the child shell.
    pub const TERM: &str = "xterm-256color";
}

/// Settings file validation limits.
pub mod settings {
    /// Maximum settings file size in bytes (64 KB).
    /// Settings files should be tiny; anything larger is suspicious.
    pub const MAX_FILE_SIZE: u64 = 64 * 1024;

    /// Maximum length for string fields (shell path, key names, commands).
    pub const MAX_STRING_LENGTH: usize = 256;
}
