//! TOML config file support.
//!
//! Config location: `~/.config/earshot/config.toml`

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants;

/// User-facing config parsed from TOML.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    /// Shell to spawn. Tried before `$SHELL` and the fallback candidates.
    pub shell: Option<String>,
    /// Extra shells tried, in order, after the configured shell and `$SHELL`.
    pub shell_candidates: Vec<String>,
    /// Working directory for the shell (defaults to the current directory).
    pub working_directory: Option<String>,
    /// Maximum number of entries in the input/output history.
    pub history_capacity: usize,
    /// Maximum number of submitted commands remembered.
    pub command_history_capacity: usize,
    /// Maximum bytes of shell output queued while reading mode is active.
    pub pending_output_limit: usize,
    /// Milliseconds a partial escape sequence may wait for more bytes.
    pub escape_timeout_ms: u64,
    /// Milliseconds between cancelling an announcement and starting the next.
    pub announce_delay_ms: u64,
    /// Key that toggles reading mode ("f1".."f4", "ctrl-x", "alt-x").
    pub reading_mode_key: String,
    /// Key that announces a summary of the last command's output.
    pub summary_key: String,
    /// Key that silences the current announcement.
    pub stop_speech_key: String,
    /// External command that speaks text passed as its final argument.
    pub speech_command: Option<Vec<String>>,
    /// Play non-speech tones around navigation events.
    pub tones: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            shell: None,
            shell_candidates: Vec::new(),
            working_directory: None,
            history_capacity: constants::history::DEFAULT_CAPACITY,
            command_history_capacity: constants::history::DEFAULT_COMMAND_CAPACITY,
            pending_output_limit: constants::overlay::DEFAULT_PENDING_OUTPUT_LIMIT,
            escape_timeout_ms: constants::input::DEFAULT_ESCAPE_TIMEOUT.as_millis() as u64,
            announce_delay_ms: constants::speech::DEFAULT_SETTLE_DELAY.as_millis() as u64,
            reading_mode_key: constants::input::DEFAULT_READING_MODE_KEY.to_string(),
            summary_key: constants::input::DEFAULT_SUMMARY_KEY.to_string(),
            stop_speech_key: constants::input::DEFAULT_STOP_SPEECH_KEY.to_string(),
            speech_command: None,
            tones: true,
        }
    }
}

impl Config {
    /// Clamp numeric fields into supported ranges and drop oversized strings.
    pub fn sanitized(mut self) -> Self {
        use constants::history::{MAX_CAPACITY, MIN_CAPACITY};
        use constants::settings::MAX_STRING_LENGTH;

        self.history_capacity = self.history_capacity.clamp(MIN_CAPACITY, MAX_CAPACITY);
        self.command_history_capacity = self
            .command_history_capacity
            .clamp(MIN_CAPACITY, MAX_CAPACITY);
        self.pending_output_limit = self.pending_output_limit.max(64 * 1024);
        self.escape_timeout_ms = self
            .escape_timeout_ms
            .clamp(1, constants::input::MAX_ESCAPE_TIMEOUT.as_millis() as u64);
        self.announce_delay_ms = self
            .announce_delay_ms
            .min(constants::speech::MAX_SETTLE_DELAY.as_millis() as u64);

        if self
            .shell
            .as_ref()
            .is_some_and(|shell| shell.is_empty() || shell.len() > MAX_STRING_LENGTH)
        {
            tracing::warn!("Ignoring invalid shell setting");
            self.shell = None;
        }
        self.shell_candidates
            .retain(|shell| !shell.is_empty() && shell.len() <= MAX_STRING_LENGTH);
        if self.reading_mode_key.len() > MAX_STRING_LENGTH {
            self.reading_mode_key = constants::input::DEFAULT_READING_MODE_KEY.to_string();
        }
        if self.summary_key.len() > MAX_STRING_LENGTH {
            self.summary_key = constants::input::DEFAULT_SUMMARY_KEY.to_string();
        }
        if self.stop_speech_key.len() > MAX_STRING_LENGTH {
            self.stop_speech_key = constants::input::DEFAULT_STOP_SPEECH_KEY.to_string();
        }
        if self
            .speech_command
            .as_ref()
            .is_some_and(|command| command.is_empty())
        {
            self.speech_command = None;
        }
        self
    }

    /// Escape sequence timeout as a `Duration`.
    pub fn escape_timeout(&self) -> Duration {
        Duration::from_millis(self.escape_timeout_ms)
    }

    /// Announcement settle delay as a `Duration`.
    pub fn announce_delay(&self) -> Duration {
        Duration::from_millis(self.announce_delay_ms)
    }

    /// Ordered list of shells to try when spawning.
    ///
    /// Configured shell first, then `$SHELL`, then extra candidates, then the
    /// platform fallbacks. Duplicates are removed, keeping the first position.
    pub fn shell_candidates_with_env(&self, env_shell: Option<String>) -> Vec<String> {
        let mut ordered: Vec<String> = Vec::new();
        let configured = self.shell.iter().cloned();
        let extra = self.shell_candidates.iter().cloned();
        let fallbacks = constants::shell::FALLBACK_CANDIDATES
            .iter()
            .map(|shell| shell.to_string());

        for shell in configured.chain(env_shell).chain(extra).chain(fallbacks) {
            if !shell.is_empty() && !ordered.contains(&shell) {
                ordered.push(shell);
            }
        }
        ordered
    }
}

/// Default config file content with comments (generated on first launch).
const DEFAULT_CONFIG: &str = r#"# Earshot Configuration

# Shell to spawn (falls back to $SHELL, then /bin/zsh, /bin/bash, /bin/sh)
# shell = "/bin/bash"

# Additional shells to try, in order, if the ones above fail to start
# shell-candidates = ["/usr/local/bin/fish"]

# Working directory for new sessions
# working-directory = "~/projects"

# Number of captured lines kept for navigation
history-capacity = 500

# Number of submitted commands remembered
command-history-capacity = 100

# Bytes of shell output held back while reading mode is open
# pending-output-limit = 4194304

# How long (ms) to wait for the rest of a split escape sequence
escape-timeout-ms = 30

# Pause (ms) between interrupting speech and starting the next announcement
announce-delay-ms = 50

# Key that opens and closes reading mode: f1..f4, ctrl-<letter>, alt-<letter>
reading-mode-key = "f2"

# Key that summarizes errors and warnings in the last command's output
summary-key = "f3"

# Key that silences the current announcement
stop-speech-key = "ctrl-space"

# External program used to speak announcements; the text is appended as the last argument
# speech-command = ["espeak", "-s", "220"]

# Play short tones for boundaries and mode changes
tones = true
"#;

/// Return the config file path.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("earshot").join("config.toml"))
}

/// Ensure the config file exists, creating a default if missing.
/// Returns the path to the config file.
pub fn ensure_config_file() -> Option<PathBuf> {
    let path = config_path()?;
    if !path.exists() {
        let parent = path.parent()?;
        std::fs::create_dir_all(parent).ok()?;
        std::fs::write(&path, DEFAULT_CONFIG).ok()?;
        tracing::info!("Created default config at {:?}", path);
    }
    Some(path)
}

/// Load and parse the config file. Returns default on any error.
pub fn load_config() -> Config {
    match config_path() {
        Some(path) => load_config_from(&path),
        None => Config::default(),
    }
}

/// Load and parse a specific config file. Returns default on any error.
pub fn load_config_from(path: &Path) -> Config {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("Failed to read config: {}", e);
            }
            return Config::default();
        }
    };

    // Size guard
    if content.len() > constants::settings::MAX_FILE_SIZE as usize {
        tracing::warn!(
            "Config file too large ({} bytes), using defaults",
            content.len()
        );
        return Config::default();
    }

    match toml::from_str::<Config>(&content) {
        Ok(cfg) => cfg.sanitized(),
        Err(e) => {
            tracing::warn!("Failed to parse config.toml: {}", e);
            Config::default()
        }
    }
}
