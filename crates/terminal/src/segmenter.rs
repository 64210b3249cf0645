//! Assembles complete logical lines from arbitrarily chunked PTY output.
//!
//! Chunks are accumulated as bytes and only split on `\r` / `\n`, which never
//! occur inside a multi-byte UTF-8 character, so a character split across two
//! reads is reassembled before decoding.
//!
//! Completed lines are classified before they leave the segmenter. Shell
//! prompts and the shell's echo of a command line are dropped here and are
//! not retained anywhere: the history only ever sees program output. A
//! prompt-looking program line (for example one ending in `%` or `>`) is lost
//! the same way; that trade-off is accepted to keep navigation free of prompt
//! noise.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::ansi;

/// Longest line still considered a plausible command echo.
const MAX_ECHO_LEN: usize = 256;

/// Characters that end a bare prompt (`user@host:~$`, `%`, `PS C:\>`).
const PROMPT_TERMINATORS: &[char] = &['@', '#', '$', '%', '>', '❯'];

/// Prompt shapes followed by a typed command on the same line.
static PROMPT_WITH_COMMAND: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        // user@host:~/dir$ cmd
        r"^[\w.+-]+@[\w.-]+:\S*\s?[$#%>]\s",
        // [user@host dir]$ cmd
        r"^\[[^\]]*@[^\]]*\]\s?[$#%>]\s",
        // PS C:\Users\me> cmd
        r"^PS [A-Za-z]:\\[^>]*>\s",
        // C:\Users\me>cmd
        r"^[A-Za-z]:\\[^>]*>\S",
        // ➜  dir git:(main) cmd / ❯ cmd
        r"^[➜❯]\s+\S",
        // $ cmd  # cmd  > cmd
        r"^[$#%>]\s+\S",
    ]
    .iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
});

/// Prompt lines without a trailing marker: host/path headers of two-line prompts.
static PROMPT_HEADER_SHAPES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        // user@host ~/projects  /  user@host:/srv
        r"^[\w.+-]+@[\w.-]+:?\s*[~/][^\s]*$",
        // ┌──(user㉿host)-[~/dir]
        r"^┌──\(.*\)-\[.*\]$",
    ]
    .iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
});

/// The shape of a line recognised as a shell prompt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PromptKind {
    /// Ends in a prompt marker with nothing typed after it.
    Bare,
    /// Host/path header of a two-line prompt; the command line follows.
    Header,
    /// A prompt with the typed command on the same line.
    WithCommand,
}

/// What a completed line turned out to be.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LineClass {
    /// Program output; reaches the history.
    Content,
    Prompt(PromptKind),
    /// The shell echoing back the command line that was just entered.
    Echo,
}

/// Whether the next line is expected to be the shell's echo of a command.
#[derive(Clone, Debug, PartialEq, Eq)]
enum EchoExpectation {
    Disarmed,
    /// Armed, optionally knowing the exact command text that was submitted.
    Armed(Option<String>),
}

/// Splits a PTY byte stream into stripped, classified lines.
#[derive(Debug)]
pub struct LineSegmenter {
    carry: Vec<u8>,
    echo: EchoExpectation,
}

impl Default for LineSegmenter {
    fn default() -> Self {
        Self::new()
    }
}

impl LineSegmenter {
    /// A fresh segmenter. The first line of a session is treated as a possible
    /// command echo since the shell may not have printed a prompt line yet.
    pub fn new() -> Self {
        Self {
            carry: Vec::new(),
            echo: EchoExpectation::Armed(None),
        }
    }

    /// Feed a chunk and return the content lines it completed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.carry.extend_from_slice(chunk);

        let Some(last_terminator) = self.carry.iter().rposition(|&b| is_terminator(b)) else {
            return Vec::new();
        };

        let rest = self.carry.split_off(last_terminator + 1);
        let complete = std::mem::replace(&mut self.carry, rest);

        let mut lines = Vec::new();
        for raw in complete.split(|&b| is_terminator(b)) {
            if raw.is_empty() {
                continue;
            }
            let decoded = String::from_utf8_lossy(raw);
            let stripped = ansi::strip(&decoded);
            let line = stripped.trim_end();
            if line.trim().is_empty() {
                continue;
            }
            match self.classify(line) {
                LineClass::Content => lines.push(line.to_string()),
                class => tracing::trace!(?class, line, "Dropped non-content line"),
            }
        }
        lines
    }

    /// Expect the next line to be the echo of a just-submitted command.
    pub fn expect_echo(&mut self, command: Option<String>) {
        self.echo = EchoExpectation::Armed(command.filter(|c| !c.trim().is_empty()));
    }

    /// Bytes received after the last line terminator.
    pub fn pending(&self) -> &[u8] {
        &self.carry
    }

    /// Classify one stripped line, updating the echo expectation.
    fn classify(&mut self, line: &str) -> LineClass {
        if let Some(kind) = prompt_kind(line) {
            // Only a two-line prompt header puts the typed command on the next
            // line. A marker-terminated line that was completed had nothing
            // typed after it, so whatever follows is output.
            self.echo = match kind {
                PromptKind::Header => EchoExpectation::Armed(None),
                PromptKind::Bare | PromptKind::WithCommand => EchoExpectation::Disarmed,
            };
            return LineClass::Prompt(kind);
        }

        let expectation = std::mem::replace(&mut self.echo, EchoExpectation::Disarmed);
        match expectation {
            EchoExpectation::Armed(Some(command)) if is_echo_of(line, &command) => LineClass::Echo,
            EchoExpectation::Armed(None) if looks_like_command(line) => LineClass::Echo,
            _ => LineClass::Content,
        }
    }
}

fn is_terminator(byte: u8) -> bool {
    byte == b'\r' || byte == b'\n'
}

/// The prompt shape of `line`, or `None` for anything else.
pub fn prompt_kind(line: &str) -> Option<PromptKind> {
    let trimmed = line.trim();
    if trimmed.ends_with(PROMPT_TERMINATORS) {
        return Some(PromptKind::Bare);
    }
    if PROMPT_WITH_COMMAND.iter().any(|re| re.is_match(trimmed)) {
        return Some(PromptKind::WithCommand);
    }
    if PROMPT_HEADER_SHAPES.iter().any(|re| re.is_match(trimmed)) {
        return Some(PromptKind::Header);
    }
    None
}

fn is_echo_of(line: &str, command: &str) -> bool {
    let line = line.trim();
    let command = command.trim();
    line == command || line.ends_with(command)
}

fn looks_like_command(line: &str) -> bool {
    !line.starts_with(char::is_whitespace) && line.chars().count() <= MAX_ECHO_LEN
}
