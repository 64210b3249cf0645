//! Keyboard input decoding.
//!
//! Hosts deliver keystrokes as raw terminal bytes, and a single key may
//! arrive split across several reads (`ESC` in one, `[D` in the next). The
//! [`KeyDecoder`] is a small VT input state machine that aggregates those
//! pieces. A partial sequence carries an expiry deadline: once it passes, a
//! lone `ESC` is reported as the Escape key and any other fragment is
//! discarded.
//!
//! Every decoded key keeps the exact bytes it came from so that keys the
//! session does not consume can be forwarded to the shell unchanged.

use std::time::{Duration, Instant};
use termwiz::input::{KeyCode, Modifiers};

const ESC: u8 = 0x1b;

/// Longest escape sequence we are willing to buffer.
const MAX_SEQUENCE_LEN: usize = 32;

/// A key recognised by the decoder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedKey {
    pub key: KeyCode,
    pub modifiers: Modifiers,
    /// The bytes this key was decoded from.
    pub raw: Vec<u8>,
}

impl DecodedKey {
    fn new(key: KeyCode, modifiers: Modifiers, raw: Vec<u8>) -> Self {
        Self {
            key,
            modifiers,
            raw,
        }
    }

    /// Whether this key equals a chord from [`parse_key_chord`].
    pub fn matches(&self, chord: &(KeyCode, Modifiers)) -> bool {
        self.key == chord.0 && self.modifiers == chord.1
    }

    /// Printable text this key inserts on a shell command line, if any.
    pub fn text(&self) -> Option<char> {
        match self.key {
            KeyCode::Char(c) if self.modifiers == Modifiers::NONE && !c.is_control() => Some(c),
            _ => None,
        }
    }
}

/// Output of the decoder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decoded {
    Key(DecodedKey),
    /// A complete sequence with no key mapping (for example F5 or a focus
    /// report); forwarded to the shell untouched.
    Unrecognized(Vec<u8>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Ground,
    /// After `ESC` (or `ESC ESC`).
    Escape,
    /// Inside `ESC [`.
    Csi,
    /// Inside `ESC O`.
    Ss3,
    /// Inside a multi-byte UTF-8 character.
    Utf8 { remaining: usize },
}

/// Incremental decoder from raw input bytes to keys.
#[derive(Debug)]
pub struct KeyDecoder {
    state: State,
    pending: Vec<u8>,
    deadline: Option<Instant>,
    timeout: Duration,
}

impl KeyDecoder {
    pub fn new(timeout: Duration) -> Self {
        Self {
            state: State::Ground,
            pending: Vec::with_capacity(MAX_SEQUENCE_LEN),
            deadline: None,
            timeout,
        }
    }

    /// When the current partial sequence expires, if one is pending.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Whether a partial sequence is buffered.
    pub fn is_pending(&self) -> bool {
        self.state != State::Ground
    }

    /// Decode `bytes` received at `now`.
    pub fn feed(&mut self, bytes: &[u8], now: Instant) -> Vec<Decoded> {
        let mut out = self.expire(now);
        for &byte in bytes {
            self.advance(byte, now, &mut out);
        }
        out
    }

    /// Resolve a partial sequence whose deadline has passed.
    pub fn expire(&mut self, now: Instant) -> Vec<Decoded> {
        match self.deadline {
            Some(deadline) if now >= deadline => {}
            _ => return Vec::new(),
        }
        let pending = self.reset();
        let mut out = Vec::new();
        if !pending.is_empty() && pending.iter().all(|&b| b == ESC) {
            for _ in &pending {
                out.push(Decoded::Key(DecodedKey::new(
                    KeyCode::Escape,
                    Modifiers::NONE,
                    vec![ESC],
                )));
            }
        } else if !pending.is_empty() {
            tracing::debug!(bytes = ?pending, "Discarding incomplete input sequence");
        }
        out
    }

    fn reset(&mut self) -> Vec<u8> {
        self.state = State::Ground;
        self.deadline = None;
        std::mem::take(&mut self.pending)
    }

    fn begin(&mut self, state: State, byte: u8, now: Instant) {
        self.state = state;
        self.pending.clear();
        self.pending.push(byte);
        self.deadline = Some(now + self.timeout);
    }

    fn advance(&mut self, byte: u8, now: Instant, out: &mut Vec<Decoded>) {
        match self.state {
            State::Ground => self.ground(byte, now, out),
            State::Escape => self.escape(byte, now, out),
            State::Csi => self.csi(byte, now, out),
            State::Ss3 => self.ss3(byte, now, out),
            State::Utf8 { remaining } => self.utf8(byte, remaining, now, out),
        }
    }

    fn ground(&mut self, byte: u8, now: Instant, out: &mut Vec<Decoded>) {
        let key = match byte {
            ESC => {
                self.begin(State::Escape, byte, now);
                return;
            }
            b'\r' | b'\n' => (KeyCode::Enter, Modifiers::NONE),
            b'\t' => (KeyCode::Tab, Modifiers::NONE),
            0x7f | 0x08 => (KeyCode::Backspace, Modifiers::NONE),
            0x00 => (KeyCode::Char(' '), Modifiers::CTRL),
            0x01..=0x1a => (KeyCode::Char((byte + 0x60) as char), Modifiers::CTRL),
            0x1c..=0x1f => (KeyCode::Char((byte + 0x40) as char), Modifiers::CTRL),
            0x20..=0x7e => (KeyCode::Char(byte as char), Modifiers::NONE),
            _ => {
                match utf8_len(byte) {
                    Some(len) => self.begin(State::Utf8 { remaining: len - 1 }, byte, now),
                    None => out.push(Decoded::Unrecognized(vec![byte])),
                }
                return;
            }
        };
        out.push(Decoded::Key(DecodedKey::new(key.0, key.1, vec![byte])));
    }

    fn escape(&mut self, byte: u8, now: Instant, out: &mut Vec<Decoded>) {
        match byte {
            b'[' => {
                self.pending.push(byte);
                self.state = State::Csi;
            }
            b'O' if self.pending.len() == 1 => {
                self.pending.push(byte);
                self.state = State::Ss3;
            }
            ESC if self.pending.len() == 1 => {
                // ESC ESC [ D is how some terminals send Alt+arrow.
                self.pending.push(byte);
            }
            b'b' | b'f' if self.pending.len() == 1 => {
                // Option+arrow on macOS terminals using "Esc+" meta.
                let key = if byte == b'b' {
                    KeyCode::LeftArrow
                } else {
                    KeyCode::RightArrow
                };
                let raw = self.finish(byte);
                out.push(Decoded::Key(DecodedKey::new(key, Modifiers::ALT, raw)));
            }
            0x20..=0x7e if self.pending.len() == 1 => {
                let raw = self.finish(byte);
                out.push(Decoded::Key(DecodedKey::new(
                    KeyCode::Char(byte as char),
                    Modifiers::ALT,
                    raw,
                )));
            }
            _ => {
                // Not a sequence: report the escapes, then reprocess the byte.
                let pending = self.reset();
                for _ in pending {
                    out.push(Decoded::Key(DecodedKey::new(
                        KeyCode::Escape,
                        Modifiers::NONE,
                        vec![ESC],
                    )));
                }
                self.ground(byte, now, out);
            }
        }
    }

    fn csi(&mut self, byte: u8, now: Instant, out: &mut Vec<Decoded>) {
        match byte {
            0x20..=0x3f => {
                self.pending.push(byte);
                if self.pending.len() > MAX_SEQUENCE_LEN {
                    let dropped = self.reset();
                    tracing::debug!(len = dropped.len(), "Discarding oversized CSI sequence");
                }
            }
            0x40..=0x7e => {
                let raw = self.finish(byte);
                out.push(decode_csi(raw));
            }
            _ => {
                let dropped = self.reset();
                tracing::debug!(bytes = ?dropped, "Discarding malformed CSI sequence");
                self.ground(byte, now, out);
            }
        }
    }

    fn ss3(&mut self, byte: u8, now: Instant, out: &mut Vec<Decoded>) {
        if !(0x40..=0x7e).contains(&byte) {
            let dropped = self.reset();
            tracing::debug!(bytes = ?dropped, "Discarding malformed SS3 sequence");
            self.ground(byte, now, out);
            return;
        }
        let raw = self.finish(byte);
        let key = match byte {
            b'A' => Some(KeyCode::UpArrow),
            b'B' => Some(KeyCode::DownArrow),
            b'C' => Some(KeyCode::RightArrow),
            b'D' => Some(KeyCode::LeftArrow),
            b'H' => Some(KeyCode::Home),
            b'F' => Some(KeyCode::End),
            b'M' => Some(KeyCode::Enter),
            b'P' => Some(KeyCode::Function(1)),
            b'Q' => Some(KeyCode::Function(2)),
            b'R' => Some(KeyCode::Function(3)),
            b'S' => Some(KeyCode::Function(4)),
            _ => None,
        };
        out.push(match key {
            Some(key) => Decoded::Key(DecodedKey::new(key, Modifiers::NONE, raw)),
            None => Decoded::Unrecognized(raw),
        });
    }

    fn utf8(&mut self, byte: u8, remaining: usize, now: Instant, out: &mut Vec<Decoded>) {
        if byte & 0xc0 != 0x80 {
            let dropped = self.reset();
            out.push(Decoded::Unrecognized(dropped));
            self.ground(byte, now, out);
            return;
        }
        self.pending.push(byte);
        if remaining > 1 {
            self.state = State::Utf8 {
                remaining: remaining - 1,
            };
            return;
        }
        let raw = self.reset();
        match std::str::from_utf8(&raw).ok().and_then(|s| s.chars().next()) {
            Some(c) => out.push(Decoded::Key(DecodedKey::new(
                KeyCode::Char(c),
                Modifiers::NONE,
                raw,
            ))),
            None => out.push(Decoded::Unrecognized(raw)),
        }
    }

    /// Append the final byte and return the whole sequence.
    fn finish(&mut self, byte: u8) -> Vec<u8> {
        self.pending.push(byte);
        self.reset()
    }
}

fn utf8_len(lead: u8) -> Option<usize> {
    match lead {
        0xc2..=0xdf => Some(2),
        0xe0..=0xef => Some(3),
        0xf0..=0xf4 => Some(4),
        _ => None,
    }
}

/// Decode a complete `[ESC] ESC [ params final` sequence.
fn decode_csi(raw: Vec<u8>) -> Decoded {
    let alt_prefix = raw.len() > 2 && raw[1] == ESC;
    let body_start = if alt_prefix { 3 } else { 2 };
    let Some((&final_byte, params)) = raw[body_start..].split_last() else {
        return Decoded::Unrecognized(raw);
    };
    let params = std::str::from_utf8(params).unwrap_or("");
    let mut fields = params.split(';');
    let first = fields.next().unwrap_or("");
    let mut modifiers = fields
        .next()
        .and_then(|m| m.parse::<u8>().ok())
        .map(xterm_modifiers)
        .unwrap_or(Modifiers::NONE);
    if alt_prefix {
        modifiers |= Modifiers::ALT;
    }

    let key = match final_byte {
        b'A' => Some(KeyCode::UpArrow),
        b'B' => Some(KeyCode::DownArrow),
        b'C' => Some(KeyCode::RightArrow),
        b'D' => Some(KeyCode::LeftArrow),
        b'H' => Some(KeyCode::Home),
        b'F' => Some(KeyCode::End),
        b'Z' => {
            modifiers |= Modifiers::SHIFT;
            Some(KeyCode::Tab)
        }
        b'~' => match first {
            "1" | "7" => Some(KeyCode::Home),
            "2" => Some(KeyCode::Insert),
            "3" => Some(KeyCode::Delete),
            "4" | "8" => Some(KeyCode::End),
            "5" => Some(KeyCode::PageUp),
            "6" => Some(KeyCode::PageDown),
            "11" => Some(KeyCode::Function(1)),
            "12" => Some(KeyCode::Function(2)),
            "13" => Some(KeyCode::Function(3)),
            "14" => Some(KeyCode::Function(4)),
            "15" => Some(KeyCode::Function(5)),
            _ => None,
        },
        _ => None,
    };

    match key {
        Some(key) => Decoded::Key(DecodedKey::new(key, modifiers, raw)),
        None => Decoded::Unrecognized(raw),
    }
}

/// xterm modifier parameter (`1 + bitmask`) to termwiz modifiers.
/// Meta (iTerm2 sends `9` for Option) is folded into Alt.
fn xterm_modifiers(param: u8) -> Modifiers {
    let mask = param.saturating_sub(1);
    let mut modifiers = Modifiers::NONE;
    if mask & 1 != 0 {
        modifiers |= Modifiers::SHIFT;
    }
    if mask & 2 != 0 || mask & 8 != 0 {
        modifiers |= Modifiers::ALT;
    }
    if mask & 4 != 0 {
        modifiers |= Modifiers::CTRL;
    }
    modifiers
}

/// Parse a key chord from config, e.g. `"f2"`, `"ctrl-r"`, `"alt-s"`.
pub fn parse_key_chord(chord: &str) -> Option<(KeyCode, Modifiers)> {
    let lowered = chord.trim().to_ascii_lowercase();
    let mut modifiers = Modifiers::NONE;
    let mut key = lowered.as_str();
    loop {
        if let Some(rest) = key.strip_prefix("ctrl-") {
            modifiers |= Modifiers::CTRL;
            key = rest;
        } else if let Some(rest) = key.strip_prefix("alt-") {
            modifiers |= Modifiers::ALT;
            key = rest;
        } else if let Some(rest) = key.strip_prefix("shift-") {
            modifiers |= Modifiers::SHIFT;
            key = rest;
        } else {
            break;
        }
    }

    let code = match key {
        "up" => KeyCode::UpArrow,
        "down" => KeyCode::DownArrow,
        "left" => KeyCode::LeftArrow,
        "right" => KeyCode::RightArrow,
        "home" => KeyCode::Home,
        "end" => KeyCode::End,
        "pageup" => KeyCode::PageUp,
        "pagedown" => KeyCode::PageDown,
        "insert" => KeyCode::Insert,
        "delete" => KeyCode::Delete,
        "tab" => KeyCode::Tab,
        "enter" => KeyCode::Enter,
        "escape" => KeyCode::Escape,
        "backspace" => KeyCode::Backspace,
        "space" => KeyCode::Char(' '),
        "f1" => KeyCode::Function(1),
        "f2" => KeyCode::Function(2),
        "f3" => KeyCode::Function(3),
        "f4" => KeyCode::Function(4),
        "f5" => KeyCode::Function(5),
        k if k.chars().count() == 1 => KeyCode::Char(k.chars().next()?),
        _ => return None,
    };
    Some((code, modifiers))
}
