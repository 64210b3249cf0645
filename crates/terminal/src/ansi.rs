//! Escape-sequence normalization and display width.
//!
//! Stripping runs the same VT state machine alacritty uses (`vte`), so any
//! sequence a real terminal would swallow is swallowed here too, including
//! malformed or unterminated ones. Only printable text, tabs and newlines
//! survive; cursor-forward moves become spaces so column-aligned output keeps
//! its word boundaries.
//!
//! Width follows `unicode-width`: wide (East-Asian) characters take two
//! cells, control and zero-width characters none.

use alacritty_terminal::vte::{Params, Parser, Perform};
use unicode_width::UnicodeWidthChar;

/// Marker appended to text truncated by [`pad_to_exact_width`].
pub const ELLIPSIS: char = '…';

/// Upper bound on spaces produced for a single cursor-forward sequence.
const MAX_CURSOR_FORWARD: u16 = 512;

/// Collects the printable content seen by the VT parser.
struct PlainText {
    out: String,
}

impl Perform for PlainText {
    fn print(&mut self, c: char) {
        self.out.push(c);
    }

    fn execute(&mut self, byte: u8) {
        match byte {
            b'\t' => self.out.push('\t'),
            b'\n' => self.out.push('\n'),
            _ => {}
        }
    }

    fn csi_dispatch(&mut self, params: &Params, intermediates: &[u8], ignore: bool, action: char) {
        // CSI n C (cursor forward) is how some programs emit runs of blanks.
        if action != 'C' || ignore || !intermediates.is_empty() {
            return;
        }
        let count = params
            .iter()
            .next()
            .and_then(|param| param.first().copied())
            .unwrap_or(1)
            .clamp(1, MAX_CURSOR_FORWARD);
        self.out.push_str(&" ".repeat(count as usize));
    }
}

/// Remove escape and control sequences from `text`.
///
/// Never fails: unmatched introducers and truncated sequences are dropped.
pub fn strip(text: &str) -> String {
    if !text.bytes().any(|b| b < 0x20 || b == 0x7f) {
        return text.to_string();
    }
    let mut parser = Parser::new();
    let mut plain = PlainText {
        out: String::with_capacity(text.len()),
    };
    parser.advance(&mut plain, text.as_bytes());
    plain.out
}

/// Display width of a single character in terminal cells.
pub fn char_width(c: char) -> usize {
    UnicodeWidthChar::width(c).unwrap_or(0)
}

/// Display width of `text` in terminal cells.
pub fn visual_width(text: &str) -> usize {
    text.chars().map(char_width).sum()
}

/// Expand tabs to the next multiple of `tab_width` columns.
pub fn expand_tabs(text: &str, tab_width: usize) -> String {
    if !text.contains('\t') || tab_width == 0 {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len() + tab_width * 2);
    let mut column = 0;
    for c in text.chars() {
        if c == '\t' {
            let spaces = tab_width - (column % tab_width);
            out.push_str(&" ".repeat(spaces));
            column += spaces;
        } else {
            out.push(c);
            column += 1;
        }
    }
    out
}

/// Take the longest prefix of `text` that fits in `width` cells, padding
/// with spaces when a wide character would straddle the limit.
pub fn truncate_to_width(text: &str, width: usize) -> String {
    let mut out = String::new();
    let mut used = 0;
    for c in text.chars() {
        let w = char_width(c);
        if used + w > width {
            break;
        }
        out.push(c);
        used += w;
    }
    out.push_str(&" ".repeat(width - used));
    out
}

/// Fit `text` into exactly `width` cells.
///
/// Escape sequences are stripped first since cutting through one is unsafe.
/// Over-length text keeps `width - 1` cells followed by [`ELLIPSIS`];
/// under-length text is padded with spaces. The result always satisfies
/// `visual_width(result) == width`.
pub fn pad_to_exact_width(text: &str, width: usize) -> String {
    if width == 0 {
        return String::new();
    }
    let plain: String = strip(text).chars().filter(|c| !c.is_control()).collect();
    let current = visual_width(&plain);
    if current <= width {
        let mut out = plain;
        out.push_str(&" ".repeat(width - current));
        return out;
    }
    let mut out = truncate_to_width(&plain, width - 1);
    out.push(ELLIPSIS);
    out
}
