//! Reading mode screen.
//!
//! While reading mode is active the real screen is switched to the
//! alternate buffer and replaced by a rendered view of the history: a header
//! row, then one row per entry with a metadata column and the content. Live
//! shell output is held in [`ReadingModeState`] and written back verbatim on
//! exit, so the shell's own screen is never disturbed.
//!
//! Every row is exactly as wide as the terminal. Styling is plain SGR so the
//! frame works on any VT100-compatible host.

use std::collections::VecDeque;
use std::fmt::Write as _;
use std::ops::Range;

use settings::constants::overlay::{DEFAULT_PENDING_OUTPUT_LIMIT, HEADER_ROWS, METADATA_WIDTH};
use terminal::ansi::{self, char_width, ELLIPSIS};
use terminal::TerminalDimensions;

use crate::history::History;
use crate::navigator::{display_chars, highlight_range, Cursor};
use crate::words::{word_ranges, WordRange};

/// Narrowest content column kept alongside the metadata column.
const MIN_CONTENT_WIDTH: usize = 16;

const RESET: &str = "\x1b[0m";
const HEADER_STYLE: &str = "\x1b[7m";
const ACTIVE_ROW_STYLE: &str = "\x1b[1;97;44m";
const HIGHLIGHT_ON: &str = "\x1b[7m";
const HIGHLIGHT_OFF: &str = "\x1b[27m";
const METADATA_STYLE: &str = "\x1b[2m";

/// Switch to the alternate screen and hide the cursor.
pub const ENTER_ALT_SCREEN: &[u8] = b"\x1b[?1049h\x1b[?25l";
/// Show the cursor and return to the normal screen.
pub const LEAVE_ALT_SCREEN: &[u8] = b"\x1b[?25h\x1b[?1049l";

const HINTS: &str = "Up/Down line  Alt+Left/Right word  Left/Right char  Home/End  PgUp/PgDn  Esc exit";

/// A rendered reading-mode screen.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub dimensions: TerminalDimensions,
    /// Styled rows, each exactly `dimensions.columns` cells wide.
    pub rows: Vec<String>,
    /// History indices shown in the body.
    pub window: Range<usize>,
}

impl Frame {
    /// Escape sequence that paints the frame with absolute positioning.
    pub fn to_ansi(&self) -> String {
        let mut out = String::new();
        for (i, row) in self.rows.iter().enumerate() {
            let _ = write!(out, "\x1b[{};1H{row}", i + 1);
        }
        out
    }
}

/// Rows of `len` entries to show in `body_rows` rows, centered on `cursor`.
pub fn visible_window(len: usize, cursor: usize, body_rows: usize) -> Range<usize> {
    if len == 0 || body_rows == 0 {
        return 0..0;
    }
    if len <= body_rows {
        return 0..len;
    }
    let cursor = cursor.min(len - 1);
    let start = cursor.saturating_sub(body_rows / 2).min(len - body_rows);
    start..start + body_rows
}

/// Render the reading screen for `history` with `cursor` active.
///
/// `pending` is the number of queued output chunks shown in the header.
pub fn render(
    history: &History,
    cursor: &Cursor,
    dimensions: TerminalDimensions,
    pending: usize,
) -> Frame {
    let dimensions = dimensions.or_default_if_empty();
    let columns = dimensions.columns as usize;
    let body_rows = (dimensions.rows as usize).saturating_sub(HEADER_ROWS);
    let window = visible_window(history.len(), cursor.line_index, body_rows);

    let mut rows = Vec::with_capacity(dimensions.rows as usize);
    rows.push(header(history.len(), &window, pending, columns));

    let show_metadata = columns >= METADATA_WIDTH + MIN_CONTENT_WIDTH;
    let content_width = if show_metadata {
        columns - METADATA_WIDTH
    } else {
        columns
    };

    for (index, entry) in history.window(window.clone()) {
        let active = index == cursor.line_index;
        let mut row = String::new();
        if active {
            row.push_str(ACTIVE_ROW_STYLE);
        }
        if show_metadata {
            let metadata = format!(
                "{:>7} {:<3} {} ",
                history.sequence_number(index),
                entry.kind.badge(),
                entry.captured_at.format("%H:%M:%S"),
            );
            let metadata = ansi::pad_to_exact_width(&metadata, METADATA_WIDTH);
            if active {
                row.push_str(&metadata);
            } else {
                row.push_str(METADATA_STYLE);
                row.push_str(&metadata);
                row.push_str(RESET);
            }
        }

        let chars = display_chars(&entry.content);
        let highlight = if active {
            let words = word_ranges(&chars);
            highlight_range(cursor, Some(&words))
        } else {
            None
        };
        row.push_str(&content_cell(&chars, highlight, content_width));
        row.push_str(RESET);
        rows.push(row);
    }

    while rows.len() < dimensions.rows as usize {
        rows.push(" ".repeat(columns));
    }

    Frame {
        dimensions,
        rows,
        window,
    }
}

fn header(len: usize, window: &Range<usize>, pending: usize, columns: usize) -> String {
    let range = if window.is_empty() {
        format!("0 of {len}")
    } else {
        format!("{}-{} of {len}", window.start + 1, window.end)
    };
    let mut text = format!(" READING  {range}");
    if pending > 0 {
        let _ = write!(text, "  {pending} pending");
    }
    let _ = write!(text, "  {HINTS}");
    format!(
        "{HEADER_STYLE}{}{RESET}",
        ansi::pad_to_exact_width(&text, columns)
    )
}

/// Fit `chars` into exactly `width` cells, scrolling horizontally when the
/// highlight would fall past the right edge.
fn content_cell(chars: &[char], highlight: Option<WordRange>, width: usize) -> String {
    if width == 0 {
        return String::new();
    }

    let total: usize = chars.iter().copied().map(char_width).sum();
    let mut offset = 0;
    let mut lead_ellipsis = false;
    if let Some(range) = highlight.filter(|_| total > width) {
        let end = range.end.min(chars.len());
        let through_highlight: usize = chars[..end].iter().copied().map(char_width).sum();
        // Keep one cell for the trailing ellipsis when text continues.
        let limit = width.saturating_sub(1).max(1);
        if through_highlight > limit {
            lead_ellipsis = true;
            let budget = limit.saturating_sub(1);
            let mut used: usize = chars[range.start.min(end)..end]
                .iter()
                .copied()
                .map(char_width)
                .sum();
            offset = range.start.min(end);
            while offset > 0 {
                let w = char_width(chars[offset - 1]);
                if used + w > budget {
                    break;
                }
                used += w;
                offset -= 1;
            }
        }
    }

    let mut cells: Vec<(char, bool)> = Vec::with_capacity(width + 1);
    if lead_ellipsis {
        cells.push((ELLIPSIS, false));
    }
    for (i, &c) in chars.iter().enumerate().skip(offset) {
        cells.push((c, highlight.is_some_and(|r| r.contains(i))));
    }

    let visible: usize = cells.iter().map(|&(c, _)| char_width(c)).sum();
    let (cells, pad) = if visible > width {
        let mut kept = Vec::with_capacity(cells.len());
        let mut used = 0;
        for (c, on) in cells {
            let w = char_width(c);
            if used + w > width - 1 {
                break;
            }
            used += w;
            kept.push((c, on));
        }
        let padding = width - 1 - used;
        for _ in 0..padding {
            kept.push((' ', false));
        }
        kept.push((ELLIPSIS, false));
        (kept, 0)
    } else {
        (cells, width - visible)
    };

    let mut out = String::with_capacity(width + 16);
    let mut on = false;
    for (c, highlighted) in cells {
        if highlighted != on {
            out.push_str(if highlighted { HIGHLIGHT_ON } else { HIGHLIGHT_OFF });
            on = highlighted;
        }
        out.push(c);
    }
    if on {
        out.push_str(HIGHLIGHT_OFF);
    }
    out.push_str(&" ".repeat(pad));
    out
}

/// Reading mode flags plus live output held back while the overlay is up.
#[derive(Debug)]
pub struct ReadingModeState {
    pub active: bool,
    pub alt_screen_active: bool,
    pending: VecDeque<Vec<u8>>,
    pending_bytes: usize,
    /// Bytes discarded from the front of the queue since it was last drained.
    dropped_bytes: usize,
    limit: usize,
}

impl Default for ReadingModeState {
    fn default() -> Self {
        Self::new(DEFAULT_PENDING_OUTPUT_LIMIT)
    }
}

impl ReadingModeState {
    pub fn new(limit: usize) -> Self {
        Self {
            active: false,
            alt_screen_active: false,
            pending: VecDeque::new(),
            pending_bytes: 0,
            dropped_bytes: 0,
            limit: limit.max(1),
        }
    }

    /// Activate and return the bytes that switch the host screen over.
    /// Nothing queued is flushed on entry.
    pub fn enter(&mut self) -> Vec<u8> {
        self.active = true;
        if self.alt_screen_active {
            return Vec::new();
        }
        self.alt_screen_active = true;
        ENTER_ALT_SCREEN.to_vec()
    }

    /// Deactivate and return what to write to the host: the screen restore
    /// followed by all queued output, in arrival order.
    pub fn exit(&mut self) -> Vec<u8> {
        self.active = false;
        let mut out = Vec::with_capacity(self.pending_bytes + LEAVE_ALT_SCREEN.len());
        if self.alt_screen_active {
            out.extend_from_slice(LEAVE_ALT_SCREEN);
            self.alt_screen_active = false;
        }
        out.extend(self.take_pending());
        out
    }

    /// Hold back a chunk of live output. The oldest chunks are dropped once
    /// the queue exceeds its byte limit.
    pub fn queue(&mut self, bytes: &[u8]) {
        self.pending.push_back(bytes.to_vec());
        self.pending_bytes += bytes.len();
        let mut dropped = 0;
        while self.pending_bytes > self.limit && self.pending.len() > 1 {
            if let Some(chunk) = self.pending.pop_front() {
                self.pending_bytes -= chunk.len();
                dropped += chunk.len();
            }
        }
        if dropped > 0 {
            self.dropped_bytes += dropped;
            tracing::warn!(
                dropped,
                limit = self.limit,
                "Reading mode output queue full, dropped oldest output"
            );
        }
    }

    /// Drain queued output in arrival order.
    pub fn take_pending(&mut self) -> Vec<u8> {
        self.pending_bytes = 0;
        self.dropped_bytes = 0;
        self.pending.drain(..).flatten().collect()
    }

    pub fn pending_chunks(&self) -> usize {
        self.pending.len()
    }

    pub fn pending_bytes(&self) -> usize {
        self.pending_bytes
    }

    /// How much queued output was lost to the byte limit.
    pub fn dropped_bytes(&self) -> usize {
        self.dropped_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::EntryKind;
    use crate::navigator::Navigator;
    use chrono::{Local, TimeZone};
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn history(lines: &[(EntryKind, &str)]) -> History {
        let mut history = History::new(100);
        let at = Local
            .with_ymd_and_hms(2024, 3, 1, 9, 5, 7)
            .single()
            .unwrap_or_else(Local::now);
        for (kind, line) in lines {
            history.append_at(*kind, *line, at);
        }
        history
    }

    fn plain(row: &str) -> String {
        ansi::strip(row)
    }

    #[test_case(0, 0, 10, 0..0 ; "empty history")]
    #[test_case(5, 4, 10, 0..5 ; "fits entirely")]
    #[test_case(100, 0, 10, 0..10 ; "cursor at top")]
    #[test_case(100, 50, 10, 45..55 ; "centered")]
    #[test_case(100, 99, 10, 90..100 ; "cursor at bottom")]
    #[test_case(100, 500, 10, 90..100 ; "cursor past end")]
    #[test_case(100, 50, 0, 0..0 ; "no body rows")]
    fn window_cases(len: usize, cursor: usize, rows: usize, expected: Range<usize>) {
        assert_eq!(visible_window(len, cursor, rows), expected);
    }

    #[test]
    fn window_always_contains_cursor() {
        for len in 1..40 {
            for cursor in 0..len {
                for rows in 1..12 {
                    let window = visible_window(len, cursor, rows);
                    assert!(window.contains(&cursor), "{len} {cursor} {rows}");
                    assert_eq!(window.len(), len.min(rows));
                }
            }
        }
    }

    #[test]
    fn every_row_is_exactly_terminal_width() {
        let h = history(&[
            (EntryKind::Input, "ls"),
            (EntryKind::Output, "file1.txt  file2.txt"),
            (EntryKind::Output, "日本語のとても長い行がここに続いていきます。さらに続きます。もっと続きます。"),
            (EntryKind::Output, "tab\tseparated\tcolumns"),
        ]);
        let mut nav = Navigator::new();
        nav.reset_to(&h, 2);
        nav.word_right(&h);
        for columns in [10u16, 30, 40, 80, 132] {
            let frame = render(&h, nav.cursor(), TerminalDimensions::new(columns, 6), 0);
            assert_eq!(frame.rows.len(), 6);
            for row in &frame.rows {
                assert_eq!(ansi::visual_width(&plain(row)), columns as usize, "{row:?}");
            }
        }
    }

    #[test]
    fn header_shows_range_and_pending() {
        let h = history(&[(EntryKind::Output, "a"), (EntryKind::Output, "b")]);
        let frame = render(&h, &Cursor::default(), TerminalDimensions::new(120, 10), 3);
        let header = plain(&frame.rows[0]);
        assert!(header.starts_with(" READING  1-2 of 2  3 pending"), "{header}");
        assert!(frame.rows[0].starts_with(HEADER_STYLE));
    }

    #[test]
    fn metadata_column_has_sequence_badge_and_time() {
        let h = history(&[(EntryKind::Input, "make"), (EntryKind::Output, "done")]);
        let frame = render(&h, &Cursor::default(), TerminalDimensions::new(80, 5), 0);
        let first = plain(&frame.rows[1]);
        let second = plain(&frame.rows[2]);
        assert!(first.starts_with("      1 IN  09:05:07"), "{first}");
        assert!(second.starts_with("      2 OUT 09:05:07"), "{second}");
        assert_eq!(&first[METADATA_WIDTH..METADATA_WIDTH + 4], "make");
    }

    #[test]
    fn narrow_terminal_drops_metadata() {
        let h = history(&[(EntryKind::Output, "content")]);
        let frame = render(&h, &Cursor::default(), TerminalDimensions::new(20, 3), 0);
        assert!(plain(&frame.rows[1]).starts_with("content"));
    }

    #[test]
    fn active_row_is_highlighted_with_nested_word() {
        let h = history(&[(EntryKind::Output, "alpha beta"), (EntryKind::Output, "gamma")]);
        let mut nav = Navigator::new();
        nav.reset_to(&h, 0);
        nav.word_right(&h);
        nav.word_right(&h);
        let frame = render(&h, nav.cursor(), TerminalDimensions::new(80, 5), 0);
        assert!(frame.rows[1].starts_with(ACTIVE_ROW_STYLE));
        assert!(frame.rows[1].contains(&format!("{HIGHLIGHT_ON}beta{HIGHLIGHT_OFF}")));
        assert!(!frame.rows[2].contains(ACTIVE_ROW_STYLE));
    }

    #[test]
    fn scrolls_to_keep_far_highlight_visible() {
        let line = format!("{} target tail", "x".repeat(100));
        let h = history(&[(EntryKind::Output, line.as_str())]);
        let mut nav = Navigator::new();
        nav.reset_to(&h, 0);
        nav.word_right(&h);
        nav.word_right(&h);
        let frame = render(&h, nav.cursor(), TerminalDimensions::new(40, 3), 0);
        let row = &frame.rows[1];
        assert!(row.contains(&format!("{HIGHLIGHT_ON}target{HIGHLIGHT_OFF}")), "{row:?}");
        let text = plain(row);
        assert!(text[METADATA_WIDTH..].starts_with(ELLIPSIS), "{text}");
        assert_eq!(ansi::visual_width(&text), 40);
    }

    #[test]
    fn window_follows_cursor() {
        let lines: Vec<String> = (0..50).map(|i| format!("line {i}")).collect();
        let entries: Vec<(EntryKind, &str)> =
            lines.iter().map(|l| (EntryKind::Output, l.as_str())).collect();
        let h = history(&entries);
        let mut nav = Navigator::new();
        nav.reset_to(&h, 40);
        let frame = render(&h, nav.cursor(), TerminalDimensions::new(80, 11), 0);
        assert_eq!(frame.window, 35..45);
        assert!(plain(&frame.rows[0]).contains("36-45 of 50"));
    }

    #[test]
    fn to_ansi_positions_each_row() {
        let h = history(&[(EntryKind::Output, "x")]);
        let frame = render(&h, &Cursor::default(), TerminalDimensions::new(30, 3), 0);
        let ansi = frame.to_ansi();
        assert!(ansi.starts_with("\x1b[1;1H"));
        assert!(ansi.contains("\x1b[2;1H"));
        assert!(ansi.contains("\x1b[3;1H"));
    }

    #[test]
    fn queue_and_flush_verbatim() {
        let mut state = ReadingModeState::default();
        assert_eq!(state.enter(), ENTER_ALT_SCREEN.to_vec());
        assert!(state.active);
        state.queue(b"one\r\n");
        state.queue(b"\x1b[31mtwo\x1b[0m\r\n");
        assert_eq!(state.pending_chunks(), 2);
        let out = state.exit();
        let mut expected = LEAVE_ALT_SCREEN.to_vec();
        expected.extend_from_slice(b"one\r\n\x1b[31mtwo\x1b[0m\r\n");
        assert_eq!(out, expected);
        assert!(!state.active);
        assert_eq!(state.pending_bytes(), 0);
    }

    #[test]
    fn queue_drops_oldest_over_limit() {
        let mut state = ReadingModeState::new(8);
        state.queue(b"aaaa");
        state.queue(b"bbbb");
        state.queue(b"cccc");
        assert_eq!(state.pending_bytes(), 8);
        assert_eq!(state.dropped_bytes(), 4);
        assert_eq!(state.take_pending(), b"bbbbcccc".to_vec());
        assert_eq!(state.dropped_bytes(), 0);
    }

    #[test]
    fn oversized_single_chunk_is_kept() {
        let mut state = ReadingModeState::new(2);
        state.queue(b"larger than limit");
        assert_eq!(state.pending_chunks(), 1);
    }
}
