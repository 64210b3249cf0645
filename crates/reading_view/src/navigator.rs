//! Reading cursor over the history.
//!
//! The cursor is independent of the real terminal cursor. It moves by line
//! through the history and by word or character within the current line.
//! Every move returns a [`Movement`] describing what to announce; hitting an
//! edge is a [`Boundary`], never an error and never a wrap.
//!
//! Word and character offsets index the line with tabs expanded, so they
//! line up with what the reading overlay draws.

use settings::constants::overlay::TAB_WIDTH;
use terminal::ansi;

use crate::history::{EntryKind, History};
use crate::words::{word_ranges, WordRange};

/// Which index was moved last.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Granularity {
    #[default]
    Line,
    Word,
    Char,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Cursor {
    pub line_index: usize,
    pub granularity: Granularity,
    pub word_index: Option<usize>,
    pub char_index: Option<usize>,
}

impl Cursor {
    fn at_line(line_index: usize) -> Self {
        Self {
            line_index,
            ..Self::default()
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Boundary {
    Top,
    Bottom,
    LineStart,
    LineEnd,
}

impl Boundary {
    pub fn speech(self) -> &'static str {
        match self {
            Boundary::Top => "Top",
            Boundary::Bottom => "Bottom",
            Boundary::LineStart => "Start of line",
            Boundary::LineEnd => "End of line",
        }
    }
}

/// Result of a navigation step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Movement {
    Line(String),
    Word(String),
    Char(char),
    EmptyLine,
    Boundary(Boundary),
    /// The history is empty.
    NoContent,
}

impl Movement {
    /// Text to announce for this step.
    pub fn speech(&self) -> String {
        match self {
            Movement::Line(text) | Movement::Word(text) => text.clone(),
            Movement::Char(' ') => "space".to_string(),
            Movement::Char(c) => c.to_string(),
            Movement::EmptyLine => "Empty line".to_string(),
            Movement::Boundary(boundary) => boundary.speech().to_string(),
            Movement::NoContent => "No content available".to_string(),
        }
    }

    pub fn is_boundary(&self) -> bool {
        matches!(self, Movement::Boundary(_))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Direction {
    Left,
    Right,
}

/// Tab-expanded characters and word ranges of one line.
#[derive(Debug)]
struct LineCache {
    line_index: usize,
    sequence: u64,
    chars: Vec<char>,
    words: Vec<WordRange>,
}

/// Expand tabs the way the overlay does and split into chars.
pub fn display_chars(content: &str) -> Vec<char> {
    ansi::expand_tabs(content, TAB_WIDTH)
        .chars()
        .filter(|c| !c.is_control())
        .collect()
}

/// Cursor state plus a per-line cache of word ranges.
#[derive(Debug, Default)]
pub struct Navigator {
    cursor: Cursor,
    cache: Option<LineCache>,
}

impl Navigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    /// Place the cursor on `index` (clamped) with word and char state cleared.
    pub fn reset_to(&mut self, history: &History, index: usize) -> Movement {
        if history.is_empty() {
            self.cursor = Cursor::default();
            return Movement::NoContent;
        }
        self.cursor = Cursor::at_line(index.min(history.len() - 1));
        self.line_movement(history)
    }

    /// Place the cursor on the most recent Input entry, or the last line.
    pub fn reset_to_latest_input(&mut self, history: &History) -> Movement {
        let index = history
            .last_index_of(EntryKind::Input)
            .unwrap_or_else(|| history.len().saturating_sub(1));
        self.reset_to(history, index)
    }

    /// Shift the cursor after `count` entries were evicted from the front.
    pub fn on_evicted(&mut self, count: usize) {
        if count == 0 {
            return;
        }
        self.cache = None;
        if self.cursor.line_index < count {
            self.cursor = Cursor::default();
        } else {
            self.cursor.line_index -= count;
        }
    }

    /// Re-read the current line.
    pub fn current_line(&mut self, history: &History) -> Movement {
        if history.is_empty() {
            return Movement::NoContent;
        }
        self.clamp(history);
        self.line_movement(history)
    }

    pub fn line_up(&mut self, history: &History) -> Movement {
        let target = self.cursor.line_index.saturating_sub(1);
        self.jump(history, target, Boundary::Top)
    }

    pub fn line_down(&mut self, history: &History) -> Movement {
        let target = self.cursor.line_index.saturating_add(1);
        self.jump(history, target, Boundary::Bottom)
    }

    pub fn line_first(&mut self, history: &History) -> Movement {
        self.jump(history, 0, Boundary::Top)
    }

    pub fn line_last(&mut self, history: &History) -> Movement {
        self.jump(history, usize::MAX, Boundary::Bottom)
    }

    pub fn page_up(&mut self, history: &History, page: usize) -> Movement {
        let target = self.cursor.line_index.saturating_sub(page.max(1));
        self.jump(history, target, Boundary::Top)
    }

    pub fn page_down(&mut self, history: &History, page: usize) -> Movement {
        let target = self.cursor.line_index.saturating_add(page.max(1));
        self.jump(history, target, Boundary::Bottom)
    }

    pub fn word_left(&mut self, history: &History) -> Movement {
        self.word_step(history, Direction::Left)
    }

    pub fn word_right(&mut self, history: &History) -> Movement {
        self.word_step(history, Direction::Right)
    }

    pub fn char_left(&mut self, history: &History) -> Movement {
        self.char_step(history, Direction::Left)
    }

    pub fn char_right(&mut self, history: &History) -> Movement {
        self.char_step(history, Direction::Right)
    }

    fn clamp(&mut self, history: &History) {
        let last = history.len().saturating_sub(1);
        if self.cursor.line_index > last {
            self.cursor = Cursor::at_line(last);
        }
    }

    fn jump(&mut self, history: &History, target: usize, boundary: Boundary) -> Movement {
        if history.is_empty() {
            return Movement::NoContent;
        }
        self.clamp(history);
        let target = target.min(history.len() - 1);
        if target == self.cursor.line_index {
            return Movement::Boundary(boundary);
        }
        self.cursor = Cursor::at_line(target);
        self.line_movement(history)
    }

    fn line_movement(&self, history: &History) -> Movement {
        match history.get(self.cursor.line_index) {
            Some(entry) if entry.content.trim().is_empty() => Movement::EmptyLine,
            Some(entry) => Movement::Line(entry.content.clone()),
            None => Movement::NoContent,
        }
    }

    /// Make sure the cache describes the current line.
    fn refresh_cache(&mut self, history: &History) -> bool {
        let index = self.cursor.line_index;
        let sequence = history.sequence_number(index);
        if let Some(cache) = &self.cache {
            if cache.line_index == index && cache.sequence == sequence {
                return true;
            }
        }
        let Some(entry) = history.get(index) else {
            self.cache = None;
            return false;
        };
        let chars = display_chars(&entry.content);
        let words = word_ranges(&chars);
        self.cache = Some(LineCache {
            line_index: index,
            sequence,
            chars,
            words,
        });
        true
    }

    fn word_step(&mut self, history: &History, direction: Direction) -> Movement {
        if history.is_empty() {
            return Movement::NoContent;
        }
        self.clamp(history);
        if !self.refresh_cache(history) {
            return Movement::NoContent;
        }
        let Some(cache) = &self.cache else {
            return Movement::NoContent;
        };
        if cache.words.is_empty() {
            return Movement::EmptyLine;
        }

        let words = &cache.words;
        let target = match (self.cursor.word_index, self.cursor.char_index) {
            (Some(current), _) => step(current, direction),
            (None, Some(c)) => match words.iter().position(|w| w.contains(c)) {
                Some(containing) => step(containing, direction),
                None => match direction {
                    Direction::Right => words.iter().position(|w| w.start > c),
                    Direction::Left => words.iter().rposition(|w| w.end <= c),
                },
            },
            (None, None) => match direction {
                Direction::Right => Some(0),
                Direction::Left => Some(words.len() - 1),
            },
        };

        match target.and_then(|i| words.get(i).map(|w| (i, *w))) {
            Some((index, range)) => {
                let text = range.text(&cache.chars);
                self.cursor.word_index = Some(index);
                self.cursor.char_index = Some(range.start);
                self.cursor.granularity = Granularity::Word;
                Movement::Word(text)
            }
            None => Movement::Boundary(match direction {
                Direction::Left => Boundary::LineStart,
                Direction::Right => Boundary::LineEnd,
            }),
        }
    }

    fn char_step(&mut self, history: &History, direction: Direction) -> Movement {
        if history.is_empty() {
            return Movement::NoContent;
        }
        self.clamp(history);
        if !self.refresh_cache(history) {
            return Movement::NoContent;
        }
        let Some(cache) = &self.cache else {
            return Movement::NoContent;
        };
        let len = cache.chars.len();
        if len == 0 || cache.chars.iter().all(|c| c.is_whitespace()) {
            return Movement::EmptyLine;
        }

        let target = match (self.cursor.char_index, direction) {
            (Some(i), Direction::Right) => Some(i + 1),
            (Some(i), Direction::Left) => i.checked_sub(1),
            (None, Direction::Right) => Some(
                self.cursor
                    .word_index
                    .and_then(|w| cache.words.get(w))
                    .map(|w| w.start)
                    .unwrap_or(0),
            ),
            (None, Direction::Left) => Some(len - 1),
        };

        match target.filter(|&i| i < len) {
            Some(index) => {
                let c = cache.chars[index];
                self.cursor.char_index = Some(index);
                self.cursor.word_index = None;
                self.cursor.granularity = Granularity::Char;
                Movement::Char(c)
            }
            None => Movement::Boundary(match direction {
                Direction::Left => Boundary::LineStart,
                Direction::Right => Boundary::LineEnd,
            }),
        }
    }

    /// Char range to highlight on the current line, if a word or char is
    /// active.
    pub fn highlight(&self) -> Option<WordRange> {
        highlight_range(&self.cursor, self.cache.as_ref().map(|c| c.words.as_slice()))
    }
}

fn step(index: usize, direction: Direction) -> Option<usize> {
    match direction {
        Direction::Right => index.checked_add(1),
        Direction::Left => index.checked_sub(1),
    }
}

/// Highlight for `cursor` given the current line's word ranges.
pub fn highlight_range(cursor: &Cursor, words: Option<&[WordRange]>) -> Option<WordRange> {
    match cursor.granularity {
        Granularity::Line => None,
        Granularity::Word => {
            let word = words?.get(cursor.word_index?).copied();
            if word.is_none() {
                util::debug_panic!("word index {:?} outside line", cursor.word_index);
            }
            word
        }
        Granularity::Char => cursor.char_index.map(|i| WordRange {
            start: i,
            end: i + 1,
        }),
    }
}
