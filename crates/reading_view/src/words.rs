//! Word segmentation for word-granular navigation.
//!
//! Terminal output is full of paths, URLs, versions and flags, so a "word"
//! keeps those together: a maximal run of letters, digits and `_ . - / : @`.
//! Any other visible character (brackets, quotes, commas, `=`) is a word on
//! its own. Whitespace only separates.

/// Half-open range of char offsets within a line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WordRange {
    pub start: usize,
    pub end: usize,
}

impl WordRange {
    pub fn contains(&self, index: usize) -> bool {
        self.start <= index && index < self.end
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// The word's text within `chars`.
    pub fn text(&self, chars: &[char]) -> String {
        let end = self.end.min(chars.len());
        let start = self.start.min(end);
        chars[start..end].iter().collect()
    }
}

/// Characters that join into a single word.
pub fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '.' | '-' | '/' | ':' | '@')
}

/// Word ranges of `chars`, left to right.
pub fn word_ranges(chars: &[char]) -> Vec<WordRange> {
    let mut ranges = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() || c.is_control() {
            i += 1;
        } else if is_word_char(c) {
            let start = i;
            while i < chars.len() && is_word_char(chars[i]) {
                i += 1;
            }
            ranges.push(WordRange { start, end: i });
        } else {
            ranges.push(WordRange {
                start: i,
                end: i + 1,
            });
            i += 1;
        }
    }
    ranges
}
