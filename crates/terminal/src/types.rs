//! Terminal data types.

/// Terminal dimensions in columns and rows.
///
/// Drives the reading overlay layout and the PTY window size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TerminalDimensions {
    pub columns: u16,
    pub rows: u16,
}

impl Default for TerminalDimensions {
    fn default() -> Self {
        Self {
            columns: 80,
            rows: 24,
        }
    }
}

impl TerminalDimensions {
    pub fn new(columns: u16, rows: u16) -> Self {
        Self { columns, rows }
    }

    /// Replace zero dimensions (reported by some hosts before layout) with defaults.
    pub fn or_default_if_empty(self) -> Self {
        let fallback = Self::default();
        Self {
            columns: if self.columns == 0 {
                fallback.columns
            } else {
                self.columns
            },
            rows: if self.rows == 0 {
                fallback.rows
            } else {
                self.rows
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_dimensions_default() {
        let dims = TerminalDimensions::default();
        assert_eq!(dims.columns, 80);
        assert_eq!(dims.rows, 24);
    }

    #[test_case(0, 0, 80, 24 ; "both zero")]
    #[test_case(0, 40, 80, 40 ; "zero columns")]
    #[test_case(120, 0, 120, 24 ; "zero rows")]
    #[test_case(100, 30, 100, 30 ; "non zero kept")]
    fn test_or_default_if_empty(columns: u16, rows: u16, want_cols: u16, want_rows: u16) {
        let dims = TerminalDimensions::new(columns, rows).or_default_if_empty();
        assert_eq!(dims, TerminalDimensions::new(want_cols, want_rows));
    }
}
