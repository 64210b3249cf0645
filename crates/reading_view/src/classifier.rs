//! Surface classification of a command's output.
//!
//! Matches each output line against fixed vocabularies of error, warning and
//! success markers and condenses the result into something short enough to
//! speak. This never tries to understand the command; it only recognises
//! the shapes common toolchains print.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::history::{BufferEntry, EntryKind};

/// Most suggestions returned by [`classify`].
pub const MAX_SUGGESTIONS: usize = 5;

/// Longest excerpt of the first error quoted in the summary.
const EXCERPT_CHARS: usize = 80;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IssueCategory {
    Syntax,
    Import,
    Runtime,
    Test,
    Build,
    Other,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Classification {
    pub error_count: usize,
    pub warning_count: usize,
    pub summary: String,
    /// Ranked by priority, highest first, deduplicated.
    pub suggestions: Vec<String>,
    /// Categories seen, in first-seen order.
    pub categories: Vec<IssueCategory>,
}

struct ErrorRule {
    pattern: Regex,
    category: IssueCategory,
    priority: u8,
    suggestion: &'static str,
}

static ERROR_RULES: Lazy<Vec<ErrorRule>> = Lazy::new(|| {
    [
        (
            r"SyntaxError|(?i)syntax error|unexpected token|parse error|unexpected EOF",
            IssueCategory::Syntax,
            90,
            "Check the syntax near the reported line",
        ),
        (
            r"ModuleNotFoundError|ImportError|No module named|(?i)cannot find module|unresolved import",
            IssueCategory::Import,
            85,
            "Install the missing module or check the import path",
        ),
        (
            r"(?i)command not found|is not recognized as an internal or external command",
            IssueCategory::Runtime,
            80,
            "Check the command name or install the program",
        ),
        (
            r"(?i)permission denied|EACCES",
            IssueCategory::Runtime,
            75,
            "Check file permissions or run with the required privileges",
        ),
        (
            r"(?i)no such file or directory|ENOENT|FileNotFoundError",
            IssueCategory::Runtime,
            70,
            "Check that the path exists",
        ),
        (
            r"test result: FAILED|\bFAILED\b|\b[1-9]\d* (failed|failing)\b|AssertionError|assertion failed",
            IssueCategory::Test,
            65,
            "Re-run the failing tests to see their details",
        ),
        (
            r"error\[E\d+\]|^error:|(?i)compilation failed|(?i)build failed|make: \*\*\*|(?i)linker .* failed",
            IssueCategory::Build,
            60,
            "Fix the first compiler error, later ones often follow from it",
        ),
        (
            r"Traceback \(most recent call last\)|panicked at|TypeError|NameError|ValueError|KeyError|(?i)segmentation fault|^fatal:|Exception",
            IssueCategory::Runtime,
            50,
            "Read the stack trace from the bottom up",
        ),
        (
            r"(?i)\berror\b|\bERR!",
            IssueCategory::Other,
            10,
            "Review the error output",
        ),
    ]
    .into_iter()
    .filter_map(|(pattern, category, priority, suggestion)| {
        Regex::new(pattern).ok().map(|pattern| ErrorRule {
            pattern,
            category,
            priority,
            suggestion,
        })
    })
    .collect()
});

static WARNING: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?i)\bwarn(ing)?\b|deprecat").ok());

static SUCCESS: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"(?i)\b(success(ful(ly)?)?|passed|finished|completed|done)\b|test result: ok|\b0 errors\b")
        .ok()
});

/// Classify the Output entries among `entries`.
pub fn classify<'a>(entries: impl IntoIterator<Item = &'a BufferEntry>) -> Classification {
    let mut result = Classification::default();
    let mut ranked: Vec<(u8, &'static str)> = Vec::new();
    let mut first_error: Option<&str> = None;
    let mut line_count = 0;
    let mut succeeded = false;

    for entry in entries {
        if entry.kind != EntryKind::Output {
            continue;
        }
        line_count += 1;
        let line = entry.content.as_str();

        if let Some(rule) = ERROR_RULES.iter().find(|rule| rule.pattern.is_match(line)) {
            result.error_count += 1;
            first_error.get_or_insert(line);
            ranked.push((rule.priority, rule.suggestion));
            if !result.categories.contains(&rule.category) {
                result.categories.push(rule.category);
            }
        } else if WARNING.as_ref().is_some_and(|re| re.is_match(line)) {
            result.warning_count += 1;
        } else if SUCCESS.as_ref().is_some_and(|re| re.is_match(line)) {
            succeeded = true;
        }
    }

    // Stable sort keeps first-seen order among equal priorities.
    ranked.sort_by(|a, b| b.0.cmp(&a.0));
    for (_, suggestion) in ranked {
        if result.suggestions.len() == MAX_SUGGESTIONS {
            break;
        }
        if !result.suggestions.iter().any(|s| s == suggestion) {
            result.suggestions.push(suggestion.to_string());
        }
    }

    result.summary = summarize(&result, line_count, succeeded, first_error);
    tracing::debug!(
        errors = result.error_count,
        warnings = result.warning_count,
        lines = line_count,
        "Classified command output"
    );
    result
}

fn summarize(
    result: &Classification,
    line_count: usize,
    succeeded: bool,
    first_error: Option<&str>,
) -> String {
    use util::pluralize;

    if line_count == 0 {
        return "No output".to_string();
    }
    if result.error_count > 0 {
        let mut summary = pluralize(result.error_count, "error");
        if result.warning_count > 0 {
            summary.push_str(", ");
            summary.push_str(&pluralize(result.warning_count, "warning"));
        }
        if let Some(line) = first_error {
            summary.push_str(". First: ");
            summary.push_str(&util::truncate_chars(line.trim(), EXCERPT_CHARS));
        }
        return summary;
    }
    if result.warning_count > 0 {
        return format!(
            "{}, no errors",
            pluralize(result.warning_count, "warning")
        );
    }
    if succeeded {
        return format!("Succeeded, {}", pluralize(line_count, "line"));
    }
    format!("{}, no errors detected", pluralize(line_count, "line"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::History;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn run(lines: &[&str]) -> Classification {
        let mut history = History::new(100);
        for line in lines {
            history.append(EntryKind::Output, *line);
        }
        classify(history.iter())
    }

    #[test]
    fn empty_output() {
        let result = run(&[]);
        assert_eq!(result.summary, "No output");
        assert_eq!(result.error_count, 0);
        assert!(result.suggestions.is_empty());
    }

    #[test_case("  File \"x.py\", line 1\nSyntaxError: invalid syntax", IssueCategory::Syntax ; "python syntax")]
    #[test_case("ModuleNotFoundError: No module named 'requests'", IssueCategory::Import ; "python import")]
    #[test_case("bash: gti: command not found", IssueCategory::Runtime ; "command not found")]
    #[test_case("error[E0425]: cannot find value `x` in this scope", IssueCategory::Build ; "rustc error")]
    #[test_case("test result: FAILED. 3 passed; 1 failed", IssueCategory::Test ; "cargo test failure")]
    #[test_case("thread 'main' panicked at src/main.rs:2:5", IssueCategory::Runtime ; "rust panic")]
    #[test_case("npm ERR! code ELIFECYCLE", IssueCategory::Other ; "generic error")]
    fn categorises_errors(output: &str, category: IssueCategory) {
        let lines: Vec<&str> = output.lines().collect();
        let result = run(&lines);
        assert_eq!(result.error_count, 1);
        assert_eq!(result.categories, vec![category]);
    }

    #[test]
    fn passing_tests_are_not_failures() {
        let result = run(&["running 4 tests", "test result: ok. 4 passed; 0 failed; 0 ignored"]);
        assert_eq!(result.error_count, 0);
        assert_eq!(result.summary, "Succeeded, 2 lines");
    }

    #[test]
    fn warnings_only() {
        let result = run(&[
            "warning: unused variable: `x`",
            "warning: function `f` is never used",
            "Finished dev profile",
        ]);
        assert_eq!(result.warning_count, 2);
        assert_eq!(result.summary, "2 warnings, no errors");
    }

    #[test]
    fn summary_quotes_first_error() {
        let result = run(&[
            "Compiling earshot v0.1.0",
            "error[E0308]: mismatched types",
            "warning: unused import",
            "error: could not compile `earshot`",
        ]);
        assert_eq!(result.error_count, 2);
        assert_eq!(result.warning_count, 1);
        assert_eq!(
            result.summary,
            "2 errors, 1 warning. First: error[E0308]: mismatched types"
        );
    }

    #[test]
    fn suggestions_ranked_deduplicated_and_capped() {
        let result = run(&[
            "error: something broke",
            "Traceback (most recent call last):",
            "SyntaxError: invalid syntax",
            "SyntaxError: invalid syntax",
            "ImportError: cannot import name 'x'",
            "sh: foo: command not found",
            "cat: x: No such file or directory",
            "cp: permission denied",
            "1 failed",
        ]);
        assert_eq!(result.suggestions.len(), MAX_SUGGESTIONS);
        assert_eq!(
            result.suggestions,
            vec![
                "Check the syntax near the reported line",
                "Install the missing module or check the import path",
                "Check the command name or install the program",
                "Check file permissions or run with the required privileges",
                "Check that the path exists",
            ]
        );
    }

    #[test]
    fn input_entries_are_ignored() {
        let mut history = History::new(10);
        history.append(EntryKind::Input, "grep error log.txt");
        history.append(EntryKind::Output, "all good");
        let result = classify(history.iter());
        assert_eq!(result.error_count, 0);
        assert_eq!(result.summary, "1 line, no errors detected");
    }
}
