//! Query validator - read-only policy for client SQL
//!
//! Classifies a client statement as a single `SELECT` or rejects it. This is
//! a lexical check, not a parser: a finite-state machine tracks whether each
//! character sits in plain SQL, a quoted region or a comment, and only plain
//! SQL is inspected for statement separators and denylisted keywords.
//!
//! The lexer follows SQLite's rules. Strings use `'...'`, identifiers use
//! `"..."`, `` `...` `` or `[...]`, quotes escape by doubling (brackets do not
//! escape), `--` runs to end of line and `/* */` does not nest.

use crate::types::{ReasonCode, Rejection};

/// Keywords that may never appear as a bare token in an accepted statement
pub const DEFAULT_FORBIDDEN_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "CREATE", "ATTACH", "DETACH", "PRAGMA",
    "REPLACE", "TRUNCATE", "VACUUM",
];

const SELECT_KEYWORD: &str = "SELECT";
const STATEMENT_SEPARATOR: char = ';';

// ============================================================================
// Verdict Types
// ============================================================================

/// A statement that passed validation.
///
/// Only [`QueryValidator::validate`] can build one, so holding a
/// `ValidatedQuery` proves the text went through the policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedQuery(String);

impl ValidatedQuery {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[cfg(test)]
    fn into_inner(self) -> String {
        self.0
    }
}

/// Outcome of validating one client statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryVerdict {
    Accepted(ValidatedQuery),
    Rejected(Rejection),
}

impl QueryVerdict {
    #[cfg(test)]
    fn is_accepted(&self) -> bool {
        matches!(self, QueryVerdict::Accepted(_))
    }

    /// Reason code of a rejection, `None` when accepted
    #[cfg(test)]
    fn reason(&self) -> Option<ReasonCode> {
        match self {
            QueryVerdict::Accepted(_) => None,
            QueryVerdict::Rejected(rejection) => Some(rejection.reason),
        }
    }

    pub fn into_result(self) -> Result<ValidatedQuery, Rejection> {
        match self {
            QueryVerdict::Accepted(query) => Ok(query),
            QueryVerdict::Rejected(rejection) => Err(rejection),
        }
    }
}

// ============================================================================
// Lexer State Machine
// ============================================================================

/// Lexical region the scanner is currently in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexState {
    Normal,
    SingleQuote,
    DoubleQuote,
    Backtick,
    Bracket,
    LineComment,
    BlockComment,
}

impl LexState {
    /// Whether input may legally end in this state
    pub fn is_terminal(self) -> bool {
        matches!(self, LexState::Normal | LexState::LineComment)
    }

    /// Advance by one character.
    ///
    /// `next` is the following character, if any. Returns the new state and
    /// whether `next` was consumed as part of this step (comment openers and
    /// closers, doubled quotes).
    pub fn step(self, c: char, next: Option<char>) -> (LexState, bool) {
        use LexState::*;

        match self {
            Normal => match (c, next) {
                ('\'', _) => (SingleQuote, false),
                ('"', _) => (DoubleQuote, false),
                ('`', _) => (Backtick, false),
                ('[', _) => (Bracket, false),
                ('-', Some('-')) => (LineComment, true),
                ('/', Some('*')) => (BlockComment, true),
                _ => (Normal, false),
            },
            SingleQuote => close_quoted(SingleQuote, '\'', c, next),
            DoubleQuote => close_quoted(DoubleQuote, '"', c, next),
            Backtick => close_quoted(Backtick, '`', c, next),
            Bracket => match c {
                ']' => (Normal, false),
                _ => (Bracket, false),
            },
            LineComment => match c {
                '\n' => (Normal, false),
                _ => (LineComment, false),
            },
            BlockComment => match (c, next) {
                ('*', Some('/')) => (Normal, true),
                _ => (BlockComment, false),
            },
        }
    }
}

/// Quote handling shared by the doubling-escape quote styles
fn close_quoted(state: LexState, quote: char, c: char, next: Option<char>) -> (LexState, bool) {
    if c != quote {
        return (state, false);
    }
    if next == Some(quote) {
        (state, true)
    } else {
        (LexState::Normal, false)
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// What one pass of the lexer saw
#[derive(Debug)]
struct Scan<'a> {
    /// Bare words in plain SQL, in order
    words: Vec<&'a str>,
    /// Byte offset of the first separator in plain SQL
    separator: Option<usize>,
    /// Non-whitespace input follows the separator
    trailing_content: bool,
    end_state: LexState,
}

impl<'a> Scan<'a> {
    fn run(text: &'a str) -> Self {
        let mut scan = Scan {
            words: Vec::new(),
            separator: None,
            trailing_content: false,
            end_state: LexState::Normal,
        };

        let mut state = LexState::Normal;
        let mut word_start: Option<usize> = None;
        let mut chars = text.char_indices().peekable();

        while let Some((i, c)) = chars.next() {
            if scan.separator.is_some() && !c.is_whitespace() {
                scan.trailing_content = true;
                break;
            }

            if state == LexState::Normal {
                if is_word_char(c) {
                    word_start.get_or_insert(i);
                    continue;
                }
                if let Some(start) = word_start.take() {
                    scan.words.push(&text[start..i]);
                }
                if c == STATEMENT_SEPARATOR {
                    scan.separator = Some(i);
                    continue;
                }
            }

            let next = chars.peek().map(|&(_, n)| n);
            let (next_state, consumed_next) = state.step(c, next);
            if consumed_next {
                chars.next();
            }
            state = next_state;
        }

        if let Some(start) = word_start {
            scan.words.push(&text[start..]);
        }
        scan.end_state = state;
        scan
    }
}

// ============================================================================
// Validator
// ============================================================================

/// Read-only statement policy
#[derive(Debug, Clone)]
pub struct QueryValidator {
    forbidden: Vec<String>,
}

impl Default for QueryValidator {
    fn default() -> Self {
        Self {
            forbidden: DEFAULT_FORBIDDEN_KEYWORDS
                .iter()
                .map(|k| k.to_string())
                .collect(),
        }
    }
}

impl QueryValidator {
    /// Validator with the built-in denylist plus `extra` keywords.
    ///
    /// The built-in list cannot be shrunk.
    pub fn with_extra_keywords<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut validator = Self::default();
        for keyword in extra {
            let keyword = keyword.as_ref().trim().to_ascii_uppercase();
            if !keyword.is_empty() && !validator.forbidden.contains(&keyword) {
                validator.forbidden.push(keyword);
            }
        }
        validator
    }

    pub fn forbidden_keywords(&self) -> &[String] {
        &self.forbidden
    }

    /// Judge `raw` against the read-only policy.
    ///
    /// Checks run in order: empty input, `SELECT` prefix, statement
    /// separators, unterminated regions, denylisted keywords. The accepted
    /// text is `raw` trimmed, minus a single trailing separator.
    pub fn validate(&self, raw: &str) -> QueryVerdict {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return reject(ReasonCode::Empty, "Query is empty");
        }

        if !starts_with_select(trimmed) {
            return reject(
                ReasonCode::NotASelect,
                "Only SELECT statements are allowed",
            );
        }

        let scan = Scan::run(trimmed);

        if scan.trailing_content {
            return reject(
                ReasonCode::MultipleStatements,
                "Only a single statement is allowed; found content after ';'",
            );
        }

        if !scan.end_state.is_terminal() {
            return reject(
                ReasonCode::Unterminated,
                format!("Query ends inside {}", describe_state(scan.end_state)),
            );
        }

        if let Some(word) = scan.words.iter().find(|w| self.is_forbidden(w)) {
            return reject(
                ReasonCode::ForbiddenKeyword,
                format!("Keyword '{}' is not allowed", word.to_ascii_uppercase()),
            );
        }

        let statement = match scan.separator {
            Some(pos) => trimmed[..pos].trim_end(),
            None => trimmed,
        };
        QueryVerdict::Accepted(ValidatedQuery(statement.to_string()))
    }

    fn is_forbidden(&self, word: &str) -> bool {
        self.forbidden.iter().any(|k| k.eq_ignore_ascii_case(word))
    }
}

fn reject(reason: ReasonCode, message: impl Into<String>) -> QueryVerdict {
    QueryVerdict::Rejected(Rejection::new(reason, message))
}

/// `SELECT` followed by a word boundary, case-insensitive
fn starts_with_select(text: &str) -> bool {
    let Some(prefix) = text.get(..SELECT_KEYWORD.len()) else {
        return false;
    };
    if !prefix.eq_ignore_ascii_case(SELECT_KEYWORD) {
        return false;
    }
    !text[SELECT_KEYWORD.len()..]
        .chars()
        .next()
        .is_some_and(is_word_char)
}

fn describe_state(state: LexState) -> &'static str {
    match state {
        LexState::SingleQuote => "an unterminated string literal",
        LexState::DoubleQuote | LexState::Backtick | LexState::Bracket => {
            "an unterminated quoted identifier"
        }
        LexState::BlockComment => "an unterminated block comment",
        LexState::Normal | LexState::LineComment => "plain SQL",
    }
}
