//! Identifier escaping for SQLite
//!
//! Any identifier the gateway splices into SQL it generates itself goes
//! through [`escape_identifier`]. User-supplied statements are never
//! spliced; they are validated and executed verbatim.

/// SQLite's standard identifier quote character
pub const IDENTIFIER_QUOTE: char = '"';

/// Quote `name` so it can sit in an identifier position of a SQLite statement.
///
/// Wraps the name in double quotes and doubles every embedded double quote.
/// Nothing else is special. The result names exactly `name` and cannot
/// introduce additional syntax, whether or not such an object exists.
pub fn escape_identifier(name: &str) -> String {
    let mut escaped = String::with_capacity(name.len() + 2);
    escaped.push(IDENTIFIER_QUOTE);
    for c in name.chars() {
        if c == IDENTIFIER_QUOTE {
            escaped.push(IDENTIFIER_QUOTE);
        }
        escaped.push(c);
    }
    escaped.push(IDENTIFIER_QUOTE);
    escaped
}

/// Inverse of [`escape_identifier`].
///
/// Returns `None` when `quoted` is not in canonical escaped form: missing the
/// surrounding quotes, or containing a lone quote character inside them.
pub fn unescape_identifier(quoted: &str) -> Option<String> {
    let inner = quoted
        .strip_prefix(IDENTIFIER_QUOTE)?
        .strip_suffix(IDENTIFIER_QUOTE)?;

    let mut name = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == IDENTIFIER_QUOTE {
            // Only a doubled quote is legal inside the delimiters
            if chars.next() != Some(IDENTIFIER_QUOTE) {
                return None;
            }
        }
        name.push(c);
    }
    Some(name)
}
