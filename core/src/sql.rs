//! Statement text preparation.

use crate::binding::{Binding, substitute};
use crate::error::Result;
use regex::Regex;
use std::sync::LazyLock;

#[allow(clippy::expect_used)] // literal pattern
static BLOCK_COMMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\s*/\*.*?\*/\s*").expect("block comment pattern is valid")
});

/// Drop one trailing `;` (after trimming whitespace).
///
/// Text without a trailing terminator is returned unchanged.
#[must_use]
pub fn strip_trailing_terminator(sql: &str) -> &str {
    let trimmed = sql.trim();
    trimmed.strip_suffix(';').unwrap_or(sql)
}

/// Replace every `/* ... */` block (and surrounding whitespace) with a newline,
/// then trim.
///
/// Comment markers inside string literals are removed too.
#[must_use]
pub fn strip_block_comments(sql: &str) -> String {
    BLOCK_COMMENT.replace_all(sql, "\n").trim().to_string()
}

/// Turn caller SQL into the code submitted to a session.
///
/// Strips the trailing terminator, substitutes bindings when given, then
/// strips block comments.
///
/// # Errors
///
/// Propagates binding substitution errors.
pub fn prepare_statement(sql: &str, bindings: Option<&[Binding]>) -> Result<String> {
    let sql = strip_trailing_terminator(sql);
    let sql = match bindings {
        Some(values) => substitute(sql, values)?,
        None => sql.to_string(),
    };
    Ok(strip_block_comments(&sql))
}

/// Shorten SQL for logging, appending `...` when cut.
#[must_use]
pub fn abridge(sql: &str, max_chars: usize) -> String {
    match sql.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &sql[..cut]),
        None => sql.to_string(),
    }
}
