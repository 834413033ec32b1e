//! Validation gate run on the raw expression text.
//!
//! The gate is syntactic, not a grammar: it rejects characters outside the
//! allow-list and identifiers outside the binding set before the tokenizer
//! ever sees the string. Anything it rejects is never evaluated.

use crate::error::ValidationError;

/// Longest expression accepted, in bytes.
pub const MAX_EXPRESSION_LEN: usize = 2048;

/// Names bound in every evaluation environment.
pub const BINDINGS: &[&str] = &["t", "state", "country", "avg"];

/// Keyword literals.
pub const KEYWORDS: &[&str] = &["true", "false", "null"];

/// Host-object and reserved names, rejected anywhere in the expression
/// including after a dot.
const FORBIDDEN: &[&str] = &[
    "process",
    "require",
    "eval",
    "Function",
    "constructor",
    "prototype",
    "__proto__",
    "__defineGetter__",
    "__defineSetter__",
    "__lookupGetter__",
    "globalThis",
    "window",
    "this",
    "new",
    "import",
    "setTimeout",
    "setInterval",
    "XMLHttpRequest",
    "Reflect",
    "Proxy",
    "Deno",
    "Bun",
];

/// Whether `ch` is in the allow-listed character class.
pub const fn is_allowed_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric()
        || matches!(
            ch,
            '_' | ' '
                | '\t'
                | '\n'
                | '\r'
                | '.'
                | ','
                | '('
                | ')'
                | '\''
                | '"'
                | '<'
                | '>'
                | '='
                | '!'
                | '&'
                | '|'
                | '+'
                | '-'
                | '*'
                | '/'
                | '%'
        )
}

/// Run the full gate over an expression.
///
/// # Errors
///
/// Returns the first [`ValidationError`] found: empty or oversized input,
/// a disallowed character, a forbidden identifier, or a free identifier
/// outside the binding set.
pub fn check(expression: &str) -> Result<(), ValidationError> {
    check_characters(expression)?;
    check_identifiers(expression)
}

/// Character-class part of the gate.
///
/// # Errors
///
/// See [`check`].
pub fn check_characters(expression: &str) -> Result<(), ValidationError> {
    if expression.trim().is_empty() {
        return Err(ValidationError::EmptyExpression);
    }
    if expression.len() > MAX_EXPRESSION_LEN {
        return Err(ValidationError::ExpressionTooLong {
            len: expression.len(),
            max: MAX_EXPRESSION_LEN,
        });
    }
    match expression.char_indices().find(|(_, ch)| !is_allowed_char(*ch)) {
        Some((offset, ch)) => Err(ValidationError::DisallowedCharacter { ch, offset }),
        None => Ok(()),
    }
}

/// Identifier part of the gate. Assumes the character check passed.
fn check_identifiers(expression: &str) -> Result<(), ValidationError> {
    for word in words(expression) {
        if FORBIDDEN.contains(&word.text) {
            return Err(ValidationError::ForbiddenIdentifier {
                name: word.text.to_owned(),
            });
        }
        if !word.after_dot && !BINDINGS.contains(&word.text) && !KEYWORDS.contains(&word.text) {
            return Err(ValidationError::UnboundIdentifier {
                name: word.text.to_owned(),
            });
        }
    }
    Ok(())
}

struct Word<'a> {
    text: &'a str,
    /// Preceded (ignoring whitespace) by a `.`, i.e. a member name.
    after_dot: bool,
}

/// Identifier words outside string literals. Runs of alphanumerics that
/// start with a digit are numeric literals and skipped.
fn words(expression: &str) -> Vec<Word<'_>> {
    let bytes = expression.as_bytes();
    let mut out = Vec::new();
    let mut last_significant: Option<u8> = None;
    let mut i = 0_usize;

    while let Some(&b) = bytes.get(i) {
        if b == b'\'' || b == b'"' {
            // Skip to the closing quote; an unterminated literal is left
            // for the tokenizer to report.
            let close = bytes
                .get(i.saturating_add(1)..)
                .and_then(|rest| rest.iter().position(|&c| c == b))
                .map_or(bytes.len(), |p| i.saturating_add(p).saturating_add(2));
            i = close;
            last_significant = Some(b);
            continue;
        }
        if b.is_ascii_alphanumeric() || b == b'_' {
            let start = i;
            while bytes
                .get(i)
                .is_some_and(|c| c.is_ascii_alphanumeric() || *c == b'_')
            {
                i = i.saturating_add(1);
            }
            if !b.is_ascii_digit() {
                if let Some(text) = expression.get(start..i) {
                    out.push(Word {
                        text,
                        after_dot: last_significant == Some(b'.'),
                    });
                }
            }
            last_significant = Some(b'a');
            continue;
        }
        if !b.is_ascii_whitespace() {
            last_significant = Some(b);
        }
        i = i.saturating_add(1);
    }
    out
}
