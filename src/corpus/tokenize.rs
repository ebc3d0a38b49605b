//! Token formatting for the external sequence model.
//!
//! Source line: one token per character of the source form, then the tag
//! features (split on `;`), space-joined. Target line: one token per
//! character of the target form, space-joined.
//!
//! Spaces are token separators, so a form containing whitespace (multi-word
//! entries) does not survive `char_tokens` followed by `detokenize`: the
//! inner spaces are lost. The loader warns about such rows.

use crate::models::Example;

/// Format the model input line for an example.
pub fn source_line(example: &Example) -> String {
    example
        .source
        .chars()
        .map(String::from)
        .chain(example.features().map(str::to_string))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Format the model output line for an example.
pub fn target_line(example: &Example) -> String {
    char_tokens(&example.target)
}

/// Space-join the characters of a form.
pub fn char_tokens(form: &str) -> String {
    form.chars().map(String::from).collect::<Vec<_>>().join(" ")
}

/// Whether a form loses characters in the token format.
pub fn is_lossy_form(form: &str) -> bool {
    form.chars().any(char::is_whitespace)
}

/// Reconstruct a form from space-separated per-character tokens.
///
/// Surrounding whitespace is ignored; inner tokens are concatenated with no
/// separator.
pub fn detokenize(tokens: &str) -> String {
    tokens.trim().split(' ').collect()
}
