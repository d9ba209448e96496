//! Placeholder Resolution
//!
//! Prompt templates embed named tokens written as `{%identifier%}`. The
//! resolver replaces them in a single left-to-right pass: substituted values
//! are copied verbatim and never scanned again, so text coming from a mail
//! (which the sender controls) cannot smuggle in further placeholders.

use std::collections::HashMap;

/// Placeholder id → replacement text.
pub type SubstitutionMap = HashMap<String, String>;

const OPEN: &str = "{%";
const CLOSE: &str = "%}";

/// Full body of the mail being read or composed.
pub const MAIL_TEXT: &str = "mail_text";
/// Text currently selected in the originating document.
pub const SELECTED_TEXT: &str = "selected_text";
/// Free text typed by the user when the prompt asks for it.
pub const ADDITIONAL_TEXT: &str = "additional_text";
/// Subject of the mail.
pub const MAIL_SUBJECT: &str = "mail_subject";
/// Signature of the identity the mail is read or composed with.
pub const MAIL_SIGNATURE: &str = "mail_signature";

/// Ids understood by the prompt orchestrator.
pub const BUILTIN_PLACEHOLDERS: &[&str] = &[
    MAIL_TEXT,
    SELECTED_TEXT,
    ADDITIONAL_TEXT,
    MAIL_SUBJECT,
    MAIL_SIGNATURE,
];

fn is_identifier(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// One well-formed placeholder occurrence: byte range of the whole token and its id.
struct Token<'a> {
    start: usize,
    end: usize,
    id: &'a str,
}

/// Iterate over well-formed placeholders in order of appearance.
fn tokens(text: &str) -> impl Iterator<Item = Token<'_>> {
    let mut cursor = 0;
    std::iter::from_fn(move || {
        while let Some(rel) = text[cursor..].find(OPEN) {
            let start = cursor + rel;
            let body_start = start + OPEN.len();
            let Some(close_rel) = text[body_start..].find(CLOSE) else {
                // Unterminated: nothing after this point can be a placeholder.
                cursor = text.len();
                return None;
            };
            let body_end = body_start + close_rel;
            let id = &text[body_start..body_end];
            if is_identifier(id) {
                let end = body_end + CLOSE.len();
                cursor = end;
                return Some(Token { start, end, id });
            }
            // Not an identifier: skip this opener and keep scanning.
            cursor = body_start;
        }
        cursor = text.len();
        None
    })
}

/// Returns true if `text` contains the placeholder `{%id%}`.
pub fn has_placeholder(text: &str, id: &str) -> bool {
    tokens(text).any(|t| t.id == id)
}

/// Ids of all placeholders in `text`, in order of first appearance, without duplicates.
pub fn find_placeholders(text: &str) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for token in tokens(text) {
        if !ids.iter().any(|known| known == token.id) {
            ids.push(token.id.to_string());
        }
    }
    ids
}

/// Replace every placeholder in `text` with its value from `substitutions`.
///
/// Placeholders with no value become an empty string when `use_default_value`
/// is set and are otherwise left exactly as written. Malformed tokens
/// (unterminated `{%`, or an invalid identifier) are never touched.
pub fn replace_placeholders(
    text: &str,
    substitutions: &SubstitutionMap,
    use_default_value: bool,
) -> String {
    let mut output = String::with_capacity(text.len());
    let mut last = 0;

    for token in tokens(text) {
        output.push_str(&text[last..token.start]);
        match substitutions.get(token.id) {
            Some(value) => output.push_str(value),
            None if use_default_value => {}
            None => output.push_str(&text[token.start..token.end]),
        }
        last = token.end;
    }

    output.push_str(&text[last..]);
    output
}
