//! Utility functions.
//!
//! Collection of helper functions used across the bot.

/// Format an at-mention for a user ID.
pub fn mention(user_id: &str) -> String {
    format!("<@{}>", user_id)
}

/// Normalize free text into a hamagram prompt.
///
/// Letters are upper-cased, whitespace is kept only when `preserve_spaces` is
/// set, and everything else is dropped. Whitespace left dangling at either end
/// is trimmed.
pub fn filter_prompt(prompt: &str, preserve_spaces: bool) -> String {
    let filtered: String = prompt
        .chars()
        .filter_map(|c| match c {
            'A'..='Z' => Some(c),
            'a'..='z' => Some(c.to_ascii_uppercase()),
            c if preserve_spaces && c.is_whitespace() => Some(c),
            _ => None,
        })
        .collect();
    filtered.trim().to_string()
}
