//! Sentence formatting for user-facing messages.

/// Formats `text` as a sentence: trimmed, first letter upper-cased, and
/// terminated with a period unless it already ends in `.`, `!` or `?`.
///
/// Blank input yields `fallback`, formatted the same way. If both are blank
/// the result is `"Unknown error."`, so the output is never empty.
pub(crate) fn format_sentence(text: &str, fallback: &str) -> String {
    let trimmed = match text.trim() {
        "" => match fallback.trim() {
            "" => "unknown error",
            f => f,
        },
        t => t,
    };

    let mut chars = trimmed.chars();
    let mut out = String::with_capacity(trimmed.len() + 1);
    if let Some(first) = chars.next() {
        out.extend(first.to_uppercase());
        out.push_str(chars.as_str());
    }
    if !out.ends_with(&['.', '!', '?'][..]) {
        out.push('.');
    }
    out
}
