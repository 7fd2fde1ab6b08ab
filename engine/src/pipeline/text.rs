//! Text normalization shared by the filters and the deduplicator

/// Fold non-breaking spaces, collapse whitespace runs and trim.
pub fn collapse_whitespace(s: &str) -> String {
    s.split(|c: char| c.is_whitespace() || c == '\u{00A0}')
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn word_count(s: &str) -> usize {
    s.split_whitespace().count()
}

/// Keep at most `max` words, whitespace collapsed.
pub fn trim_to_words(s: &str, max: usize) -> String {
    collapse_whitespace(s)
        .split(' ')
        .filter(|w| !w.is_empty())
        .take(max)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Lowercase alphanumeric tokens, splitting on every non-word character.
pub fn tokens(s: &str) -> Vec<String> {
    s.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Truncate to at most `max` characters on a char boundary.
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
