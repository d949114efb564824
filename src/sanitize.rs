//! Filesystem-safe names for titles coming from the remote service.

/// Characters that may not appear in a path segment on any supported platform.
pub const RESERVED_CHARS: [char; 11] = ['/', '\\', ':', '*', '?', '"', '<', '>', '|', '\n', '\r'];

fn replace_reserved(name: &str, replacement: char) -> String {
    name.chars()
        .map(|c| {
            if RESERVED_CHARS.contains(&c) {
                replacement
            } else {
                c
            }
        })
        .collect()
}

/// Replace every reserved character with `_`. Idempotent.
///
/// Names that would not be an ordinary path segment (empty, `.`, `..`) become `_`.
pub fn sanitize_name(name: &str) -> String {
    let replaced = replace_reserved(name, '_');
    match replaced.trim() {
        "" | "." | ".." => "_".to_string(),
        _ => replaced,
    }
}

/// Same as [`sanitize_name`] but with `-`, used for titles scraped from the page `<title>`.
pub fn sanitize_title(name: &str) -> String {
    replace_reserved(name, '-')
}

/// Folder-name form of a candidate: sanitized, whitespace runs collapsed to `-`,
/// and leading/trailing separators dropped.
fn folder_candidate(candidate: &str) -> String {
    let cleaned = sanitize_name(candidate.trim());
    let joined = cleaned.split_whitespace().collect::<Vec<_>>().join("-");
    joined.trim_matches(|c: char| c == ' ' || c == '_' || c == '-').to_string()
}

/// Pick the book folder name: display title, then the title-derived fallback, then `book-<id>`.
/// The first candidate that is non-empty after cleaning wins.
pub fn resolve_folder_name(display_title: &str, fallback_title: &str, book_id: u64) -> String {
    [display_title, fallback_title]
        .into_iter()
        .map(folder_candidate)
        .find(|name| !name.is_empty())
        .unwrap_or_else(|| format!("book-{}", book_id))
}
