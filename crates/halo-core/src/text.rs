//! UTF-8–safe string truncation.
//!
//! `&str[..n]` panics when `n` falls inside a multi-byte character; these
//! helpers snap to the nearest char boundary. Used when logging tokens,
//! SDP blobs, and page URLs at bounded length.

/// Truncate a string to at most `max_bytes` bytes at a char boundary.
#[inline]
pub fn truncate_str(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Truncate and append `suffix` when the original exceeds `max_bytes`.
///
/// The result is at most `max_bytes` bytes including the suffix; strings
/// that fit are returned as-is.
pub fn truncate_with_suffix(s: &str, max_bytes: usize, suffix: &str) -> String {
    if s.len() <= max_bytes {
        return s.to_owned();
    }
    let body_budget = max_bytes.saturating_sub(suffix.len());
    let prefix = truncate_str(s, body_budget);
    format!("{prefix}{suffix}")
}
