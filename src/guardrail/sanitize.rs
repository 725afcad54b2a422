//! Visitor input cleanup.

use regex::Regex;
use std::sync::LazyLock;

static TAG_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());

/// Strip markup-like tags, trim whitespace and cap the length at `max_chars`.
///
/// Length is counted in characters so multi-byte text is never split. An
/// empty result means there was nothing left to answer.
pub fn sanitize(raw: &str, max_chars: usize) -> String {
    strip_tags(raw).chars().take(max_chars).collect()
}

/// Strip markup-like tags and trim whitespace without capping the length.
pub fn strip_tags(raw: &str) -> String {
    TAG_PATTERN.replace_all(raw, "").trim().to_string()
}
