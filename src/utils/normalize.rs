// src/utils/normalize.rs

use regex::Regex;
use std::sync::LazyLock;

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Canonical form used for all course-name and matching-answer comparisons:
/// trimmed, lowercased, inner whitespace collapsed to single spaces.
pub fn normalize(input: &str) -> String {
    WHITESPACE.replace_all(input.trim(), " ").to_lowercase()
}
