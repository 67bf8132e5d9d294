// src/utils/html.rs

use ammonia;

/// Sanitizes admin-entered rich text (question prompts, instruction settings)
/// before it is stored and later rendered to students.
///
/// Whitelist-based: safe formatting tags survive, script/iframe tags and
/// event-handler attributes are stripped.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input)
}
