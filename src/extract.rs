//! Extraction of a JSON object from free-form model output.
//!
//! Models are instructed to reply with a single JSON object and nothing else,
//! but in practice the object arrives wrapped in markdown fences, prefixed
//! with prose, or followed by commentary. [`extract_json_object`] isolates
//! the first balanced `{…}` span so the caller can hand it to `serde_json`
//! without caring about the wrapping.

/// Return the first balanced JSON object embedded in `text`, if any.
///
/// Scans to the first `{`, then tracks brace depth while honoring string
/// literals and backslash escapes, and returns the slice up to the matching
/// `}`. Returns `None` when no opening brace exists or the braces never
/// balance (e.g. output truncated mid-object).
///
/// This only guarantees *balance*, not validity — the caller still parses
/// the slice and handles malformed content there.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}
