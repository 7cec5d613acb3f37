//! Small text helpers shared across the pipeline.
//!
//! LLM replies frequently arrive wrapped in markdown code fences, and several
//! persistence fields carry hard character limits, so both concerns live here
//! rather than being re-implemented per call site.

/// Strip a markdown code-fence wrapper (```` ``` ```` or ```` ```json ````)
/// from an LLM reply, returning the inner text.
///
/// Text without a fence is returned trimmed but otherwise untouched.
///
/// # Example
///
/// ```rust
/// use caravel::caravel::util::strip_code_fences;
///
/// let raw = "```json\n{\"intent\": \"job_search\"}\n```";
/// assert_eq!(strip_code_fences(raw), "{\"intent\": \"job_search\"}");
/// assert_eq!(strip_code_fences("  plain text "), "plain text");
/// ```
pub fn strip_code_fences(raw: &str) -> &str {
    let mut text = raw.trim();
    if text.starts_with("```") {
        text = match text.find('\n') {
            Some(idx) => &text[idx + 1..],
            None => &text[3..],
        };
        if text.ends_with("```") {
            text = &text[..text.len() - 3];
        }
        text = text.trim();
    }
    text
}

/// Truncate a string to at most `max` characters, respecting UTF-8 boundaries.
///
/// Returns the original slice when it is already short enough.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Render a `[0, 1]` confidence as a whole percentage, e.g. `0.8` → `"80%"`.
pub fn percent(confidence: f64) -> String {
    format!("{}%", (confidence * 100.0).round() as i64)
}
