//! Extraction of a JSON payload from raw model output.
//!
//! Models are asked for bare JSON but often wrap it in markdown fences or add
//! prose around it. The text is treated as untrusted: fences and a leading BOM
//! are stripped, and as a last resort the outermost `{...}` span is tried.

use crate::error::AppError;

const FENCE: &str = "```";

/// Longest excerpt of the raw text carried in a parse error
const EXCERPT_CHARS: usize = 200;

pub fn extract_json(raw: &str) -> Result<serde_json::Value, AppError> {
    let text = raw.trim_start_matches('\u{feff}').trim();
    if text.is_empty() {
        return Err(AppError::MalformedProviderResponse(
            "provider returned empty content".to_string(),
        ));
    }

    let unfenced = strip_code_fence(text);
    let first_error = match serde_json::from_str(unfenced) {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    if let Some(candidate) = outermost_object(unfenced) {
        if let Ok(value) = serde_json::from_str(candidate) {
            tracing::debug!("Recovered JSON object from surrounding text");
            return Ok(value);
        }
    }

    Err(AppError::MalformedProviderResponse(format!(
        "{} (content starts with: {:?})",
        first_error,
        excerpt(text)
    )))
}

/// Inner text of the first fenced block, or the input when there is none
fn strip_code_fence(text: &str) -> &str {
    let Some(open) = text.find(FENCE) else {
        return text;
    };

    let after_open = &text[open + FENCE.len()..];
    // Skip the info string (`json`, `JSON`, ...) up to the end of the line
    let body = match after_open.find('\n') {
        Some(newline) => &after_open[newline + 1..],
        None => after_open.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
    };

    match body.rfind(FENCE) {
        Some(close) => body[..close].trim(),
        None => body.trim(),
    }
}

fn outermost_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn excerpt(text: &str) -> String {
    text.chars().take(EXCERPT_CHARS).collect()
}
