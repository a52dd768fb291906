use serde::de::DeserializeOwned;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SanitizeError {
    #[error("model returned no content")]
    Empty,
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

const FENCE: &str = "```";

/// Remove code-fence markup from raw model output.
///
/// If a fence is present, the body of the first fenced block is returned
/// (a language tag on the opening line is dropped) and prose around the
/// block is discarded. Otherwise the trimmed text is returned as-is.
pub fn strip_fences(raw: &str) -> String {
    let trimmed = raw.trim();
    let Some(open) = trimmed.find(FENCE) else {
        return trimmed.to_string();
    };

    let after = &trimmed[open + FENCE.len()..];
    let body = match after.split_once('\n') {
        Some((tag, rest)) if is_language_tag(tag) => rest,
        _ => after,
    };
    let body = match body.find(FENCE) {
        Some(close) => &body[..close],
        None => body,
    };
    body.replace(FENCE, "").trim().to_string()
}

fn is_language_tag(line: &str) -> bool {
    line.trim()
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Strip fences and strictly decode JSON. No repair, no partial parse.
pub fn decode<T: DeserializeOwned>(raw: &str) -> Result<T, SanitizeError> {
    let cleaned = strip_fences(raw);
    if cleaned.is_empty() {
        return Err(SanitizeError::Empty);
    }
    Ok(serde_json::from_str(&cleaned)?)
}

/// Plain-text variant for free-form answers: strip fences, whitespace and one
/// pair of surrounding quotes.
pub fn clean_text(raw: &str) -> String {
    let cleaned = strip_fences(raw);
    let unquoted = cleaned
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(&cleaned);
    unquoted.trim().to_string()
}
