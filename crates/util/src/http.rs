//! # HTTP Utilities
//!
//! Helpers for interpreting provider responses: status hints, strict JSON
//! parsing with a readable body preview, and extraction of list payloads
//! from the wrapper objects providers like to return.

use serde_json::Value;
use thiserror::Error;

const RESPONSE_ARRAY_PRIORITY_KEYS: &[&str] = &["listings", "results", "data", "items", "properties", "property", "records"];

/// Return a user-friendly error message for common provider status codes.
///
/// # Example
/// ```rust
/// use listwise_util::http::status_error_message;
///
/// let error_401 = status_error_message(401).unwrap();
/// assert!(error_401.contains("Unauthorized"));
/// assert!(status_error_message(404).is_none());
/// ```
pub fn status_error_message(status_code: u16) -> Option<String> {
    match status_code {
        401 => Some("Unauthorized (401). Hint: check the provider API key".into()),
        403 => Some("Forbidden (403). Hint: the API key lacks access to this endpoint".into()),
        429 => Some("Too Many Requests (429). Hint: provider rate limit reached".into()),
        _ => None,
    }
}

/// Parse HTTP response text into JSON, providing detailed errors on failure.
///
/// The error carries the HTTP status (when known) and up to 200 characters of
/// the body with whitespace collapsed, which is usually enough to tell a
/// truncated payload from an HTML error page.
pub fn parse_response_json_strict(text: &str, status: Option<u16>) -> Result<Value, JsonParseError> {
    serde_json::from_str::<Value>(text).map_err(|error| {
        let status_note = status
            .map(|code| format!("status {code}"))
            .unwrap_or_else(|| "unknown status".to_string());
        let preview = truncate_response_preview(text, 200);

        JsonParseError::new(status_note, error, preview)
    })
}

/// Collapse whitespace and cut a response body down to `limit` characters.
pub fn truncate_response_preview(text: &str, limit: usize) -> String {
    if text.trim().is_empty() {
        return "<empty>".to_string();
    }

    let mut preview = String::new();
    for ch in text.chars() {
        if preview.len() >= limit {
            preview.push_str("...");
            break;
        }
        match ch {
            '\n' | '\r' | '\t' => {
                if !preview.ends_with(' ') {
                    preview.push(' ');
                }
            }
            _ => preview.push(ch),
        }
    }

    preview.trim().to_string()
}

/// Extract list-like collection items from payloads.
///
/// Extraction order:
/// 1. Use the explicit dotted `list_path` if provided and it resolves to an array.
/// 2. Use a top-level array payload directly.
/// 3. Apply wrapper-key heuristics (`listings`, `results`, `data`, ...).
/// 4. Fall back to the single array-valued field of a wrapper object.
pub fn extract_collection_items(payload: &Value, list_path: Option<&str>) -> Option<Vec<Value>> {
    if let Some(path) = list_path
        && let Some(items) = value_at_path(payload, path).and_then(Value::as_array)
    {
        return Some(items.clone());
    }

    match payload {
        Value::Array(items) => Some(items.clone()),
        Value::Object(map) => {
            for key in RESPONSE_ARRAY_PRIORITY_KEYS {
                if let Some(Value::Array(items)) = map.get(*key) {
                    return Some(items.clone());
                }
            }

            let mut arrays = map.values().filter_map(|value| match value {
                Value::Array(items) => Some(items.clone()),
                _ => None,
            });
            let first = arrays.next()?;
            if arrays.next().is_none() {
                return Some(first);
            }
            None
        }
        _ => None,
    }
}

/// Resolve a dotted path such as `area.0.marketstat`; numeric segments index arrays.
pub fn value_at_path<'a>(payload: &'a Value, path: &str) -> Option<&'a Value> {
    if path == "." || path.is_empty() {
        return Some(payload);
    }

    let mut current = payload;
    for segment in path.split('.') {
        if segment.is_empty() {
            continue;
        }
        current = match current {
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            other => other.get(segment)?,
        };
    }
    Some(current)
}

/// Error returned when strict JSON parsing of an HTTP response fails.
#[derive(Debug, Error)]
#[error("failed to parse JSON response ({status_note}): {source}. body preview: {body_preview}")]
pub struct JsonParseError {
    status_note: String,
    #[source]
    source: serde_json::Error,
    body_preview: String,
}

impl JsonParseError {
    /// Create a new [`JsonParseError`] with contextual information.
    pub fn new(status_note: String, source: serde_json::Error, body_preview: String) -> Self {
        Self {
            status_note,
            source,
            body_preview,
        }
    }

    /// Access the truncated response preview captured during parsing.
    pub fn body_preview(&self) -> &str {
        &self.body_preview
    }
}
