//! Recovery of structured values that were stored as text.

use serde_json::Value as JsonValue;

/// Nesting bound for text that decodes into more embedded text.
pub const DEFAULT_MAX_DEPTH: usize = 8;

/// Decodes `text` when it looks like a JSON object or array, then does the same for
/// every string nested inside the result. Anything that fails to decode stays a string.
pub fn recover_text(text: &str, max_depth: usize) -> JsonValue {
    recover_at(text, 0, max_depth)
}

fn recover_at(text: &str, depth: usize, max_depth: usize) -> JsonValue {
    if depth >= max_depth || !looks_structured(text) {
        return JsonValue::String(text.to_string());
    }

    match serde_json::from_str::<JsonValue>(text.trim()) {
        Ok(parsed) => descend(parsed, depth + 1, max_depth),
        Err(_) => JsonValue::String(text.to_string()),
    }
}

fn descend(value: JsonValue, depth: usize, max_depth: usize) -> JsonValue {
    match value {
        JsonValue::String(s) => recover_at(&s, depth, max_depth),
        JsonValue::Array(items) => JsonValue::Array(
            items
                .into_iter()
                .map(|item| descend(item, depth, max_depth))
                .collect(),
        ),
        JsonValue::Object(map) => JsonValue::Object(
            map.into_iter()
                .map(|(key, item)| (key, descend(item, depth, max_depth)))
                .collect(),
        ),
        other => other,
    }
}

fn looks_structured(text: &str) -> bool {
    let trimmed = text.trim();
    (trimmed.starts_with('{') && trimmed.ends_with('}'))
        || (trimmed.starts_with('[') && trimmed.ends_with(']'))
}
