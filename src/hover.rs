//! Hover payload normalization
//!
//! Indexers emit hover contents in several LSP shapes: a plain string, a
//! `{kind, value}` markup object, a `{language, value}` marked string, or
//! an array mixing them. The bundle stores a single markdown string, so
//! the shapes are collapsed at correlation time.

use serde_json::Value;

const SECTION_SEPARATOR: &str = "\n\n---\n\n";

/// Collapse a `hoverResult` vertex payload into one markdown string.
///
/// Accepts the full vertex payload; the hover lives under `result`, whose
/// `contents` field (when present) holds the actual content union.
pub fn normalize_hover_payload(payload: &Value) -> String {
    let result = payload.get("result").unwrap_or(&Value::Null);
    let contents = result.get("contents").unwrap_or(result);
    normalize_contents(contents)
}

fn normalize_contents(contents: &Value) -> String {
    let parts: Vec<String> = match contents {
        Value::Array(items) => items.iter().map(normalize_content).collect(),
        other => vec![normalize_content(other)],
    };

    parts
        .iter()
        .map(|part| part.trim())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(SECTION_SEPARATOR)
}

fn normalize_content(content: &Value) -> String {
    match content {
        Value::String(text) => text.clone(),
        Value::Object(fields) => {
            let value = fields
                .get("value")
                .and_then(Value::as_str)
                .unwrap_or_default();

            // A {language, value} marked string renders as a fenced code
            // block; a {kind, value} markup content is already markdown.
            match fields.get("language").and_then(Value::as_str) {
                Some(language) => format!("```{}\n{}\n```", language, value),
                None => value.to_string(),
            }
        }
        _ => String::new(),
    }
}
