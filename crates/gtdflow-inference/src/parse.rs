//! Turning raw model text into validated, typed payloads.
//!
//! Models wrap JSON in code fences, prefix it with prose, or append
//! commentary. Extraction locates the payload, then [`parse`] checks it
//! against a [`Schema`] before deserializing.

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use gtdflow_core::ParseError;

use crate::schema::Schema;

const FENCE: &str = "```";

/// Locate the JSON payload in a model response.
///
/// If the text contains a fenced code block, its body is searched first.
/// Within the searched text, the first balanced top-level object or array
/// that parses as JSON wins; if none parse, the first balanced candidate is
/// returned so the caller can report the syntax error.
pub fn extract_json(raw: &str) -> Option<&str> {
    if let Some(body) = fenced_body(raw) {
        if let Some(found) = scan(body) {
            return Some(found);
        }
    }
    scan(raw)
}

/// Extract, validate and deserialize.
pub fn parse<T: DeserializeOwned>(raw: &str, schema: &Schema<T>) -> Result<T, ParseError> {
    let value = parse_value(raw, schema)?;
    serde_json::from_value(value).map_err(|e| ParseError::Deserialize(e.to_string()))
}

/// Extract and validate, returning the JSON value.
pub fn parse_value<T>(raw: &str, schema: &Schema<T>) -> Result<Value, ParseError> {
    let candidate = extract_json(raw).ok_or(ParseError::NoJson)?;
    let value: Value =
        serde_json::from_str(candidate).map_err(|e| ParseError::InvalidJson(e.to_string()))?;

    let violations = schema.validate(&value);
    if !violations.is_empty() {
        debug!(
            schema = schema.name(),
            violations = violations.len(),
            "Response failed schema validation"
        );
        return Err(ParseError::Validation {
            schema: schema.name().to_string(),
            violations,
        });
    }
    Ok(value)
}

/// Body of the first fenced block, without the info string.
fn fenced_body(raw: &str) -> Option<&str> {
    let open = raw.find(FENCE)?;
    let after_open = &raw[open + FENCE.len()..];
    // Skip the language hint (`json`, `JSON`, ...) up to the end of the line.
    let body_start = after_open.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after_open[body_start..];
    let close = body.find(FENCE)?;
    Some(&body[..close])
}

/// A balanced group that is not JSON is skipped as a whole, so openers
/// nested inside it are never tried.
fn scan(text: &str) -> Option<&str> {
    let mut first_balanced = None;
    let mut resume = 0;
    for (start, ch) in text.char_indices() {
        if start < resume || (ch != '{' && ch != '[') {
            continue;
        }
        if let Some(end) = balanced_end(&text[start..]) {
            let candidate = &text[start..start + end];
            if serde_json::from_str::<Value>(candidate).is_ok() {
                return Some(candidate);
            }
            first_balanced.get_or_insert(candidate);
            resume = start + end;
        }
    }
    first_balanced
}

/// Byte length of the balanced group starting at `text[0]`, honouring
/// string literals and escapes. `None` if the group never closes or a
/// closer does not match.
fn balanced_end(text: &str) -> Option<usize> {
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in text.char_indices() {
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
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                if stack.pop() != Some(ch) {
                    return None;
                }
                if stack.is_empty() {
                    return Some(i + ch.len_utf8());
                }
            }
            _ => {}
        }
    }
    None
}
