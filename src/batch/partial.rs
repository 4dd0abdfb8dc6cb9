//! Salvage individually valid records from a structured AI response.
//!
//! A response that is cut off or has one malformed entry still carries
//! useful records. Each element of the record list is checked on its own so
//! a single bad entry only costs that entry.

use serde::de::DeserializeOwned;
use serde_json::Value;

const MAX_ERROR_CHARS: usize = 100;

/// Schema-level checks a record applies to itself after deserializing.
pub trait Validate {
    fn validate(&self) -> std::result::Result<(), String>;
}

/// Where the record list lives in the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListShape<'a> {
    /// The response is the list itself.
    Bare,
    /// The response is an object holding the list under this key.
    Field(&'a str),
}

/// Outcome of [`parse_partial_list`].
#[derive(Debug, Clone, PartialEq)]
pub struct PartialParse<T> {
    /// Records that passed every check, in response order.
    pub valid: Vec<T>,
    /// One `index N: message` line per rejected element, or a single
    /// description when the container itself was unusable.
    pub invalid: Vec<String>,
    /// Whether the response parsed and held a list at all.
    pub container_ok: bool,
}

impl<T> PartialParse<T> {
    fn broken(reason: String) -> Self {
        Self {
            valid: Vec::new(),
            invalid: vec![reason],
            container_ok: false,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.container_ok && self.invalid.is_empty()
    }
}

/// Remove a surrounding markdown code fence, if any.
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. "json") on the opening line.
    let body = match rest.find('\n') {
        Some(pos) => &rest[pos + 1..],
        None => rest,
    };
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}

/// Parse `raw` and keep every list element that deserializes into `T`,
/// passes [`Validate`], and passes the caller's `business` rule.
///
/// Never fails: an unusable response yields no records and one description.
pub fn parse_partial_list<T, F>(raw: &str, shape: ListShape<'_>, mut business: F) -> PartialParse<T>
where
    T: DeserializeOwned + Validate,
    F: FnMut(&T) -> std::result::Result<(), String>,
{
    let text = strip_code_fence(raw);
    if text.is_empty() {
        return PartialParse::broken("empty response".to_string());
    }

    let value: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => return PartialParse::broken(format!("invalid JSON: {}", truncate(&e.to_string()))),
    };

    let items = match (shape, value) {
        (_, Value::Array(items)) => items,
        (ListShape::Field(key), Value::Object(mut map)) => match map.remove(key) {
            Some(Value::Array(items)) => items,
            Some(other) => {
                return PartialParse::broken(format!(
                    "field '{}' is {}, expected a list",
                    key,
                    kind(&other)
                ))
            }
            None => return PartialParse::broken(format!("missing field '{}'", key)),
        },
        (_, other) => {
            return PartialParse::broken(format!("response is {}, expected a list", kind(&other)))
        }
    };

    let mut valid = Vec::with_capacity(items.len());
    let mut invalid = Vec::new();

    for (index, item) in items.into_iter().enumerate() {
        let checked = serde_json::from_value::<T>(item)
            .map_err(|e| e.to_string())
            .and_then(|record| record.validate().map(|_| record))
            .and_then(|record| business(&record).map(|_| record));

        match checked {
            Ok(record) => valid.push(record),
            Err(message) => invalid.push(format!("index {}: {}", index, truncate(&message))),
        }
    }

    PartialParse {
        valid,
        invalid,
        container_ok: true,
    }
}

fn truncate(message: &str) -> String {
    if message.chars().count() <= MAX_ERROR_CHARS {
        message.to_string()
    } else {
        message.chars().take(MAX_ERROR_CHARS).collect()
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}
