//! Custom filters available to policy templates
//!
//! - `default`: fallback for undefined or none values
//! - `base64_encode` / `base64_decode`: Secret data helpers
//! - `required`: fail the render if a value is missing
//! - `upper` / `lower`: case conversion
//! - `range_pairs`: index/value or key/value pairs for Go `range` actions

use base64::{engine::general_purpose::STANDARD, Engine};
use minijinja::value::ValueKind;
use minijinja::{Error, ErrorKind, Value};

/// Returns the fallback if the value is undefined or none
///
/// Usage: `{{ Extra.shell | default("/bin/bash") }}`
pub fn default_filter(value: Value, fallback: Value) -> Value {
    if value.is_undefined() || value.is_none() {
        fallback
    } else {
        value
    }
}

/// Usage: `{{ Username | base64_encode }}`
pub fn base64_encode(value: &str) -> String {
    STANDARD.encode(value.as_bytes())
}

/// Usage: `{{ token | base64_decode }}`
pub fn base64_decode(value: &str) -> Result<String, Error> {
    let bytes = STANDARD.decode(value).map_err(|e| {
        Error::new(
            ErrorKind::InvalidOperation,
            format!("base64 decode error: {}", e),
        )
    })?;
    String::from_utf8(bytes).map_err(|e| {
        Error::new(
            ErrorKind::InvalidOperation,
            format!("base64 decode produced invalid UTF-8: {}", e),
        )
    })
}

/// Fails if the value is undefined
///
/// Usage: `{{ UID | required }}`
pub fn required(value: Value) -> Result<Value, Error> {
    if value.is_undefined() {
        Err(Error::new(
            ErrorKind::UndefinedError,
            "required value is undefined",
        ))
    } else {
        Ok(value)
    }
}

/// Usage: `{{ Username | upper }}`
pub fn upper(value: &str) -> String {
    value.to_uppercase()
}

/// Usage: `{{ Username | lower }}`
pub fn lower(value: &str) -> String {
    value.to_lowercase()
}

/// Pairs a list with its indices or a map with its keys. Missing values
/// range over nothing, as a nil slice does in Go.
pub fn range_pairs(value: Value) -> Result<Vec<Value>, Error> {
    match value.kind() {
        ValueKind::Undefined | ValueKind::None => Ok(Vec::new()),
        ValueKind::Map => value
            .try_iter()?
            .map(|key| {
                let item = value.get_item(&key)?;
                Ok(Value::from(vec![key, item]))
            })
            .collect(),
        ValueKind::Seq | ValueKind::Iterable => Ok(value
            .try_iter()?
            .enumerate()
            .map(|(i, item)| Value::from(vec![Value::from(i), item]))
            .collect()),
        _ => Err(Error::new(
            ErrorKind::InvalidOperation,
            format!("range can't iterate over {}", value),
        )),
    }
}
