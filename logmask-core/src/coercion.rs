//! coercion.rs - Type-aware conversion of masking literals.
//!
//! Masking literals are configured as strings. When the value they replace
//! was numeric, boolean or null, these helpers convert the literal back into
//! that type family where possible. A literal that cannot be converted stays
//! a string.

use std::borrow::Cow;

use serde_json::{Number, Value};

/// Runtime type name of a value, using the same vocabulary as data-type masks.
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::String(_) => "string",
        Value::Number(n) if n.is_f64() => "double",
        Value::Number(_) => "integer",
        Value::Bool(_) => "boolean",
        Value::Null => "null",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// String form of a scalar, used for pattern matching. Containers and
/// `null` have no string form.
pub fn stringify(value: &Value) -> Option<Cow<'_, str>> {
    match value {
        Value::String(s) => Some(Cow::Borrowed(s.as_str())),
        Value::Number(n) => Some(Cow::Owned(n.to_string())),
        Value::Bool(b) => Some(Cow::Borrowed(if *b { "true" } else { "false" })),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Converts `literal` into the type family of `original`.
///
/// A literal that looks like a JSON array or object becomes that structure
/// regardless of the original type.
pub fn coerce_literal(original: &Value, literal: &str) -> Value {
    if let Some(structured) = parse_structured(literal) {
        return structured;
    }

    let trimmed = literal.trim();
    let coerced = match original {
        Value::Number(n) if n.is_f64() => trimmed
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number),
        Value::Number(_) => parse_integer(trimmed).or_else(|| {
            trimmed
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
        }),
        Value::Bool(_) => match trimmed.to_ascii_lowercase().as_str() {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            _ => None,
        },
        Value::Null if trimmed.eq_ignore_ascii_case("null") => Some(Value::Null),
        _ => None,
    };
    coerced.unwrap_or_else(|| Value::String(literal.to_string()))
}

/// Restores the original primitive type of a masked value when a strategy
/// produced a string for a non-string leaf.
pub fn preserve_type(original: &Value, masked: Value) -> Value {
    match (original, masked) {
        (Value::String(_), masked) => masked,
        (_, Value::String(s)) => coerce_literal(original, &s),
        (_, masked) => masked,
    }
}

fn parse_integer(s: &str) -> Option<Value> {
    if let Ok(i) = s.parse::<i64>() {
        return Some(Value::Number(i.into()));
    }
    s.parse::<u64>().ok().map(|u| Value::Number(u.into()))
}

fn parse_structured(literal: &str) -> Option<Value> {
    let trimmed = literal.trim();
    let looks_structured = (trimmed.starts_with('[') && trimmed.ends_with(']'))
        || (trimmed.starts_with('{') && trimmed.ends_with('}'));
    if !looks_structured {
        return None;
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(v @ (Value::Array(_) | Value::Object(_))) => Some(v),
        _ => None,
    }
}
