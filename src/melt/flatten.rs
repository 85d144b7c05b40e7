//! Row flattening
//!
//! Nested objects collapse into one level, their keys joined with `_`.
//! Arrays and scalars are kept as values.

use crate::melt::types::KeyTuple;
use serde_json::{Map, Value};

/// Flatten `source`, skipping every top-level key listed in `drop`.
pub fn flatten(source: &Map<String, Value>, drop: &[String]) -> Map<String, Value> {
    let mut out = Map::new();
    for (key, value) in source {
        if drop.contains(key) {
            continue;
        }
        flatten_into(key.clone(), value, &mut out);
    }
    out
}

fn flatten_into(prefix: String, value: &Value, out: &mut Map<String, Value>) {
    match value {
        Value::Object(obj) => {
            for (key, nested) in obj {
                flatten_into(format!("{}_{}", prefix, key), nested, out);
            }
        }
        other => {
            out.insert(prefix, other.clone());
        }
    }
}

pub fn is_blank(value: &Value) -> bool {
    matches!(value, Value::String(s) if s.trim().is_empty())
}

/// Blank strings become null.
pub fn nullify_blank(value: Value) -> Value {
    if is_blank(&value) {
        Value::Null
    } else {
        value
    }
}

/// Flatten, add the key pairs, then null out blank strings.
pub fn make_row(source: &Map<String, Value>, key: &KeyTuple, drop: &[String]) -> Map<String, Value> {
    let mut row = flatten(source, drop);
    key.merge_into(&mut row);
    row.into_iter()
        .map(|(k, v)| (k, nullify_blank(v)))
        .collect()
}
