// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 opkg contributors

//! Merge strategies for existing target content

use serde_json::{Map, Value};

use super::definition::MergeStrategy;
use crate::errors::{FlowError, FlowResult};

/// Combine `existing` target content with `incoming` flow output
///
/// `owned` lists the keys (at the composite ownership level) this flow is
/// known to own from a previous install; those not present in `incoming`
/// are removed.
pub fn merge(
    strategy: &MergeStrategy,
    existing: &Value,
    incoming: &Value,
    scope: Option<&str>,
    owned: &[String],
) -> FlowResult<Value> {
    match strategy {
        MergeStrategy::Deep => deep_merge(existing, incoming, ""),
        MergeStrategy::Shallow => Ok(shallow_merge(existing, incoming)),
        MergeStrategy::Replace => Ok(incoming.clone()),
        MergeStrategy::Composite => Ok(composite_merge(existing, incoming, scope, owned)),
        MergeStrategy::Unknown(name) => Err(FlowError::InvalidFlow {
            violations: vec![format!("unknown merge strategy '{}'", name)],
        }),
    }
}

/// Recursive key union; incoming scalars win, arrays are replaced
pub fn deep_merge(existing: &Value, incoming: &Value, path: &str) -> FlowResult<Value> {
    match (existing, incoming) {
        (Value::Object(old), Value::Object(new)) => {
            let mut out = old.clone();
            for (key, value) in new {
                let child_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", path, key)
                };
                let merged = match old.get(key) {
                    Some(current) => deep_merge(current, value, &child_path)?,
                    None => value.clone(),
                };
                out.insert(key.clone(), merged);
            }
            Ok(Value::Object(out))
        }
        (Value::Array(_), Value::Object(_)) | (Value::Object(_), Value::Array(_)) => {
            Err(FlowError::MergeConflict {
                path: if path.is_empty() { "<root>".into() } else { path.to_string() },
                existing: shape(existing).into(),
                incoming: shape(incoming).into(),
            })
        }
        (_, new) => Ok(new.clone()),
    }
}

/// Top-level key union
pub fn shallow_merge(existing: &Value, incoming: &Value) -> Value {
    match (existing, incoming) {
        (Value::Object(old), Value::Object(new)) => {
            let mut out = old.clone();
            for (key, value) in new {
                out.insert(key.clone(), value.clone());
            }
            Value::Object(out)
        }
        (_, new) => new.clone(),
    }
}

/// Replace only owned keys, keep foreign keys verbatim
///
/// With a `scope`, ownership applies to the keys of that top-level object
/// (the flow's `embed` key) and every other top-level key is preserved.
pub fn composite_merge(existing: &Value, incoming: &Value, scope: Option<&str>, owned: &[String]) -> Value {
    let Value::Object(old) = existing else {
        return incoming.clone();
    };
    let Value::Object(new) = incoming else {
        return incoming.clone();
    };

    match scope {
        Some(key) => {
            let mut out = old.clone();
            let empty = Value::Object(Map::new());
            let old_scope = old.get(key).unwrap_or(&empty);
            let new_scope = new.get(key).unwrap_or(&empty);
            out.insert(key.to_string(), replace_owned(old_scope, new_scope, owned));
            for (k, v) in new {
                if k != key {
                    out.insert(k.clone(), v.clone());
                }
            }
            Value::Object(out)
        }
        None => replace_owned(existing, incoming, owned),
    }
}

fn replace_owned(existing: &Value, incoming: &Value, owned: &[String]) -> Value {
    let (Value::Object(old), Value::Object(new)) = (existing, incoming) else {
        return incoming.clone();
    };

    let mut out: Map<String, Value> = old
        .iter()
        .filter(|(k, _)| new.contains_key(*k) || !owned.contains(k))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    for (key, value) in new {
        out.insert(key.clone(), value.clone());
    }
    Value::Object(out)
}

/// Keys a composite write owns, for recording in the workspace index
pub fn owned_keys(incoming: &Value, scope: Option<&str>) -> Vec<String> {
    let target = match scope {
        Some(key) => incoming.get(key),
        None => Some(incoming),
    };
    target
        .and_then(Value::as_object)
        .map(|map| map.keys().cloned().collect())
        .unwrap_or_default()
}

fn shape(value: &Value) -> &'static str {
    match value {
        Value::Object(_) => "object",
        Value::Array(_) => "array",
        Value::String(_) => "string",
        Value::Number(_) => "number",
        Value::Bool(_) => "boolean",
        Value::Null => "null",
    }
}
