// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 opkg contributors

//! Content filters

use serde_json::Value;

use super::{strip_json_comments, FnTransform, TransformKind, TransformRegistry};
use crate::errors::{FlowError, FlowResult};

pub(super) fn register(registry: &mut TransformRegistry) {
    registry.register(Box::new(FnTransform::new(
        "filter-comments",
        TransformKind::Filter,
        "Strip // and /* */ comments from JSON text",
        filter_comments,
    )));
    registry.register(Box::new(FnTransform::new(
        "filter-empty",
        TransformKind::Filter,
        "Drop null, empty strings, empty arrays and empty objects",
        filter_empty,
    )));
    registry.register(Box::new(FnTransform::new(
        "filter-null",
        TransformKind::Filter,
        "Drop null members",
        filter_null,
    )));
    registry.register(Box::new(FnTransform::new(
        "filter-keys",
        TransformKind::Filter,
        "Keep only the object keys listed in the 'keys' option",
        filter_keys,
    )));
}

fn filter_comments(value: &Value, options: &Value) -> FlowResult<Value> {
    match value {
        Value::String(text) => Ok(Value::String(strip_json_comments(text))),
        other => Err(FlowError::transform(
            "filter-comments",
            format!("expected text, got {}", other),
            value,
            options,
        )),
    }
}

fn filter_empty(value: &Value, _options: &Value) -> FlowResult<Value> {
    Ok(prune(value, &is_empty).unwrap_or(Value::Null))
}

fn filter_null(value: &Value, _options: &Value) -> FlowResult<Value> {
    Ok(prune(value, &Value::is_null).unwrap_or(Value::Null))
}

fn filter_keys(value: &Value, options: &Value) -> FlowResult<Value> {
    let keys: Vec<&str> = options
        .get("keys")
        .and_then(Value::as_array)
        .map(|keys| keys.iter().filter_map(Value::as_str).collect())
        .ok_or_else(|| {
            FlowError::transform("filter-keys", "missing 'keys' option", value, options)
        })?;

    match value {
        Value::Object(map) => Ok(Value::Object(
            map.iter()
                .filter(|(k, _)| keys.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )),
        other => Err(FlowError::transform(
            "filter-keys",
            format!("expected an object, got {}", other),
            value,
            options,
        )),
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

/// Recursively remove members for which `drop` holds after pruning
fn prune(value: &Value, drop: &dyn Fn(&Value) -> bool) -> Option<Value> {
    let pruned = match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter_map(|(k, v)| prune(v, drop).map(|v| (k.clone(), v)))
                .collect(),
        ),
        Value::Array(items) => {
            Value::Array(items.iter().filter_map(|v| prune(v, drop)).collect())
        }
        other => other.clone(),
    };

    if drop(&pruned) {
        None
    } else {
        Some(pruned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_filter_empty_is_recursive() {
        let value = json!({"a": "", "b": {"c": []}, "d": [null, "x"], "e": 0});
        let registry = TransformRegistry::with_builtins();
        let out = registry.execute("filter-empty", &value, None).unwrap();
        assert_eq!(out, json!({"d": ["x"], "e": 0}));
    }

    #[test]
    fn test_filter_null_keeps_empty_strings() {
        let registry = TransformRegistry::with_builtins();
        let out = registry
            .execute("filter-null", &json!({"a": null, "b": ""}), None)
            .unwrap();
        assert_eq!(out, json!({"b": ""}));
    }

    #[test]
    fn test_filter_keys() {
        let registry = TransformRegistry::with_builtins();
        let out = registry
            .execute(
                "filter-keys",
                &json!({"name": "x", "mode": "primary"}),
                Some(&json!({"keys": ["name"]})),
            )
            .unwrap();
        assert_eq!(out, json!({"name": "x"}));
    }
}
