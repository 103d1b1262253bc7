// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 opkg contributors

//! Validation transforms
//!
//! These pass their input through unchanged or fail with a transform error.

use regex::Regex;
use serde_json::Value;

use super::{string_option, FnTransform, TransformKind, TransformRegistry};
use crate::errors::{FlowError, FlowResult};

pub(super) fn register(registry: &mut TransformRegistry) {
    registry.register(Box::new(FnTransform::new(
        "validate",
        TransformKind::Validation,
        "Check type, enum, pattern and required keys",
        validate,
    )));
    registry.register(Box::new(FnTransform::new(
        "validate-required",
        TransformKind::Validation,
        "Fail on null or empty values",
        validate_required,
    )));
}

/// JSON type name of a value
pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn type_matches(expected: &str, value: &Value) -> bool {
    let actual = type_name(value);
    actual == expected || (expected == "number" && actual == "integer")
}

fn validate(value: &Value, options: &Value) -> FlowResult<Value> {
    let fail = |message: String| FlowError::transform("validate", message, value, options);

    if let Some(expected) = string_option(options, "type") {
        if !type_matches(expected, value) {
            return Err(fail(format!("expected {}, got {}", expected, type_name(value))));
        }
    }

    if let Some(allowed) = options.get("enum").and_then(Value::as_array) {
        if !allowed.contains(value) {
            return Err(fail(format!("{} is not one of {}", value, Value::Array(allowed.clone()))));
        }
    }

    if let Some(pattern) = string_option(options, "pattern") {
        let re = Regex::new(pattern).map_err(|e| fail(format!("invalid pattern: {}", e)))?;
        let text = value
            .as_str()
            .ok_or_else(|| fail("pattern checks need a string".to_string()))?;
        if !re.is_match(text) {
            return Err(fail(format!("'{}' does not match /{}/", text, pattern)));
        }
    }

    if let Some(required) = options.get("required").and_then(Value::as_array) {
        let object = value
            .as_object()
            .ok_or_else(|| fail("required keys need an object".to_string()))?;
        let missing: Vec<&str> = required
            .iter()
            .filter_map(Value::as_str)
            .filter(|key| !object.contains_key(*key))
            .collect();
        if !missing.is_empty() {
            return Err(fail(format!("missing required keys: {}", missing.join(", "))));
        }
    }

    Ok(value.clone())
}

fn validate_required(value: &Value, options: &Value) -> FlowResult<Value> {
    let empty = match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    };
    if empty {
        return Err(FlowError::transform("validate-required", "value is empty", value, options));
    }
    Ok(value.clone())
}
