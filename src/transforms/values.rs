// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 opkg contributors

//! Type, string, array and object transforms

use serde_json::{Map, Number, Value};

use super::{map_strings, string_option, FnTransform, TransformKind, TransformRegistry};
use crate::errors::{FlowError, FlowResult};

pub(super) fn register(registry: &mut TransformRegistry) {
    let builtins: &[(&'static str, &'static str, super::TransformFn)] = &[
        // Types
        ("number", "Convert numeric strings to numbers", to_number),
        ("boolean", "Convert true/false/yes/no/1/0 to booleans", to_boolean),
        ("string", "Render scalars as strings", to_string),
        ("array", "Wrap a non-array value in an array", to_array),
        // Strings
        ("trim", "Trim surrounding whitespace", trim),
        ("uppercase", "Uppercase text", uppercase),
        ("lowercase", "Lowercase text", lowercase),
        ("capitalize", "Uppercase the first character", capitalize),
        ("slugify", "Lowercase kebab-case identifier", slugify),
        // Arrays
        ("comma-split", "Split a comma separated string into an array", comma_split),
        ("comma-join", "Join an array into a comma separated string", comma_join),
        ("array-unique", "Drop repeated array elements", array_unique),
        ("array-flatten", "Flatten one level of nested arrays", array_flatten),
        ("array-sort", "Sort string or number arrays", array_sort),
        // Objects
        ("object-keys", "Object to the array of its keys", object_keys),
        ("object-values", "Object to the array of its values", object_values),
        ("object-entries", "Object to an array of [key, value] pairs", object_entries),
        ("object-from-entries", "Array of [key, value] pairs to an object", object_from_entries),
        ("object-sort-keys", "Sort object keys alphabetically", object_sort_keys),
    ];

    for &(name, description, func) in builtins {
        registry.register(Box::new(FnTransform::new(
            name,
            TransformKind::Value,
            description,
            func,
        )));
    }
}

fn fail(name: &str, message: impl Into<String>, value: &Value, options: &Value) -> FlowError {
    FlowError::transform(name, message, value, options)
}

// ─────────────────────────────────────────────────────────────────────────────
// Types
// ─────────────────────────────────────────────────────────────────────────────

fn to_number(value: &Value, options: &Value) -> FlowResult<Value> {
    match value {
        Value::Number(_) => Ok(value.clone()),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(i) = s.parse::<i64>() {
                return Ok(Value::Number(i.into()));
            }
            s.parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| fail("number", format!("'{}' is not numeric", s), value, options))
        }
        Value::Bool(b) => Ok(Value::Number(i64::from(*b).into())),
        other => Err(fail("number", format!("cannot convert {} to a number", other), value, options)),
    }
}

fn to_boolean(value: &Value, options: &Value) -> FlowResult<Value> {
    match value {
        Value::Bool(_) => Ok(value.clone()),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Ok(Value::Bool(true)),
            "false" | "no" | "off" | "0" | "" => Ok(Value::Bool(false)),
            _ => Err(fail("boolean", format!("'{}' is not a boolean", s), value, options)),
        },
        Value::Number(n) => Ok(Value::Bool(n.as_f64().is_some_and(|f| f != 0.0))),
        Value::Null => Ok(Value::Bool(false)),
        other => Err(fail("boolean", format!("cannot convert {} to a boolean", other), value, options)),
    }
}

fn to_string(value: &Value, _options: &Value) -> FlowResult<Value> {
    Ok(match value {
        Value::String(_) => value.clone(),
        Value::Null => Value::String(String::new()),
        other => Value::String(other.to_string()),
    })
}

fn to_array(value: &Value, _options: &Value) -> FlowResult<Value> {
    Ok(match value {
        Value::Array(_) => value.clone(),
        Value::Null => Value::Array(vec![]),
        other => Value::Array(vec![other.clone()]),
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Strings
// ─────────────────────────────────────────────────────────────────────────────

fn trim(value: &Value, options: &Value) -> FlowResult<Value> {
    map_strings("trim", value, options, |s| s.trim().to_string())
}

fn uppercase(value: &Value, options: &Value) -> FlowResult<Value> {
    map_strings("uppercase", value, options, str::to_uppercase)
}

fn lowercase(value: &Value, options: &Value) -> FlowResult<Value> {
    map_strings("lowercase", value, options, str::to_lowercase)
}

fn capitalize(value: &Value, options: &Value) -> FlowResult<Value> {
    map_strings("capitalize", value, options, capitalize_str)
}

/// Uppercase the first character, leave the rest untouched
pub(crate) fn capitalize_str(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn slugify(value: &Value, options: &Value) -> FlowResult<Value> {
    map_strings("slugify", value, options, |s| {
        let mut slug = String::with_capacity(s.len());
        let mut dash = false;
        for c in s.chars() {
            if c.is_ascii_alphanumeric() {
                slug.push(c.to_ascii_lowercase());
                dash = false;
            } else if !dash && !slug.is_empty() {
                slug.push('-');
                dash = true;
            }
        }
        slug.trim_end_matches('-').to_string()
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Arrays
// ─────────────────────────────────────────────────────────────────────────────

fn comma_split(value: &Value, options: &Value) -> FlowResult<Value> {
    let sep = string_option(options, "separator").unwrap_or(",");
    match value {
        Value::String(s) => Ok(Value::Array(
            s.split(sep)
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(|part| Value::String(part.to_string()))
                .collect(),
        )),
        Value::Array(_) => Ok(value.clone()),
        other => Err(fail("comma-split", format!("expected a string, got {}", other), value, options)),
    }
}

fn comma_join(value: &Value, options: &Value) -> FlowResult<Value> {
    let sep = string_option(options, "separator").unwrap_or(", ");
    match value {
        Value::Array(items) => {
            let parts: Vec<String> = items
                .iter()
                .map(|item| match item {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect();
            Ok(Value::String(parts.join(sep)))
        }
        Value::String(_) => Ok(value.clone()),
        other => Err(fail("comma-join", format!("expected an array, got {}", other), value, options)),
    }
}

fn expect_array<'a>(name: &str, value: &'a Value, options: &Value) -> FlowResult<&'a Vec<Value>> {
    value
        .as_array()
        .ok_or_else(|| fail(name, format!("expected an array, got {}", value), value, options))
}

fn array_unique(value: &Value, options: &Value) -> FlowResult<Value> {
    let items = expect_array("array-unique", value, options)?;
    let mut out: Vec<Value> = Vec::with_capacity(items.len());
    for item in items {
        if !out.contains(item) {
            out.push(item.clone());
        }
    }
    Ok(Value::Array(out))
}

fn array_flatten(value: &Value, options: &Value) -> FlowResult<Value> {
    let items = expect_array("array-flatten", value, options)?;
    let mut out = Vec::new();
    for item in items {
        match item {
            Value::Array(inner) => out.extend(inner.iter().cloned()),
            other => out.push(other.clone()),
        }
    }
    Ok(Value::Array(out))
}

fn array_sort(value: &Value, options: &Value) -> FlowResult<Value> {
    let items = expect_array("array-sort", value, options)?;
    let mut out = items.clone();
    if out.iter().all(Value::is_string) {
        out.sort_by(|a, b| a.as_str().cmp(&b.as_str()));
    } else if out.iter().all(Value::is_number) {
        out.sort_by(|a, b| {
            let (a, b) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
            a.partial_cmp(&b).unwrap_or(std::cmp::Ordering::Equal)
        });
    } else {
        return Err(fail("array-sort", "can only sort all-string or all-number arrays", value, options));
    }
    Ok(Value::Array(out))
}

// ─────────────────────────────────────────────────────────────────────────────
// Objects
// ─────────────────────────────────────────────────────────────────────────────

fn expect_object<'a>(name: &str, value: &'a Value, options: &Value) -> FlowResult<&'a Map<String, Value>> {
    value
        .as_object()
        .ok_or_else(|| fail(name, format!("expected an object, got {}", value), value, options))
}

fn object_keys(value: &Value, options: &Value) -> FlowResult<Value> {
    let map = expect_object("object-keys", value, options)?;
    Ok(Value::Array(map.keys().cloned().map(Value::String).collect()))
}

fn object_values(value: &Value, options: &Value) -> FlowResult<Value> {
    let map = expect_object("object-values", value, options)?;
    Ok(Value::Array(map.values().cloned().collect()))
}

fn object_entries(value: &Value, options: &Value) -> FlowResult<Value> {
    let map = expect_object("object-entries", value, options)?;
    Ok(Value::Array(
        map.iter()
            .map(|(k, v)| Value::Array(vec![Value::String(k.clone()), v.clone()]))
            .collect(),
    ))
}

fn object_from_entries(value: &Value, options: &Value) -> FlowResult<Value> {
    let items = expect_array("object-from-entries", value, options)?;
    let mut map = Map::new();
    for item in items {
        match item.as_array().map(Vec::as_slice) {
            Some([Value::String(k), v]) => {
                map.insert(k.clone(), v.clone());
            }
            _ => {
                return Err(fail(
                    "object-from-entries",
                    format!("expected a [key, value] pair, got {}", item),
                    value,
                    options,
                ))
            }
        }
    }
    Ok(Value::Object(map))
}

fn object_sort_keys(value: &Value, options: &Value) -> FlowResult<Value> {
    let map = expect_object("object-sort-keys", value, options)?;
    let mut entries: Vec<_> = map.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    Ok(Value::Object(
        entries.into_iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
    ))
}
