// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 opkg contributors

//! Symmetric format codecs
//!
//! Each codec parses a string into a structured value or serializes a
//! structured value into a string, depending on the `direction` option.

use serde_json::Value;

use super::{string_option, FnTransform, TransformKind, TransformRegistry};
use crate::errors::{FlowError, FlowResult};

/// Names of every registered codec
pub const CODEC_NAMES: &[&str] = &["json", "jsonc", "yaml", "toml"];

/// Which way a codec runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecDirection {
    /// String to structured value
    Parse,
    /// Structured value to string
    Serialize,
}

impl std::fmt::Display for CodecDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse => write!(f, "parse"),
            Self::Serialize => write!(f, "serialize"),
        }
    }
}

impl std::str::FromStr for CodecDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "parse" | "read" => Ok(Self::Parse),
            "serialize" | "write" => Ok(Self::Serialize),
            _ => Err(format!("Unknown codec direction: {}", s)),
        }
    }
}

pub(super) fn register(registry: &mut TransformRegistry) {
    registry.register(Box::new(FnTransform::new(
        "json",
        TransformKind::Codec,
        "Strict JSON parse/serialize",
        json_codec,
    )));
    registry.register(Box::new(FnTransform::new(
        "jsonc",
        TransformKind::Codec,
        "JSON with comments and trailing commas",
        jsonc_codec,
    )));
    registry.register(Box::new(FnTransform::new(
        "yaml",
        TransformKind::Codec,
        "YAML parse/serialize",
        yaml_codec,
    )));
    registry.register(Box::new(FnTransform::new(
        "toml",
        TransformKind::Codec,
        "TOML parse/serialize",
        toml_codec,
    )));
}

fn direction(name: &str, value: &Value, options: &Value) -> FlowResult<CodecDirection> {
    let raw = string_option(options, "direction").ok_or_else(|| {
        FlowError::transform(name, "missing 'direction' option (parse or serialize)", value, options)
    })?;
    raw.parse()
        .map_err(|e: String| FlowError::transform(name, e, value, options))
}

fn input_text<'a>(name: &str, value: &'a Value, options: &Value) -> FlowResult<&'a str> {
    value
        .as_str()
        .ok_or_else(|| FlowError::transform(name, "parse expects a string", value, options))
}

fn json_codec(value: &Value, options: &Value) -> FlowResult<Value> {
    match direction("json", value, options)? {
        CodecDirection::Parse => {
            let text = input_text("json", value, options)?;
            if text.trim().is_empty() {
                return Ok(Value::Object(serde_json::Map::new()));
            }
            serde_json::from_str(text)
                .map_err(|e| FlowError::transform("json", e.to_string(), value, options))
        }
        CodecDirection::Serialize => serialize_json("json", value, options),
    }
}

fn jsonc_codec(value: &Value, options: &Value) -> FlowResult<Value> {
    match direction("jsonc", value, options)? {
        CodecDirection::Parse => {
            let text = strip_json_comments(input_text("jsonc", value, options)?);
            if text.trim().is_empty() {
                return Ok(Value::Object(serde_json::Map::new()));
            }
            serde_json::from_str(&text)
                .map_err(|e| FlowError::transform("jsonc", e.to_string(), value, options))
        }
        CodecDirection::Serialize => serialize_json("jsonc", value, options),
    }
}

fn serialize_json(name: &str, value: &Value, options: &Value) -> FlowResult<Value> {
    serde_json::to_string_pretty(value)
        .map(|s| Value::String(format!("{s}\n")))
        .map_err(|e| FlowError::transform(name, e.to_string(), value, options))
}

fn yaml_codec(value: &Value, options: &Value) -> FlowResult<Value> {
    match direction("yaml", value, options)? {
        CodecDirection::Parse => {
            let text = input_text("yaml", value, options)?;
            if text.trim().is_empty() {
                return Ok(Value::Object(serde_json::Map::new()));
            }
            serde_yaml::from_str(text)
                .map_err(|e| FlowError::transform("yaml", e.to_string(), value, options))
        }
        CodecDirection::Serialize => serde_yaml::to_string(value)
            .map(Value::String)
            .map_err(|e| FlowError::transform("yaml", e.to_string(), value, options)),
    }
}

fn toml_codec(value: &Value, options: &Value) -> FlowResult<Value> {
    match direction("toml", value, options)? {
        CodecDirection::Parse => {
            let text = input_text("toml", value, options)?;
            toml::from_str(text)
                .map_err(|e| FlowError::transform("toml", e.to_string(), value, options))
        }
        CodecDirection::Serialize => {
            if !value.is_object() {
                return Err(FlowError::transform(
                    "toml",
                    "TOML documents must be tables",
                    value,
                    options,
                ));
            }
            toml::to_string_pretty(&strip_nulls(value))
                .map(Value::String)
                .map_err(|e| FlowError::transform("toml", e.to_string(), value, options))
        }
    }
}

/// TOML has no null; drop null members before serializing
fn strip_nulls(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k.clone(), strip_nulls(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items.iter().filter(|v| !v.is_null()).map(strip_nulls).collect(),
        ),
        other => other.clone(),
    }
}

/// Remove `//` and `/* */` comments and trailing commas from JSON text
///
/// String literals are left untouched.
pub fn strip_json_comments(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut i = 0;
    let mut in_string = false;

    while i < chars.len() {
        let c = chars[i];

        if in_string {
            out.push(c);
            if c == '\\' && i + 1 < chars.len() {
                out.push(chars[i + 1]);
                i += 2;
                continue;
            }
            if c == '"' {
                in_string = false;
            }
            i += 1;
            continue;
        }

        match (c, chars.get(i + 1)) {
            ('"', _) => {
                in_string = true;
                out.push(c);
                i += 1;
            }
            ('/', Some('/')) => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            ('/', Some('*')) => {
                i += 2;
                while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                    i += 1;
                }
                i += 2;
            }
            (',', _) => {
                if !matches!(next_significant(&chars, i + 1), Some('}') | Some(']')) {
                    out.push(c);
                }
                i += 1;
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }

    out
}

/// First character at or after `start` that is neither whitespace nor inside a comment
fn next_significant(chars: &[char], start: usize) -> Option<char> {
    let mut i = start;
    while i < chars.len() {
        match (chars[i], chars.get(i + 1)) {
            (c, _) if c.is_whitespace() => i += 1,
            ('/', Some('/')) => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            ('/', Some('*')) => {
                i += 2;
                while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                    i += 1;
                }
                i += 2;
            }
            (c, _) => return Some(c),
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(name: &str, text: &str) -> FlowResult<Value> {
        let registry = TransformRegistry::with_builtins();
        registry.run_codec(name, &json!(text), CodecDirection::Parse)
    }

    #[test]
    fn test_jsonc_comments_and_trailing_commas() {
        let text = r#"{
  // servers
  "servers": {
    "fs": { "command": "npx", "url": "http://x//y" }, /* inline */
  },
}"#;
        let value = parse("jsonc", text).unwrap();
        assert_eq!(value["servers"]["fs"]["url"], "http://x//y");
    }

    #[test]
    fn test_jsonc_many_commented_entries() {
        let mut text = String::from("{\n");
        for n in 0..50 {
            text.push_str(&format!("  \"k{}\": {}, // note {}\n", n, n, n));
        }
        text.push_str("  \"last\": 0, /* end */\n}\n");

        let stripped = strip_json_comments(&text);
        let value: Value = serde_json::from_str(&stripped).unwrap();
        assert_eq!(value["k49"], 49);
        assert_eq!(value["last"], 0);
        assert_eq!(value.as_object().unwrap().len(), 51);
    }

    #[test]
    fn test_direction_is_required() {
        let registry = TransformRegistry::with_builtins();
        let err = registry.execute("yaml", &json!("a: 1"), None).unwrap_err();
        assert!(err.to_string().contains("direction"));
    }

    #[test]
    fn test_yaml_symmetry() {
        let registry = TransformRegistry::with_builtins();
        let value = json!({"name": "x", "tags": ["a", "b"]});
        let text = registry
            .run_codec("yaml", &value, CodecDirection::Serialize)
            .unwrap();
        let back = registry.run_codec("yaml", &text, CodecDirection::Parse).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn test_toml_serialize_requires_table() {
        let registry = TransformRegistry::with_builtins();
        let err = registry
            .run_codec("toml", &json!([1, 2]), CodecDirection::Serialize)
            .unwrap_err();
        assert!(matches!(err, FlowError::Transform { .. }));

        let text = registry
            .run_codec("toml", &json!({"a": {"b": 1, "c": null}}), CodecDirection::Serialize)
            .unwrap();
        assert!(text.as_str().unwrap().contains("b = 1"));
    }

    #[test]
    fn test_invalid_json_reports_input() {
        let err = parse("json", "{ nope").unwrap_err();
        match err {
            FlowError::Transform { transform, value, .. } => {
                assert_eq!(transform, "json");
                assert_eq!(value, json!("{ nope"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
