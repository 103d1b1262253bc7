// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 opkg contributors

//! Transform registry
//!
//! A fixed catalogue of named, pure value transforms. Every transform is a
//! function `(value, options) -> value`; none of them touch the
//! filesystem. Format codecs are symmetric and pick their direction from
//! an explicit `direction` option.

mod codecs;
mod filters;
mod markdown;
mod validate;
mod values;

pub use codecs::{strip_json_comments, CodecDirection, CODEC_NAMES};
pub use markdown::{extract_marked_section, upsert_marked_section};
pub(crate) use values::capitalize_str;

use serde_json::Value;
use std::collections::HashMap;

use crate::errors::{FlowError, FlowResult};

/// Broad family a transform belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformKind {
    /// Symmetric format codec (parse/serialize)
    Codec,
    /// Drops data (comments, empty values, ...)
    Filter,
    /// Markdown splitting
    Markdown,
    /// Type, string, array or object reshaping
    Value,
    /// Rejects out-of-domain input without changing it
    Validation,
}

impl std::fmt::Display for TransformKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Codec => write!(f, "codec"),
            Self::Filter => write!(f, "filter"),
            Self::Markdown => write!(f, "markdown"),
            Self::Value => write!(f, "value"),
            Self::Validation => write!(f, "validation"),
        }
    }
}

/// Trait for registry transforms
pub trait Transform: Send + Sync {
    /// Registered name
    fn name(&self) -> &str;

    /// Family of this transform
    fn kind(&self) -> TransformKind;

    /// One-line description for listings
    fn description(&self) -> &str;

    /// Apply the transform
    ///
    /// Implementations must be pure and report bad input through
    /// [`FlowError::Transform`], carrying the original value and options.
    fn apply(&self, value: &Value, options: &Value) -> FlowResult<Value>;
}

/// Signature of the built-in transform functions
pub type TransformFn = fn(&Value, &Value) -> FlowResult<Value>;

/// A transform backed by a plain function
pub struct FnTransform {
    name: &'static str,
    kind: TransformKind,
    description: &'static str,
    func: TransformFn,
}

impl FnTransform {
    pub const fn new(
        name: &'static str,
        kind: TransformKind,
        description: &'static str,
        func: TransformFn,
    ) -> Self {
        Self {
            name,
            kind,
            description,
            func,
        }
    }
}

impl Transform for FnTransform {
    fn name(&self) -> &str {
        self.name
    }

    fn kind(&self) -> TransformKind {
        self.kind
    }

    fn description(&self) -> &str {
        self.description
    }

    fn apply(&self, value: &Value, options: &Value) -> FlowResult<Value> {
        (self.func)(value, options)
    }
}

/// Registry of named transforms
pub struct TransformRegistry {
    transforms: HashMap<String, Box<dyn Transform>>,
}

impl TransformRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            transforms: HashMap::new(),
        }
    }

    /// Create a registry holding every built-in transform
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        codecs::register(&mut registry);
        filters::register(&mut registry);
        markdown::register(&mut registry);
        values::register(&mut registry);
        validate::register(&mut registry);
        registry
    }

    /// Register a transform, replacing any previous one with the same name
    pub fn register(&mut self, transform: Box<dyn Transform>) {
        self.transforms.insert(transform.name().to_string(), transform);
    }

    /// Look up a transform by name
    pub fn get(&self, name: &str) -> Option<&dyn Transform> {
        self.transforms.get(name).map(|t| t.as_ref())
    }

    /// Whether a transform is registered
    pub fn contains(&self, name: &str) -> bool {
        self.transforms.contains_key(name)
    }

    /// Family of a registered transform
    pub fn kind(&self, name: &str) -> Option<TransformKind> {
        self.get(name).map(|t| t.kind())
    }

    /// Sorted list of registered transforms
    pub fn list(&self) -> Vec<&dyn Transform> {
        let mut all: Vec<&dyn Transform> = self.transforms.values().map(|t| t.as_ref()).collect();
        all.sort_by(|a, b| a.name().cmp(b.name()));
        all
    }

    /// Execute a transform by name
    pub fn execute(&self, name: &str, value: &Value, options: Option<&Value>) -> FlowResult<Value> {
        let transform = self.get(name).ok_or_else(|| FlowError::UnknownTransform {
            name: name.to_string(),
        })?;

        let empty = Value::Object(serde_json::Map::new());
        let options = options.unwrap_or(&empty);
        tracing::trace!("Applying transform '{}'", name);
        transform.apply(value, options)
    }

    /// Run a codec in the given direction
    pub fn run_codec(&self, codec: &str, value: &Value, direction: CodecDirection) -> FlowResult<Value> {
        let options = serde_json::json!({ "direction": direction.to_string() });
        self.execute(codec, value, Some(&options))
    }
}

impl Default for TransformRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

/// Read a string option
pub(crate) fn string_option<'a>(options: &'a Value, key: &str) -> Option<&'a str> {
    options.get(key).and_then(Value::as_str)
}

/// Apply a string function to a string or to each string of an array
pub(crate) fn map_strings(
    name: &str,
    value: &Value,
    options: &Value,
    f: impl Fn(&str) -> String,
) -> FlowResult<Value> {
    match value {
        Value::String(s) => Ok(Value::String(f(s))),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => Ok(Value::String(f(s))),
                other => Err(FlowError::transform(
                    name,
                    format!("expected string array element, got {}", other),
                    value,
                    options,
                )),
            })
            .collect::<FlowResult<Vec<_>>>()
            .map(Value::Array),
        Value::Null => Ok(Value::Null),
        other => Err(FlowError::transform(
            name,
            format!("expected a string, got {}", other),
            value,
            options,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builtins_registered() {
        let registry = TransformRegistry::with_builtins();
        for name in ["jsonc", "yaml", "toml", "filter-empty", "markdown-body", "number", "validate"] {
            assert!(registry.contains(name), "missing builtin '{}'", name);
        }
        assert_eq!(registry.kind("yaml"), Some(TransformKind::Codec));
        assert_eq!(registry.kind("validate"), Some(TransformKind::Validation));
    }

    #[test]
    fn test_unknown_transform() {
        let registry = TransformRegistry::with_builtins();
        let err = registry.execute("does-not-exist", &json!(1), None).unwrap_err();
        assert!(matches!(err, FlowError::UnknownTransform { .. }));
    }

    #[test]
    fn test_custom_transform() {
        fn double(value: &Value, _options: &Value) -> FlowResult<Value> {
            Ok(json!(value.as_i64().unwrap_or(0) * 2))
        }

        let mut registry = TransformRegistry::new();
        registry.register(Box::new(FnTransform::new(
            "double",
            TransformKind::Value,
            "Double a number",
            double,
        )));

        assert_eq!(registry.execute("double", &json!(21), None).unwrap(), json!(42));
        assert_eq!(registry.list().len(), 1);
    }
}
