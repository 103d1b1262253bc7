// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 opkg contributors

//! Map operations and transform steps

use regex::RegexBuilder;
use serde_json::{Map, Value};

use super::definition::{FilterPredicate, MapFn, Operation, ReplaceSpec, TransformStep};
use super::fields;
use crate::errors::{FlowError, FlowResult};
use crate::switch::SwitchResolver;
use crate::transforms::{capitalize_str, TransformRegistry};

/// Apply operations in order, each seeing the previous one's output
pub fn apply_operations(
    fields: &mut Map<String, Value>,
    operations: &[Operation],
    registry: &TransformRegistry,
) -> FlowResult<()> {
    for operation in operations {
        apply_operation(fields, operation, registry)?;
    }
    Ok(())
}

fn apply_operation(
    map: &mut Map<String, Value>,
    operation: &Operation,
    registry: &TransformRegistry,
) -> FlowResult<()> {
    match operation {
        Operation::Rename(mapping) => {
            for (old, new) in mapping {
                rename(map, old, new);
            }
        }
        Operation::Set { path, value } => fields::set(map, path, value.clone()),
        Operation::Unset(path) => {
            fields::remove(map, path);
        }
        Operation::Switch(expr) => {
            let Some(current) = fields::get(map, &expr.field) else {
                return Ok(());
            };
            match SwitchResolver::select(expr, current) {
                Some(value) => {
                    let value = value.clone();
                    fields::set(map, &expr.field, value);
                }
                None => {
                    tracing::debug!("No $switch case for field '{}', leaving it unchanged", expr.field);
                }
            }
        }
        Operation::Transform { field, steps } => {
            if let Some(current) = fields::get(map, field) {
                let value = apply_steps(current.clone(), steps)?;
                fields::set(map, field, value);
            }
        }
        Operation::Copy { from, to, transform } => {
            if let Some(value) = fields::get(map, from) {
                let value = match transform {
                    Some(name) => registry.execute(name, value, None)?,
                    None => value.clone(),
                };
                fields::set(map, to, value);
            }
        }
    }
    Ok(())
}

/// Rename a field, keeping top-level key order
fn rename(map: &mut Map<String, Value>, old: &str, new: &str) {
    if old == new || fields::get(map, old).is_none() {
        return;
    }

    if !old.contains('.') && !new.contains('.') {
        let entries = std::mem::take(map);
        for (key, value) in entries {
            if key == old {
                map.insert(new.to_string(), value);
            } else if key != new {
                map.insert(key, value);
            }
        }
        return;
    }

    if let Some(value) = fields::remove(map, old) {
        fields::set(map, new, value);
    }
}

/// Run transform steps over a value
pub fn apply_steps(mut value: Value, steps: &[TransformStep]) -> FlowResult<Value> {
    for step in steps {
        value = apply_step(value, step)?;
    }
    Ok(value)
}

fn step_error(step: &TransformStep, message: impl Into<String>, value: &Value) -> FlowError {
    let options = serde_json::to_value(step).unwrap_or(Value::Null);
    FlowError::transform(step.name(), message, value, &options)
}

fn apply_step(value: Value, step: &TransformStep) -> FlowResult<Value> {
    match step {
        TransformStep::Join(sep) => match value {
            Value::Array(items) => Ok(Value::String(
                items.iter().map(text_of).collect::<Vec<_>>().join(sep),
            )),
            Value::String(_) | Value::Null => Ok(value),
            other => Err(step_error(step, "expected an array", &other)),
        },
        TransformStep::Split(sep) => match value {
            Value::String(s) => Ok(Value::Array(split_text(&s, sep))),
            Value::Array(_) | Value::Null => Ok(value),
            other => Err(step_error(step, "expected a string", &other)),
        },
        TransformStep::Keys => match value {
            Value::Object(map) => Ok(Value::Array(map.into_iter().map(|(k, _)| Value::String(k)).collect())),
            Value::Array(_) | Value::Null => Ok(value),
            other => Err(step_error(step, "expected an object", &other)),
        },
        TransformStep::Values => match value {
            Value::Object(map) => Ok(Value::Array(map.into_iter().map(|(_, v)| v).collect())),
            Value::Array(_) | Value::Null => Ok(value),
            other => Err(step_error(step, "expected an object", &other)),
        },
        TransformStep::ArrayToObject { value: member } => match value {
            Value::Array(items) => {
                let mut map = Map::new();
                for item in &items {
                    map.insert(text_of(item), member.clone());
                }
                Ok(Value::Object(map))
            }
            Value::String(s) => {
                let mut map = Map::new();
                map.insert(s, member.clone());
                Ok(Value::Object(map))
            }
            Value::Object(_) | Value::Null => Ok(value),
            other => Err(step_error(step, "expected an array", &other)),
        },
        TransformStep::Filter(predicate) => Ok(filter(value, predicate)),
        TransformStep::Map(func) => map_fn(value, *func, step),
        TransformStep::Replace(spec) => match value {
            Value::String(s) => Ok(Value::String(replace_text(&s, spec)?)),
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::String(s) => replace_text(&s, spec).map(Value::String),
                    other => Ok(other),
                })
                .collect::<FlowResult<Vec<_>>>()
                .map(Value::Array),
            other => Ok(other),
        },
    }
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn split_text(text: &str, sep: &str) -> Vec<Value> {
    if sep.is_empty() {
        return vec![Value::String(text.to_string())];
    }
    let trimmed = sep.trim();
    let sep = if trimmed.is_empty() { sep } else { trimmed };
    text.split(sep)
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| Value::String(part.to_string()))
        .collect()
}

fn filter(value: Value, predicate: &FilterPredicate) -> Value {
    let keep = |v: &Value| (v == &predicate.value) != predicate.negate;
    match value {
        Value::Object(map) => Value::Object(map.into_iter().filter(|(_, v)| keep(v)).collect()),
        Value::Array(items) => Value::Array(items.into_iter().filter(|v| keep(v)).collect()),
        other => other,
    }
}

fn map_fn(value: Value, func: MapFn, step: &TransformStep) -> FlowResult<Value> {
    let text_fn: fn(&str) -> String = match func {
        MapFn::Capitalize => capitalize_str,
        MapFn::Uppercase => str::to_uppercase,
        MapFn::Lowercase => str::to_lowercase,
        MapFn::Entries => {
            return match value {
                Value::Object(map) => Ok(Value::Array(
                    map.into_iter()
                        .map(|(k, v)| Value::Array(vec![Value::String(k), v]))
                        .collect(),
                )),
                Value::Array(_) | Value::Null => Ok(value),
                other => Err(step_error(step, "expected an object", &other)),
            };
        }
        MapFn::FromEntries => {
            return match value {
                Value::Array(items) => {
                    let mut map = Map::new();
                    for item in &items {
                        match item.as_array().map(Vec::as_slice) {
                            Some([key, v]) => {
                                map.insert(text_of(key), v.clone());
                            }
                            _ => return Err(step_error(step, "expected [key, value] pairs", item)),
                        }
                    }
                    Ok(Value::Object(map))
                }
                Value::Object(_) | Value::Null => Ok(value),
                other => Err(step_error(step, "expected an array", &other)),
            };
        }
    };

    match value {
        Value::String(s) => Ok(Value::String(text_fn(&s))),
        Value::Array(items) => Ok(Value::Array(
            items
                .into_iter()
                .map(|item| match item {
                    Value::String(s) => Value::String(text_fn(&s)),
                    other => other,
                })
                .collect(),
        )),
        other => Ok(other),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// $replace
// ─────────────────────────────────────────────────────────────────────────────

/// Apply a `$replace` to one string
///
/// `flags` follows the usual letters: `g` replaces every match, `i` is
/// case-insensitive, `m` is multi-line. `$1`-style references in `with`
/// are accepted.
pub fn replace_text(text: &str, spec: &ReplaceSpec) -> FlowResult<String> {
    if let Some(lookahead) = NegativeLookahead::parse(&spec.pattern) {
        return Ok(lookahead.apply(text, &spec.with));
    }

    let flags = spec.flags.as_deref().unwrap_or("");
    let re = RegexBuilder::new(&spec.pattern)
        .case_insensitive(flags.contains('i'))
        .multi_line(flags.contains('m'))
        .build()?;
    let with = replacement_syntax(&spec.with);

    let out = if flags.contains('g') {
        re.replace_all(text, with.as_str())
    } else {
        re.replace(text, with.as_str())
    };
    Ok(out.into_owned())
}

/// Brace numbered references so `$1suffix` means group 1
fn replacement_syntax(with: &str) -> String {
    let mut out = String::with_capacity(with.len() + 4);
    let mut chars = with.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        match chars.peek().copied() {
            Some('$') => {
                chars.next();
                out.push_str("$$");
            }
            Some('&') => {
                chars.next();
                out.push_str("${0}");
            }
            Some(d) if d.is_ascii_digit() => {
                let mut digits = String::new();
                while let Some(d) = chars.peek().copied().filter(char::is_ascii_digit) {
                    digits.push(d);
                    chars.next();
                }
                out.push_str(&format!("${{{}}}", digits));
            }
            _ => out.push('$'),
        }
    }
    out
}

/// `^(?!A)(?!B$)...` optionally followed by `.*$`
///
/// The `regex` crate has no lookaround, so this one shape is executed
/// directly: values starting with (or, for `$`-anchored guards, equal to)
/// a guard literal are left alone; everything else is replaced whole, or
/// prefixed when the pattern stops after the guards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegativeLookahead {
    pub guards: Vec<LookaheadGuard>,
    pub whole: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookaheadGuard {
    pub literal: String,
    pub exact: bool,
}

impl LookaheadGuard {
    fn matches(&self, text: &str) -> bool {
        if self.exact {
            text == self.literal
        } else {
            text.starts_with(&self.literal)
        }
    }

    /// Regex source for this guard
    pub fn to_pattern(&self) -> String {
        format!(
            "(?!{}{})",
            regex::escape(&self.literal),
            if self.exact { "$" } else { "" }
        )
    }
}

impl NegativeLookahead {
    /// Recognise the shape, or `None` for any other pattern
    pub fn parse(pattern: &str) -> Option<Self> {
        let mut rest = pattern.strip_prefix('^')?;
        let mut guards = Vec::new();

        while let Some(body) = rest.strip_prefix("(?!") {
            let (guard, consumed) = parse_guard(body)?;
            guards.push(guard);
            rest = &body[consumed..];
        }
        if guards.is_empty() {
            return None;
        }

        let whole = match rest {
            "" => false,
            ".*$" | ".*" => true,
            _ => return None,
        };
        Some(Self { guards, whole })
    }

    pub fn apply(&self, text: &str, with: &str) -> String {
        if self.guards.iter().any(|g| g.matches(text)) {
            return text.to_string();
        }
        if self.whole {
            with.to_string()
        } else {
            format!("{with}{text}")
        }
    }

    /// Regex source for this shape
    pub fn to_pattern(&self) -> String {
        let guards: String = self.guards.iter().map(LookaheadGuard::to_pattern).collect();
        format!("^{}{}", guards, if self.whole { ".*$" } else { "" })
    }
}

/// Parse one guard body up to its closing paren; returns bytes consumed
fn parse_guard(body: &str) -> Option<(LookaheadGuard, usize)> {
    let mut literal = String::new();
    let mut chars = body.char_indices().peekable();

    while let Some((idx, c)) = chars.next() {
        match c {
            '\\' => {
                let (_, escaped) = chars.next()?;
                literal.push(escaped);
            }
            ')' => {
                return Some((LookaheadGuard { literal, exact: false }, idx + 1));
            }
            '$' if matches!(chars.peek(), Some((_, ')'))) => {
                let (close, _) = chars.next()?;
                return Some((LookaheadGuard { literal, exact: true }, close + 1));
            }
            '.' | '*' | '+' | '?' | '[' | ']' | '{' | '}' | '|' | '^' | '(' | '$' => return None,
            other => literal.push(other),
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::switch::{SwitchCase, SwitchExpression};
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_operations_run_in_order() {
        let registry = TransformRegistry::with_builtins();
        let mut fm = object(json!({"name": "reviewer", "paths": ["src/**"], "draft": true}));
        let ops = vec![
            Operation::Rename([("paths".to_string(), "globs".to_string())].into()),
            Operation::Transform {
                field: "globs".into(),
                steps: vec![TransformStep::Join(",".into())],
            },
            Operation::Unset("draft".into()),
            Operation::Set {
                path: "meta.kind".into(),
                value: json!("agent"),
            },
            Operation::Copy {
                from: "name".into(),
                to: "title".into(),
                transform: Some("uppercase".into()),
            },
        ];

        apply_operations(&mut fm, &ops, &registry).unwrap();
        assert_eq!(
            Value::Object(fm),
            json!({"name": "reviewer", "globs": "src/**", "meta": {"kind": "agent"}, "title": "REVIEWER"})
        );
    }

    #[test]
    fn test_rename_keeps_position() {
        let registry = TransformRegistry::with_builtins();
        let mut fm = object(json!({"a": 1, "paths": 2, "z": 3}));
        let ops = vec![Operation::Rename([("paths".to_string(), "globs".to_string())].into())];
        apply_operations(&mut fm, &ops, &registry).unwrap();
        let keys: Vec<&str> = fm.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["a", "globs", "z"]);
    }

    #[test]
    fn test_switch_operation() {
        let registry = TransformRegistry::with_builtins();
        let expr = SwitchExpression {
            field: "model".into(),
            cases: vec![SwitchCase::new("anthropic/*", "sonnet")],
            default: None,
        };
        let ops = vec![Operation::Switch(expr)];

        let mut fm = object(json!({"model": "anthropic/claude-sonnet-4"}));
        apply_operations(&mut fm, &ops, &registry).unwrap();
        assert_eq!(fm["model"], "sonnet");

        let mut fm = object(json!({"model": "openai/gpt"}));
        apply_operations(&mut fm, &ops, &registry).unwrap();
        assert_eq!(fm["model"], "openai/gpt");

        let mut fm = object(json!({"name": "x"}));
        apply_operations(&mut fm, &ops, &registry).unwrap();
        assert!(!fm.contains_key("model"));
    }

    #[test]
    fn test_tool_steps() {
        let steps = vec![
            TransformStep::Filter(FilterPredicate {
                value: json!(true),
                negate: false,
            }),
            TransformStep::Keys,
            TransformStep::Map(MapFn::Capitalize),
            TransformStep::Join(", ".into()),
        ];
        let out = apply_steps(json!({"read": true, "bash": false, "write": true}), &steps).unwrap();
        assert_eq!(out, json!("Read, Write"));

        let back = apply_steps(
            json!("Read, Write"),
            &[
                TransformStep::Split(", ".into()),
                TransformStep::Map(MapFn::Lowercase),
                TransformStep::ArrayToObject { value: json!(true) },
            ],
        )
        .unwrap();
        assert_eq!(back, json!({"read": true, "write": true}));
    }

    #[test]
    fn test_entries_steps() {
        let pairs = apply_steps(json!({"a": 1}), &[TransformStep::Map(MapFn::Entries)]).unwrap();
        assert_eq!(pairs, json!([["a", 1]]));
        let back = apply_steps(pairs, &[TransformStep::Map(MapFn::FromEntries)]).unwrap();
        assert_eq!(back, json!({"a": 1}));
        assert!(apply_steps(json!(5), &[TransformStep::Keys]).is_err());
    }

    #[test]
    fn test_replace_shapes() {
        let strip = ReplaceSpec::new("^anthropic/", "");
        assert_eq!(replace_text("anthropic/foo", &strip).unwrap(), "foo");
        assert_eq!(replace_text("foo", &ReplaceSpec::new("^", "anthropic/")).unwrap(), "anthropic/foo");
        assert_eq!(replace_text("foo", &ReplaceSpec::new("$", ".md")).unwrap(), "foo.md");
        assert_eq!(
            replace_text("name", &ReplaceSpec::new("^(.*)$", "$1-agent")).unwrap(),
            "name-agent"
        );
    }

    #[test]
    fn test_replace_flags() {
        let mut spec = ReplaceSpec::new("a", "b");
        assert_eq!(replace_text("aAa", &spec).unwrap(), "bAa");
        spec.flags = Some("gi".into());
        assert_eq!(replace_text("aAa", &spec).unwrap(), "bbb");
    }

    #[test]
    fn test_negative_lookahead() {
        let spec = ReplaceSpec::new("^(?!anthropic/).*$", "inherit");
        assert_eq!(replace_text("openai/gpt", &spec).unwrap(), "inherit");
        assert_eq!(replace_text("anthropic/opus", &spec).unwrap(), "anthropic/opus");

        let guarded = ReplaceSpec::new("^(?!inherit$)(?!anthropic\\/)", "anthropic/");
        assert_eq!(replace_text("opus", &guarded).unwrap(), "anthropic/opus");
        assert_eq!(replace_text("inherit", &guarded).unwrap(), "inherit");
        assert_eq!(replace_text("anthropic/opus", &guarded).unwrap(), "anthropic/opus");

        let parsed = NegativeLookahead::parse(&guarded.pattern).unwrap();
        assert_eq!(parsed.guards.len(), 2);
        assert!(parsed.guards[0].exact);
        assert!(NegativeLookahead::parse("^(?!a|b).*$").is_none());
        assert!(NegativeLookahead::parse("^abc").is_none());
    }
}
