// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 opkg contributors

//! `$switch` expressions
//!
//! A switch picks a value by matching a subject against an ordered list
//! of cases. The subject is either a literal or a `$$name` reference into
//! the flow context variables.
//!
//! Cases are tried in declaration order and the first match wins, so a
//! specific pattern can be placed before a general one. Object subjects
//! are the exception: every object case whose keys all match is a
//! candidate and the one with the most keys wins, earliest on ties.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{FlowError, FlowResult};
use crate::flow::FlowContext;

/// Prefix marking a context variable reference
pub const VARIABLE_PREFIX: &str = "$$";

/// A `$switch` expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchExpression {
    /// Literal subject or `$$name` variable reference
    pub field: String,

    /// Ordered cases
    #[serde(default)]
    pub cases: Vec<SwitchCase>,

    /// Value used when no case matches
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

/// A single `pattern → value` case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchCase {
    /// Exact string, glob, scalar or object pattern
    pub pattern: Value,
    /// Value produced when the pattern matches
    pub value: Value,
}

impl SwitchCase {
    pub fn new(pattern: impl Into<Value>, value: impl Into<Value>) -> Self {
        Self {
            pattern: pattern.into(),
            value: value.into(),
        }
    }
}

/// Resolves switch expressions against a flow context
pub struct SwitchResolver;

impl SwitchResolver {
    /// Resolve an expression to its selected value
    ///
    /// Fails with [`FlowError::UnknownVariable`] when the subject
    /// references a variable the context does not define, and with
    /// [`FlowError::NoMatchingCase`] when nothing matches and there is no
    /// default.
    pub fn resolve(expr: &SwitchExpression, context: &FlowContext) -> FlowResult<Value> {
        let subject = Self::subject(&expr.field, context)?;
        Self::select(expr, &subject)
            .cloned()
            .ok_or_else(|| FlowError::NoMatchingCase {
                value: display_subject(&subject),
            })
    }

    /// Resolve an expression whose values must be strings (glob patterns)
    pub fn resolve_string(expr: &SwitchExpression, context: &FlowContext) -> FlowResult<String> {
        match Self::resolve(expr, context)? {
            Value::String(s) => Ok(s),
            other => Err(FlowError::InvalidSwitch {
                reason: format!("expected a string value, got {}", other),
            }),
        }
    }

    /// Select a case value (or the default) for an already-known subject
    pub fn select<'a>(expr: &'a SwitchExpression, subject: &Value) -> Option<&'a Value> {
        match Self::find_case(&expr.cases, subject) {
            Some(idx) => Some(&expr.cases[idx].value),
            None => expr.default.as_ref(),
        }
    }

    /// Index of the winning case for `subject`, if any
    pub fn find_case(cases: &[SwitchCase], subject: &Value) -> Option<usize> {
        if subject.is_object() {
            let mut best: Option<(usize, usize)> = None;
            for (idx, case) in cases.iter().enumerate() {
                if !pattern_matches(&case.pattern, subject) {
                    continue;
                }
                let weight = case.pattern.as_object().map_or(0, |o| o.len());
                if best.map_or(true, |(_, w)| weight > w) {
                    best = Some((idx, weight));
                }
            }
            return best.map(|(idx, _)| idx);
        }

        cases
            .iter()
            .position(|case| pattern_matches(&case.pattern, subject))
    }

    /// Look up the switch subject
    fn subject(field: &str, context: &FlowContext) -> FlowResult<Value> {
        match variable_name(field) {
            Some(name) => context
                .variable(name)
                .map(Value::String)
                .ok_or_else(|| FlowError::UnknownVariable {
                    name: name.to_string(),
                }),
            None => Ok(Value::String(field.to_string())),
        }
    }
}

/// Variable name referenced by `field`, if it is a `$$name` reference
pub fn variable_name(field: &str) -> Option<&str> {
    field
        .strip_prefix(VARIABLE_PREFIX)
        .filter(|name| !name.is_empty())
}

/// Whether a case pattern matches a subject value
///
/// String patterns match exactly first and then as globs. Object
/// patterns match when every key they name is present with an equal
/// value. Other scalars compare by equality.
pub fn pattern_matches(pattern: &Value, subject: &Value) -> bool {
    match (pattern, subject) {
        (Value::Object(pat), Value::Object(sub)) => pat
            .iter()
            .all(|(key, expected)| sub.get(key) == Some(expected)),
        (Value::Object(_), _) => false,
        (Value::String(pat), _) => match scalar_text(subject) {
            Some(text) => pat == &text || glob_matches(pat, &text),
            None => false,
        },
        _ => pattern == subject,
    }
}

fn glob_matches(pattern: &str, text: &str) -> bool {
    if !pattern.contains(['*', '?', '[']) {
        return false;
    }
    glob::Pattern::new(pattern)
        .map(|p| p.matches(text))
        .unwrap_or(false)
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn display_subject(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::Direction;
    use serde_json::json;

    fn context(target_root: &str) -> FlowContext {
        FlowContext::new("claude", Direction::Install).with_variable("targetRoot", target_root)
    }

    fn target_switch() -> SwitchExpression {
        SwitchExpression {
            field: "$$targetRoot".into(),
            cases: vec![SwitchCase::new("~/", ".config/x/*.md")],
            default: Some(json!(".x/*.md")),
        }
    }

    #[test]
    fn test_resolves_matching_case() {
        let value = SwitchResolver::resolve_string(&target_switch(), &context("~/")).unwrap();
        assert_eq!(value, ".config/x/*.md");
    }

    #[test]
    fn test_falls_back_to_default() {
        let value = SwitchResolver::resolve_string(&target_switch(), &context("/project")).unwrap();
        assert_eq!(value, ".x/*.md");
    }

    #[test]
    fn test_no_match_without_default() {
        let mut expr = target_switch();
        expr.default = None;

        let err = SwitchResolver::resolve(&expr, &context("/project")).unwrap_err();
        assert!(matches!(err, FlowError::NoMatchingCase { .. }));
    }

    #[test]
    fn test_unknown_variable() {
        let ctx = FlowContext::new("claude", Direction::Install);
        let err = SwitchResolver::resolve(&target_switch(), &ctx).unwrap_err();
        match err {
            FlowError::UnknownVariable { name } => assert_eq!(name, "targetRoot"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_first_match_wins() {
        let expr = SwitchExpression {
            field: "anthropic/claude-sonnet".into(),
            cases: vec![
                SwitchCase::new("anthropic/claude-sonnet", "sonnet"),
                SwitchCase::new("anthropic/*", "inherit"),
            ],
            default: None,
        };
        let ctx = FlowContext::new("claude", Direction::Install);
        assert_eq!(SwitchResolver::resolve(&expr, &ctx).unwrap(), json!("sonnet"));

        let reordered = SwitchExpression {
            cases: expr.cases.iter().rev().cloned().collect(),
            ..expr
        };
        assert_eq!(SwitchResolver::resolve(&reordered, &ctx).unwrap(), json!("inherit"));
    }

    #[test]
    fn test_non_overlapping_order_is_irrelevant() {
        let cases = vec![
            SwitchCase::new("a", 1),
            SwitchCase::new("b", 2),
            SwitchCase::new("c*", 3),
        ];
        for subject in ["a", "b", "cat"] {
            let forward = SwitchResolver::find_case(&cases, &json!(subject)).map(|i| &cases[i].value);
            let reversed: Vec<_> = cases.iter().rev().cloned().collect();
            let backward =
                SwitchResolver::find_case(&reversed, &json!(subject)).map(|i| &reversed[i].value);
            assert_eq!(forward, backward);
        }
    }

    #[test]
    fn test_object_patterns_prefer_longer_matches() {
        let cases = vec![
            SwitchCase::new(json!({"read": true}), "reader"),
            SwitchCase::new(json!({"read": true, "write": true}), "editor"),
            SwitchCase::new(json!({"bash": true}), "shell"),
        ];
        let subject = json!({"read": true, "write": true, "bash": false});
        let idx = SwitchResolver::find_case(&cases, &subject).unwrap();
        assert_eq!(cases[idx].value, json!("editor"));
    }

    #[test]
    fn test_scalar_subjects_match_string_patterns() {
        assert!(pattern_matches(&json!("true"), &json!(true)));
        assert!(pattern_matches(&json!(3), &json!(3)));
        assert!(!pattern_matches(&json!({"a": 1}), &json!("a")));
    }
}
