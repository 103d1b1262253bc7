// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 opkg contributors

//! Flow inverter
//!
//! Derives the reverse of a forward flow so platform-authored content can
//! be read back as universal content. Inversion never fails: anything that
//! cannot be reversed is dropped, and every drop is recorded as an
//! [`InversionNote`].
//!
//! Reversible edits:
//!
//! | forward                         | inverse                          |
//! |---------------------------------|----------------------------------|
//! | `$rename {a: b}`                | `$rename {b: a}`                 |
//! | `$switch` cases `p → v`         | cases `v → p` (first `v` wins)   |
//! | `$join s` / `$split s`          | `$split s` / `$join s`           |
//! | `$filter {value: v}`, `$keys`   | `$arrayToObject {value: v}`      |
//! | `$arrayToObject {value: v}`     | `$filter {value: v}`, `$keys`    |
//! | `$map entries` / `fromEntries`  | `$map fromEntries` / `entries`   |
//! | `$replace ^X → ""`              | `$replace ^ → X`                 |
//! | `$replace X$ → ""`              | `$replace $ → X`                 |
//! | `$replace ^A(.*)B$ → P$1S`      | `$replace ^P(.*)S$ → A$1B`       |
//! | `$replace ^(?!X).*$ → C`        | `$replace ^(?!C$)(?!X) → X`      |
//! | `$replace ^ → X`, `$ → X`       | `$replace ^X → ""`, `X$ → ""`    |
//!
//! `$set`, `$unset` and `$copy` are never reversed.

use serde::Serialize;

use super::definition::{
    Condition, FilterPredicate, Flow, FlowTo, MapFn, MergeStrategy, Operation, Pattern, PipeStep, ReplaceSpec,
    TransformStep,
};
use super::operations::{LookaheadGuard, NegativeLookahead};
use crate::switch::{SwitchCase, SwitchExpression};
use crate::transforms::CODEC_NAMES;

/// Why part of a flow was dropped or altered during inversion
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InversionNote {
    /// Where in the forward flow (`map[2] $transform tools`, `pipe`, ...)
    pub location: String,
    pub message: String,
}

/// A reversed flow with the notes explaining what was lost
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvertedFlow {
    pub flow: Flow,
    pub notes: Vec<InversionNote>,
}

/// Derives reverse flows
pub struct FlowInverter;

impl FlowInverter {
    /// Invert a flow written for `platform`
    pub fn invert(flow: &Flow, platform: &str) -> InvertedFlow {
        let mut notes = Notes::new(platform);

        // A multi-target flow reads back from its first target only
        let (to_pattern, map, pipe, merge) = match &flow.to {
            FlowTo::Pattern(pattern) => (pattern.clone(), &flow.map, &flow.pipe, flow.merge.clone()),
            FlowTo::Targets(targets) => {
                for (idx, extra) in targets.iter().enumerate().skip(1) {
                    notes.push(
                        format!("to[{}]", idx),
                        format!("only the first target is read back; dropped {}", extra.target),
                    );
                }
                match targets.first() {
                    Some(first) => (
                        first.target.clone(),
                        first.map.as_ref().unwrap_or(&flow.map),
                        first.pipe.as_ref().unwrap_or(&flow.pipe),
                        first.merge.clone().or_else(|| flow.merge.clone()),
                    ),
                    None => (flow.from.clone(), &flow.map, &flow.pipe, flow.merge.clone()),
                }
            }
        };

        let map = Self::invert_operations(map, &mut notes);
        let pipe = Self::invert_pipe(pipe, &mut notes);

        let when = flow.when.as_ref().and_then(|when| {
            if when.exists.is_some() {
                notes.push("when".into(), "'exists' refers to the install target and is dropped".into());
            }
            when.platform.as_ref().map(|platform| Condition {
                exists: None,
                platform: Some(platform.clone()),
            })
        });

        let inverted = Flow {
            from: to_pattern,
            to: FlowTo::Pattern(flow.from.clone()),
            map,
            pipe,
            merge,
            when,
            embed: flow.path.clone(),
            path: flow.embed.clone(),
            section: flow.section.clone(),
        };

        InvertedFlow {
            flow: inverted,
            notes: notes.into_inner(),
        }
    }

    /// Invert every flow of a platform
    pub fn invert_all(flows: &[Flow], platform: &str) -> Vec<InvertedFlow> {
        flows.iter().map(|flow| Self::invert(flow, platform)).collect()
    }

    fn invert_operations(ops: &[Operation], notes: &mut Notes) -> Vec<Operation> {
        let mut inverted = Vec::with_capacity(ops.len());

        for (idx, op) in ops.iter().enumerate().rev() {
            let location = format!("map[{}] {}", idx, op.name());
            match op {
                Operation::Rename(mapping) => {
                    inverted.push(Operation::Rename(
                        mapping.iter().map(|(old, new)| (new.clone(), old.clone())).collect(),
                    ));
                }
                Operation::Switch(expr) => {
                    if let Some(expr) = Self::invert_switch(expr, &location, notes) {
                        inverted.push(Operation::Switch(expr));
                    }
                }
                Operation::Transform { field, steps } => {
                    let location = format!("{} {}", location, field);
                    let steps = Self::invert_steps(steps, &location, notes);
                    if steps.is_empty() {
                        notes.push(location, "no reversible steps left".into());
                    } else {
                        inverted.push(Operation::Transform {
                            field: field.clone(),
                            steps,
                        });
                    }
                }
                Operation::Set { path, .. } => {
                    notes.push(location, format!("constant written to '{}' cannot be reconstructed", path));
                }
                Operation::Unset(path) => {
                    notes.push(location, format!("removed '{}' cannot be restored", path));
                }
                Operation::Copy { from, to, .. } => {
                    notes.push(location, format!("copy of '{}' into '{}' is not reversed", from, to));
                }
            }
        }

        inverted
    }

    fn invert_switch(expr: &SwitchExpression, location: &str, notes: &mut Notes) -> Option<SwitchExpression> {
        let mut cases: Vec<SwitchCase> = Vec::with_capacity(expr.cases.len());

        for (idx, case) in expr.cases.iter().enumerate() {
            if case.pattern.as_str().is_some_and(is_glob) {
                notes.push(
                    format!("{} case {}", location, idx),
                    format!("glob pattern {} has no single inverse value", case.pattern),
                );
                continue;
            }
            if let Some(winner) = cases.iter().find(|c| c.pattern == case.value) {
                notes.push(
                    format!("{} case {}", location, idx),
                    format!(
                        "value {} also produced by {}; reading back as {}",
                        case.value, case.pattern, winner.value
                    ),
                );
                continue;
            }
            cases.push(SwitchCase::new(case.value.clone(), case.pattern.clone()));
        }

        if let Some(default) = &expr.default {
            notes.push(
                location.to_string(),
                format!("default {} has no single inverse value", default),
            );
        }

        if cases.is_empty() {
            notes.push(location.to_string(), "no reversible cases left".into());
            return None;
        }

        Some(SwitchExpression {
            field: expr.field.clone(),
            cases,
            default: None,
        })
    }

    fn invert_steps(steps: &[TransformStep], location: &str, notes: &mut Notes) -> Vec<TransformStep> {
        let mut inverted: Vec<TransformStep> = Vec::with_capacity(steps.len());

        for (idx, step) in steps.iter().enumerate().rev() {
            let at = format!("{} steps[{}] {}", location, idx, step.name());
            match step {
                TransformStep::Join(sep) => inverted.push(TransformStep::Split(sep.clone())),
                TransformStep::Split(sep) => inverted.push(TransformStep::Join(sep.clone())),
                TransformStep::Keys => {
                    let value = match idx.checked_sub(1).map(|prev| &steps[prev]) {
                        Some(TransformStep::Filter(FilterPredicate { value, negate: false })) => value.clone(),
                        _ => serde_json::Value::Bool(true),
                    };
                    inverted.push(TransformStep::ArrayToObject { value });
                }
                TransformStep::ArrayToObject { value } => {
                    inverted.push(TransformStep::Filter(FilterPredicate {
                        value: value.clone(),
                        negate: false,
                    }));
                    inverted.push(TransformStep::Keys);
                }
                TransformStep::Filter(_) => {
                    if !matches!(steps.get(idx + 1), Some(TransformStep::Keys)) {
                        notes.push(at, "filtered-out entries cannot be restored".into());
                    }
                }
                TransformStep::Map(MapFn::Entries) => inverted.push(TransformStep::Map(MapFn::FromEntries)),
                TransformStep::Map(MapFn::FromEntries) => inverted.push(TransformStep::Map(MapFn::Entries)),
                TransformStep::Map(other) => {
                    notes.push(at, format!("original case is lost by {:?}", other).to_lowercase());
                }
                TransformStep::Values => notes.push(at, "object keys are lost".into()),
                TransformStep::Replace(spec) => match invert_replace(spec) {
                    Some(Inverse::Single(inverse)) => inverted.push(TransformStep::Replace(inverse)),
                    Some(Inverse::GuardedPrefix { inverse, prefix }) => {
                        // A forward strip of the same prefix is subsumed
                        let strip = ReplaceSpec::new("^", escape_replacement(&prefix));
                        if inverted.last() == Some(&TransformStep::Replace(strip)) {
                            inverted.pop();
                        }
                        inverted.push(TransformStep::Replace(inverse));
                    }
                    None => notes.push(at, format!("pattern '{}' is not a reversible shape", spec.pattern)),
                },
            }
        }

        inverted
    }

    fn invert_pipe(pipe: &[PipeStep], notes: &mut Notes) -> Vec<PipeStep> {
        pipe.iter()
            .enumerate()
            .filter(|(idx, step)| {
                let name = step.name();
                let keep = CODEC_NAMES.contains(&name) || MergeStrategy::from_name(name).is_some();
                if !keep {
                    notes.push(format!("pipe[{}] {}", idx, name), "only codecs and merge strategies are replayed".into());
                }
                keep
            })
            .map(|(_, step)| step.clone())
            .collect()
    }
}

enum Inverse {
    Single(ReplaceSpec),
    /// Re-add `prefix` to everything except the lookahead's constant
    GuardedPrefix { inverse: ReplaceSpec, prefix: String },
}

fn invert_replace(spec: &ReplaceSpec) -> Option<Inverse> {
    if spec.flags.as_deref().is_some_and(|f| f.contains('i')) {
        return None;
    }

    if let Some(lookahead) = NegativeLookahead::parse(&spec.pattern) {
        if !lookahead.whole {
            return None;
        }
        let constant = replacement_literal(&spec.with)?;
        let prefix = lookahead.guards.iter().find(|g| !g.exact)?.literal.clone();

        let mut guards = vec![LookaheadGuard {
            literal: constant,
            exact: true,
        }];
        guards.extend(lookahead.guards.iter().cloned());
        let inverse = NegativeLookahead { guards, whole: false };
        return Some(Inverse::GuardedPrefix {
            inverse: ReplaceSpec::new(inverse.to_pattern(), escape_replacement(&prefix)),
            prefix,
        });
    }

    // ^A(.*)B$ → P$1S
    if let Some(inner) = spec.pattern.strip_prefix('^').and_then(|p| p.strip_suffix('$')) {
        if let Some((before, after)) = inner.split_once("(.*)") {
            let (a, b) = (regex_literal(before)?, regex_literal(after)?);
            let (p, s) = split_group_ref(&spec.with)?;
            let pattern = format!("^{}(.*){}$", regex::escape(&p), regex::escape(&s));
            let with = format!("{}${{1}}{}", escape_replacement(&a), escape_replacement(&b));
            return Some(Inverse::Single(ReplaceSpec::new(pattern, with)));
        }
    }

    let with = replacement_literal(&spec.with)?;

    // ^X → "" and ^ → X
    if let Some(rest) = spec.pattern.strip_prefix('^') {
        let literal = regex_literal(rest)?;
        return match (literal.is_empty(), with.is_empty()) {
            (false, true) => Some(Inverse::Single(ReplaceSpec::new("^", escape_replacement(&literal)))),
            (true, false) => Some(Inverse::Single(ReplaceSpec::new(format!("^{}", regex::escape(&with)), ""))),
            _ => None,
        };
    }

    // X$ → "" and $ → X
    if let Some(rest) = spec.pattern.strip_suffix('$') {
        let literal = regex_literal(rest)?;
        return match (literal.is_empty(), with.is_empty()) {
            (false, true) => Some(Inverse::Single(ReplaceSpec::new("$", escape_replacement(&literal)))),
            (true, false) => Some(Inverse::Single(ReplaceSpec::new(format!("{}$", regex::escape(&with)), ""))),
            _ => None,
        };
    }

    None
}

/// Unescape a regex fragment made only of literal characters
fn regex_literal(fragment: &str) -> Option<String> {
    let mut out = String::with_capacity(fragment.len());
    let mut chars = fragment.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                let escaped = chars.next()?;
                if escaped.is_ascii_alphanumeric() {
                    return None;
                }
                out.push(escaped);
            }
            '.' | '*' | '+' | '?' | '(' | ')' | '[' | ']' | '{' | '}' | '|' | '^' | '$' => return None,
            other => out.push(other),
        }
    }
    Some(out)
}

/// Replacement text with no group references, `$$` unescaped
fn replacement_literal(with: &str) -> Option<String> {
    let mut out = String::with_capacity(with.len());
    let mut chars = with.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' {
            if chars.next_if_eq(&'$').is_none() {
                return None;
            }
        }
        out.push(c);
    }
    Some(out)
}

/// Literal text before and after the single `$1` of a replacement
fn split_group_ref(with: &str) -> Option<(String, String)> {
    for token in ["${1}", "$1"] {
        if let Some(idx) = with.find(token) {
            let before = &with[..idx];
            let after = &with[idx + token.len()..];
            if token == "$1" && after.starts_with(|c: char| c.is_ascii_digit()) {
                return None;
            }
            return Some((replacement_literal(before)?, replacement_literal(after)?));
        }
    }
    None
}

fn escape_replacement(text: &str) -> String {
    text.replace('$', "$$")
}

fn is_glob(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}


/// Collects notes and mirrors each one to the debug log
struct Notes {
    platform: String,
    notes: Vec<InversionNote>,
}

impl Notes {
    fn new(platform: &str) -> Self {
        Self {
            platform: platform.to_string(),
            notes: Vec::new(),
        }
    }

    fn push(&mut self, location: String, message: String) {
        tracing::debug!("Inverting {} flow, {}: {}", self.platform, location, message);
        self.notes.push(InversionNote { location, message });
    }

    fn into_inner(self) -> Vec<InversionNote> {
        self.notes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::operations::{apply_steps, replace_text};
    use serde_json::json;

    fn round_trip(spec: ReplaceSpec, input: &str) -> String {
        let forward = replace_text(input, &spec).unwrap();
        let Some(Inverse::Single(inverse)) = invert_replace(&spec) else {
            panic!("{} should invert", spec.pattern);
        };
        replace_text(&forward, &inverse).unwrap()
    }

    #[test]
    fn test_replace_shapes_round_trip() {
        assert_eq!(round_trip(ReplaceSpec::new("^anthropic/", ""), "anthropic/foo"), "anthropic/foo");
        assert_eq!(round_trip(ReplaceSpec::new("\\.md$", ""), "notes.md"), "notes.md");
        assert_eq!(round_trip(ReplaceSpec::new("^", "@scope/"), "pkg"), "pkg");
        assert_eq!(round_trip(ReplaceSpec::new("$", ".json"), "data"), "data");
        assert_eq!(round_trip(ReplaceSpec::new("^(.*)$", "<$1>"), "tag"), "tag");
        assert_eq!(round_trip(ReplaceSpec::new("^\\[(.*)\\]$", "$1"), "[x]"), "[x]");
    }

    #[test]
    fn test_prefix_strip_inverts_to_prefix_add() {
        let Some(Inverse::Single(inverse)) = invert_replace(&ReplaceSpec::new("^anthropic/", "")) else {
            panic!("expected a single inverse");
        };
        assert_eq!(inverse, ReplaceSpec::new("^", "anthropic/"));
        assert_eq!(replace_text("foo", &inverse).unwrap(), "anthropic/foo");
    }

    #[test]
    fn test_unsupported_shapes_are_dropped() {
        for pattern in ["a+b", "^\\d+", "(x|y)$", "^a$"] {
            assert!(invert_replace(&ReplaceSpec::new(pattern, "")).is_none(), "{pattern}");
        }
        assert!(invert_replace(&ReplaceSpec::new("^(.*)$", "$1-$1")).is_none());
    }

    #[test]
    fn test_lookahead_folds_prefix_strip() {
        let forward = vec![
            TransformStep::Replace(ReplaceSpec::new("^(?!anthropic/).*$", "inherit")),
            TransformStep::Replace(ReplaceSpec::new("^anthropic/", "")),
        ];
        let mut notes = Notes::new("claude");
        let inverse = FlowInverter::invert_steps(&forward, "model", &mut notes);
        assert_eq!(
            inverse,
            vec![TransformStep::Replace(ReplaceSpec::new(
                "^(?!inherit$)(?!anthropic/)",
                "anthropic/"
            ))]
        );

        for original in ["anthropic/claude-sonnet", "anthropic/claude-opus"] {
            let out = apply_steps(json!(original), &forward).unwrap();
            assert_eq!(apply_steps(out, &inverse).unwrap(), json!(original));
        }
        let lossy = apply_steps(json!("gpt-4"), &forward).unwrap();
        assert_eq!(lossy, json!("inherit"));
        assert_eq!(apply_steps(lossy, &inverse).unwrap(), json!("inherit"));
    }

    #[test]
    fn test_step_pairs() {
        let forward = vec![
            TransformStep::Filter(FilterPredicate {
                value: json!("allow"),
                negate: false,
            }),
            TransformStep::Keys,
            TransformStep::Join(", ".into()),
        ];
        let mut notes = Notes::new("x");
        let inverse = FlowInverter::invert_steps(&forward, "tools", &mut notes);
        assert_eq!(
            inverse,
            vec![
                TransformStep::Split(", ".into()),
                TransformStep::ArrayToObject { value: json!("allow") },
            ]
        );
        assert!(notes.into_inner().is_empty());

        let original = json!({"bash": "allow", "edit": "allow"});
        let out = apply_steps(original.clone(), &forward).unwrap();
        assert_eq!(apply_steps(out, &inverse).unwrap(), original);
    }

    #[test]
    fn test_lossy_steps_are_noted() {
        let forward = vec![TransformStep::Map(MapFn::Capitalize), TransformStep::Values];
        let mut notes = Notes::new("x");
        let inverse = FlowInverter::invert_steps(&forward, "tools", &mut notes);
        assert!(inverse.is_empty());

        let notes = notes.into_inner();
        assert_eq!(notes.len(), 2);
        assert!(notes[0].location.contains("$values"));
        assert!(notes[1].message.contains("capitalize"));
    }

    #[test]
    fn test_switch_duplicate_values_first_wins() {
        let expr = SwitchExpression {
            field: "model".into(),
            cases: vec![
                SwitchCase::new("anthropic/claude-sonnet", "sonnet"),
                SwitchCase::new("anthropic/claude-sonnet-latest", "sonnet"),
                SwitchCase::new("anthropic/*", "inherit"),
                SwitchCase::new("anthropic/claude-opus", "opus"),
            ],
            default: Some(json!("inherit")),
        };

        let mut notes = Notes::new("claude");
        let inverse = FlowInverter::invert_switch(&expr, "map[0] $switch", &mut notes).unwrap();
        assert_eq!(
            inverse.cases,
            vec![
                SwitchCase::new("sonnet", "anthropic/claude-sonnet"),
                SwitchCase::new("opus", "anthropic/claude-opus"),
            ]
        );
        assert!(inverse.default.is_none());

        let notes = notes.into_inner();
        assert_eq!(notes.len(), 3);
        assert!(notes[0].message.contains("reading back as \"anthropic/claude-sonnet\""));
    }

    #[test]
    fn test_invert_flow() {
        let flow = Flow::from_yaml(
            r#"
from: "rules/**/*.md"
to: ".cursor/rules/**/*.mdc"
map:
  - $rename: { paths: globs }
  - $transform: { field: globs, steps: [ { $join: "," } ] }
  - $set: { path: alwaysApply, value: false }
pipe: [filter-empty, yaml]
merge: deep
when: { exists: ".cursor", platform: cursor }
embed: rules
"#,
        )
        .unwrap();

        let inverted = FlowInverter::invert(&flow, "cursor");
        let back = &inverted.flow;
        assert_eq!(back.from, Pattern::from(".cursor/rules/**/*.mdc"));
        assert_eq!(back.to, FlowTo::Pattern(Pattern::from("rules/**/*.md")));
        assert_eq!(
            back.map,
            vec![
                Operation::Transform {
                    field: "globs".into(),
                    steps: vec![TransformStep::Split(",".into())],
                },
                Operation::Rename([("globs".to_string(), "paths".to_string())].into()),
            ]
        );
        assert_eq!(back.pipe, vec![PipeStep::Name("yaml".into())]);
        assert_eq!(back.merge, Some(MergeStrategy::Deep));
        assert_eq!(back.path.as_deref(), Some("rules"));
        assert!(back.embed.is_none());
        assert_eq!(back.when.as_ref().and_then(|w| w.platform.as_deref()), Some("cursor"));

        let locations: Vec<&str> = inverted.notes.iter().map(|n| n.location.as_str()).collect();
        assert_eq!(locations, vec!["map[2] $set", "pipe[0] filter-empty", "when"]);
    }

    #[test]
    fn test_inverted_flow_snapshot() {
        let flow = Flow::from_yaml(
            r#"
from: "agents/**/*.md"
to: ".claude/agents/**/*.md"
map:
  - $transform:
      field: model
      steps:
        - $replace: { pattern: "^anthropic/", with: "" }
"#,
        )
        .unwrap();

        let inverted = FlowInverter::invert(&flow, "claude");
        insta::assert_snapshot!(inverted.flow.to_yaml().unwrap(), @r###"
        from: .claude/agents/**/*.md
        to: agents/**/*.md
        map:
        - $transform:
            field: model
            steps:
            - $replace:
                pattern: ^
                with: anthropic/
        "###);
    }
}
