// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 opkg contributors

//! Flow definition structures
//!
//! Defines the wire shape of flows as they appear in platform definition
//! files (YAML or JSON). Operations and transform steps are single-key
//! objects tagged with a `$` name.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::errors::FlowResult;
use crate::switch::SwitchExpression;

/// A declarative source pattern → edits → target pattern unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flow {
    /// Source pattern
    pub from: Pattern,

    /// Target pattern or per-target overrides
    pub to: FlowTo,

    /// Structural edits, applied in order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub map: Vec<Operation>,

    /// Registry transforms, applied in order after `map`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pipe: Vec<PipeStep>,

    /// How to combine with existing target content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge: Option<MergeStrategy>,

    /// Skip the flow unless this holds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<Condition>,

    /// Wrap the result under this key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embed: Option<String>,

    /// Select this sub-object of the source before editing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Marker block name inside a shared markdown file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
}

impl Flow {
    /// Simple `from` → `to` flow with no edits
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: Pattern::Glob(from.into()),
            to: FlowTo::Pattern(Pattern::Glob(to.into())),
            map: Vec::new(),
            pipe: Vec::new(),
            merge: None,
            when: None,
            embed: None,
            path: None,
            section: None,
        }
    }

    pub fn with_map(mut self, map: Vec<Operation>) -> Self {
        self.map = map;
        self
    }

    pub fn with_pipe(mut self, pipe: &[&str]) -> Self {
        self.pipe = pipe.iter().map(|name| PipeStep::Name(name.to_string())).collect();
        self
    }

    pub fn with_merge(mut self, merge: MergeStrategy) -> Self {
        self.merge = Some(merge);
        self
    }

    /// Parse a single flow from YAML (JSON is valid YAML)
    pub fn from_yaml(yaml: &str) -> FlowResult<Self> {
        serde_yaml::from_str(yaml).map_err(Into::into)
    }

    /// Parse a list of flows from YAML
    pub fn list_from_yaml(yaml: &str) -> FlowResult<Vec<Self>> {
        serde_yaml::from_str(yaml).map_err(Into::into)
    }

    /// Render as YAML using the `$name:` map form for operations
    pub fn to_yaml(&self) -> FlowResult<String> {
        let value = serde_json::to_value(self)?;
        serde_yaml::to_string(&value).map_err(Into::into)
    }

    /// Every target of this flow with its effective overrides
    pub fn targets(&self) -> Vec<TargetSpec<'_>> {
        match &self.to {
            FlowTo::Pattern(pattern) => vec![TargetSpec {
                pattern,
                map: &self.map,
                pipe: &self.pipe,
                merge: self.merge.as_ref(),
            }],
            FlowTo::Targets(targets) => targets
                .iter()
                .map(|t| TargetSpec {
                    pattern: &t.target,
                    map: t.map.as_deref().unwrap_or(&self.map),
                    pipe: t.pipe.as_deref().unwrap_or(&self.pipe),
                    merge: t.merge.as_ref().or(self.merge.as_ref()),
                })
                .collect(),
        }
    }
}

/// One resolved target of a flow
#[derive(Debug, Clone, Copy)]
pub struct TargetSpec<'a> {
    pub pattern: &'a Pattern,
    pub map: &'a [Operation],
    pub pipe: &'a [PipeStep],
    pub merge: Option<&'a MergeStrategy>,
}

/// A path pattern
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Pattern {
    /// Single glob
    Glob(String),
    /// Globs in priority order
    Globs(Vec<String>),
    /// Pattern chosen by a switch expression
    Switch(SwitchPattern),
}

/// `{ $switch: ... }` wrapper
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchPattern {
    #[serde(rename = "$switch")]
    pub switch: SwitchExpression,
}

impl Pattern {
    /// The switch expression, if this pattern is one
    pub fn as_switch(&self) -> Option<&SwitchExpression> {
        match self {
            Self::Switch(p) => Some(&p.switch),
            _ => None,
        }
    }

    /// Literal globs, empty for switch patterns
    pub fn globs(&self) -> Vec<&str> {
        match self {
            Self::Glob(g) => vec![g.as_str()],
            Self::Globs(gs) => gs.iter().map(String::as_str).collect(),
            Self::Switch(_) => Vec::new(),
        }
    }
}

impl std::fmt::Display for Pattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Switch(p) => write!(f, "$switch({})", p.switch.field),
            other => write!(f, "{}", other.globs().join(" | ")),
        }
    }
}

impl From<&str> for Pattern {
    fn from(s: &str) -> Self {
        Self::Glob(s.to_string())
    }
}

/// The `to` side of a flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlowTo {
    Pattern(Pattern),
    Targets(Vec<FlowTarget>),
}

/// One entry of a multi-target `to`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowTarget {
    pub target: Pattern,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map: Option<Vec<Operation>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipe: Option<Vec<PipeStep>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge: Option<MergeStrategy>,
}

/// A structural edit on the document's fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operation {
    /// Rename keys, old → new
    #[serde(rename = "$rename")]
    Rename(BTreeMap<String, String>),

    /// Set a (dotted) path to a constant
    #[serde(rename = "$set")]
    Set { path: String, value: Value },

    /// Remove a (dotted) path
    #[serde(rename = "$unset")]
    Unset(String),

    /// Replace a field by switching on its current value
    #[serde(rename = "$switch")]
    Switch(SwitchExpression),

    /// Run a chain of steps over one field
    #[serde(rename = "$transform")]
    Transform { field: String, steps: Vec<TransformStep> },

    /// Copy a field, optionally through a registry transform
    #[serde(rename = "$copy")]
    Copy {
        from: String,
        to: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        transform: Option<String>,
    },
}

impl Operation {
    /// Tag name as written in flow files
    pub fn name(&self) -> &'static str {
        match self {
            Self::Rename(_) => "$rename",
            Self::Set { .. } => "$set",
            Self::Unset(_) => "$unset",
            Self::Switch(_) => "$switch",
            Self::Transform { .. } => "$transform",
            Self::Copy { .. } => "$copy",
        }
    }
}

/// A step inside `$transform`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TransformStep {
    /// Array → string joined by the separator
    #[serde(rename = "$join")]
    Join(String),

    /// String → array split on the separator
    #[serde(rename = "$split")]
    Split(String),

    /// Object → array of its keys
    #[serde(rename = "$keys")]
    Keys,

    /// Object → array of its values
    #[serde(rename = "$values")]
    Values,

    /// Array → object with every element mapped to `value`
    #[serde(rename = "$arrayToObject")]
    ArrayToObject {
        #[serde(default = "default_true")]
        value: Value,
    },

    /// Keep object members (or array elements) equal to `value`
    #[serde(rename = "$filter")]
    Filter(FilterPredicate),

    /// Element-wise function
    #[serde(rename = "$map")]
    Map(MapFn),

    /// Regex replacement on strings
    #[serde(rename = "$replace")]
    Replace(ReplaceSpec),
}

fn default_true() -> Value {
    Value::Bool(true)
}

impl TransformStep {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Join(_) => "$join",
            Self::Split(_) => "$split",
            Self::Keys => "$keys",
            Self::Values => "$values",
            Self::ArrayToObject { .. } => "$arrayToObject",
            Self::Filter(_) => "$filter",
            Self::Map(_) => "$map",
            Self::Replace(_) => "$replace",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterPredicate {
    pub value: Value,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub negate: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MapFn {
    Capitalize,
    Uppercase,
    Lowercase,
    /// Object → `[key, value]` pairs
    Entries,
    /// `[key, value]` pairs → object
    FromEntries,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplaceSpec {
    pub pattern: String,
    #[serde(default)]
    pub with: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flags: Option<String>,
}

impl ReplaceSpec {
    pub fn new(pattern: impl Into<String>, with: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            with: with.into(),
            flags: None,
        }
    }
}

/// A `pipe` entry: a registry transform or merge strategy name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PipeStep {
    Name(String),
    Configured {
        name: String,
        #[serde(default)]
        options: Value,
    },
}

impl PipeStep {
    pub fn name(&self) -> &str {
        match self {
            Self::Name(name) | Self::Configured { name, .. } => name,
        }
    }

    pub fn options(&self) -> Option<&Value> {
        match self {
            Self::Name(_) => None,
            Self::Configured { options, .. } => Some(options),
        }
    }
}

/// Policy for combining new content with existing target content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MergeStrategy {
    /// Recursive key union, arrays replaced
    Deep,
    /// Top-level key union
    Shallow,
    /// New content wins entirely
    Replace,
    /// Only owned keys are replaced
    Composite,
    /// Unrecognised name, rejected by validation
    Unknown(String),
}

impl MergeStrategy {
    /// Known strategy names
    pub const NAMES: &'static [&'static str] = &["deep", "shallow", "replace", "composite"];

    /// Parse a known strategy name
    pub fn from_name(name: &str) -> Option<Self> {
        match Self::from(name.to_string()) {
            Self::Unknown(_) => None,
            known => Some(known),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Deep => "deep",
            Self::Shallow => "shallow",
            Self::Replace => "replace",
            Self::Composite => "composite",
            Self::Unknown(name) => name,
        }
    }
}

impl From<String> for MergeStrategy {
    fn from(name: String) -> Self {
        match name.as_str() {
            "deep" => Self::Deep,
            "shallow" => Self::Shallow,
            "replace" => Self::Replace,
            "composite" => Self::Composite,
            _ => Self::Unknown(name),
        }
    }
}

impl From<MergeStrategy> for String {
    fn from(strategy: MergeStrategy) -> Self {
        strategy.as_str().to_string()
    }
}

impl std::fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Condition for running a flow
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    /// Path that must exist under the target root
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exists: Option<String>,

    /// Platform the context must be running for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
}
