// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 opkg contributors

//! Flow validation
//!
//! Validates a flow before any file is touched. Every violated rule is
//! collected rather than stopping at the first.

use super::definition::{Flow, FlowTo, MergeStrategy, Operation, Pattern, PipeStep, TransformStep};
use super::operations::NegativeLookahead;
use super::paths;
use crate::errors::{FlowError, FlowResult};
use crate::switch::SwitchExpression;
use crate::transforms::TransformRegistry;

/// Flow validator
pub struct FlowValidator<'a> {
    registry: Option<&'a TransformRegistry>,
}

impl<'a> FlowValidator<'a> {
    /// Structural checks only
    pub fn new() -> Self {
        Self { registry: None }
    }

    /// Also check that pipe and copy transforms are registered
    pub fn with_registry(registry: &'a TransformRegistry) -> Self {
        Self {
            registry: Some(registry),
        }
    }

    /// Validate a flow, collecting every problem
    pub fn validate(&self, flow: &Flow) -> ValidationResult {
        let mut result = ValidationResult::new();

        Self::validate_pattern("from", &flow.from, &mut result);

        match &flow.to {
            FlowTo::Pattern(pattern) => Self::validate_pattern("to", pattern, &mut result),
            FlowTo::Targets(targets) => {
                if targets.is_empty() {
                    result.add_error("'to' has no targets");
                }
                for (idx, target) in targets.iter().enumerate() {
                    let location = format!("to[{}]", idx);
                    Self::validate_pattern(&location, &target.target, &mut result);
                    if let Some(merge) = &target.merge {
                        Self::validate_merge(&location, merge, &mut result);
                    }
                    if let Some(map) = &target.map {
                        self.validate_operations(&location, map, &mut result);
                    }
                    if let Some(pipe) = &target.pipe {
                        self.validate_pipe(&location, pipe, &mut result);
                    }
                }
            }
        }

        if let Some(merge) = &flow.merge {
            Self::validate_merge("flow", merge, &mut result);
        }
        self.validate_operations("map", &flow.map, &mut result);
        self.validate_pipe("pipe", &flow.pipe, &mut result);

        if let Some(when) = &flow.when {
            if when.exists.is_none() && when.platform.is_none() {
                result.add_warning("'when' has no conditions and always holds");
            }
        }
        for (name, value) in [("embed", &flow.embed), ("path", &flow.path), ("section", &flow.section)] {
            if value.as_deref().is_some_and(str::is_empty) {
                result.add_error(&format!("'{}' is empty", name));
            }
        }
        if flow.embed.is_some() && flow.path.is_some() {
            result.add_warning("'embed' and 'path' are both set; extraction runs before embedding");
        }

        result
    }

    /// Validate and convert violations into [`FlowError::InvalidFlow`]
    pub fn check(&self, flow: &Flow) -> FlowResult<ValidationResult> {
        let result = self.validate(flow);
        if result.is_valid() {
            Ok(result)
        } else {
            Err(FlowError::InvalidFlow {
                violations: result.errors,
            })
        }
    }

    fn validate_pattern(location: &str, pattern: &Pattern, result: &mut ValidationResult) {
        match pattern {
            Pattern::Glob(glob) => Self::validate_glob(location, glob, result),
            Pattern::Globs(globs) => {
                if globs.is_empty() {
                    result.add_error(&format!("'{}' pattern list is empty", location));
                }
                for glob in globs {
                    Self::validate_glob(location, glob, result);
                }
            }
            Pattern::Switch(p) => Self::validate_switch(location, &p.switch, result),
        }
    }

    fn validate_glob(location: &str, glob: &str, result: &mut ValidationResult) {
        if glob.trim().is_empty() {
            result.add_error(&format!("'{}' pattern is empty", location));
            return;
        }
        if let Err(e) = paths::compile(glob) {
            result.add_error(&format!("'{}' pattern '{}' is not a valid glob: {}", location, glob, e));
        }
    }

    fn validate_switch(location: &str, expr: &SwitchExpression, result: &mut ValidationResult) {
        if expr.field.trim().is_empty() {
            result.add_error(&format!("{}: $switch field is empty", location));
        }
        if expr.cases.is_empty() && expr.default.is_none() {
            result.add_error(&format!("{}: $switch has no cases and no default", location));
        }
        for case in &expr.cases {
            if !case.value.is_string() {
                result.add_error(&format!(
                    "{}: $switch case value {} must be a glob string",
                    location, case.value
                ));
            }
        }
        if let Some(default) = &expr.default {
            if !default.is_string() {
                result.add_error(&format!("{}: $switch default must be a glob string", location));
            }
        }
    }

    fn validate_merge(location: &str, merge: &MergeStrategy, result: &mut ValidationResult) {
        if let MergeStrategy::Unknown(name) = merge {
            result.add_error(&format!(
                "{}: unknown merge strategy '{}' (expected one of: {})",
                location,
                name,
                MergeStrategy::NAMES.join(", ")
            ));
        }
    }

    fn validate_operations(&self, location: &str, ops: &[Operation], result: &mut ValidationResult) {
        for (idx, op) in ops.iter().enumerate() {
            let at = format!("{}[{}] {}", location, idx, op.name());
            match op {
                Operation::Rename(mapping) => {
                    if mapping.is_empty() {
                        result.add_warning(&format!("{}: empty mapping", at));
                    }
                    if mapping.iter().any(|(k, v)| k.is_empty() || v.is_empty()) {
                        result.add_error(&format!("{}: keys must not be empty", at));
                    }
                }
                Operation::Set { path, .. } | Operation::Unset(path) => {
                    if path.is_empty() {
                        result.add_error(&format!("{}: path is empty", at));
                    }
                }
                Operation::Switch(expr) => {
                    if expr.field.is_empty() {
                        result.add_error(&format!("{}: field is empty", at));
                    }
                    if expr.cases.is_empty() {
                        result.add_warning(&format!("{}: no cases", at));
                    }
                }
                Operation::Transform { field, steps } => {
                    if field.is_empty() {
                        result.add_error(&format!("{}: field is empty", at));
                    }
                    if steps.is_empty() {
                        result.add_warning(&format!("{}: no steps", at));
                    }
                    for step in steps {
                        if let TransformStep::Replace(spec) = step {
                            let supported = NegativeLookahead::parse(&spec.pattern).is_some()
                                || regex::Regex::new(&spec.pattern).is_ok();
                            if !supported {
                                result.add_error(&format!(
                                    "{}: $replace pattern '{}' is not a valid regex",
                                    at, spec.pattern
                                ));
                            }
                        }
                    }
                }
                Operation::Copy { from, to, transform } => {
                    if from.is_empty() || to.is_empty() {
                        result.add_error(&format!("{}: 'from' and 'to' are required", at));
                    }
                    if let (Some(name), Some(registry)) = (transform, self.registry) {
                        if !registry.contains(name) {
                            result.add_error(&format!("{}: unknown transform '{}'", at, name));
                        }
                    }
                }
            }
        }
    }

    fn validate_pipe(&self, location: &str, pipe: &[PipeStep], result: &mut ValidationResult) {
        for step in pipe {
            let name = step.name();
            if name.is_empty() {
                result.add_error(&format!("{}: empty transform name", location));
                continue;
            }
            let known = MergeStrategy::from_name(name).is_some()
                || self.registry.map_or(true, |r| r.contains(name));
            if !known {
                result.add_error(&format!("{}: unknown transform '{}'", location, name));
            }
        }
    }
}

impl Default for FlowValidator<'_> {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of flow validation
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, message: &str) {
        self.errors.push(message.to_string());
    }

    pub fn add_warning(&mut self, message: &str) {
        self.warnings.push(message.to_string());
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_flow() {
        let flow = Flow::new("agents/**/*.md", ".claude/agents/**/*.md").with_merge(MergeStrategy::Deep);
        let result = FlowValidator::new().validate(&flow);
        assert!(result.is_valid());
        assert!(!result.has_warnings());
    }

    #[test]
    fn test_every_violation_is_reported() {
        let mut flow = Flow::new("", "[").with_merge(MergeStrategy::Unknown("sideways".into()));
        flow.section = Some(String::new());

        let err = FlowValidator::new().check(&flow).unwrap_err();
        match err {
            FlowError::InvalidFlow { violations } => {
                assert_eq!(violations.len(), 4, "{violations:?}");
                assert!(violations.iter().any(|v| v.contains("'from' pattern is empty")));
                assert!(violations.iter().any(|v| v.contains("sideways")));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_pipe_transform_with_registry() {
        let registry = TransformRegistry::with_builtins();
        let flow = Flow::new("a.json", "b.json").with_pipe(&["jsonc", "deep", "frobnicate"]);

        let result = FlowValidator::with_registry(&registry).validate(&flow);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("frobnicate"));

        assert!(FlowValidator::new().validate(&flow).is_valid());
    }

    #[test]
    fn test_switch_pattern_needs_cases_or_default() {
        let flow = Flow::from_yaml("from: a\nto: { $switch: { field: $$x, cases: [] } }\n").unwrap();
        let result = FlowValidator::new().validate(&flow);
        assert!(!result.is_valid());
    }
}
