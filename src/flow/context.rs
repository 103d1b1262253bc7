// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 opkg contributors

//! Per-execution flow context

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Which way content is moving
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Package (universal) to workspace (platform)
    Install,
    /// Workspace (platform) back to package (universal)
    Save,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Install => write!(f, "install"),
            Self::Save => write!(f, "save"),
        }
    }
}

/// Everything a flow needs to know about the current execution
///
/// Built fresh for each call and never mutated while a flow runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowContext {
    pub workspace_root: PathBuf,
    pub package_root: PathBuf,
    pub platform: String,
    pub package_name: String,
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
    pub direction: Direction,
    #[serde(default)]
    pub dry_run: bool,
    /// Keys a previous install owned, keyed by target path
    #[serde(default)]
    pub owned_keys: BTreeMap<String, Vec<String>>,
}

impl FlowContext {
    /// Create a context rooted at the current directory
    pub fn new(platform: impl Into<String>, direction: Direction) -> Self {
        Self {
            workspace_root: PathBuf::from("."),
            package_root: PathBuf::from("."),
            platform: platform.into(),
            package_name: String::new(),
            variables: BTreeMap::new(),
            direction,
            dry_run: false,
            owned_keys: BTreeMap::new(),
        }
    }

    pub fn with_roots(mut self, package_root: impl Into<PathBuf>, workspace_root: impl Into<PathBuf>) -> Self {
        self.package_root = package_root.into();
        self.workspace_root = workspace_root.into();
        self
    }

    pub fn with_package_name(mut self, name: impl Into<String>) -> Self {
        self.package_name = name.into();
        self
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    pub fn with_variables(mut self, variables: impl IntoIterator<Item = (String, String)>) -> Self {
        self.variables.extend(variables);
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_owned_keys(mut self, target: impl Into<String>, keys: Vec<String>) -> Self {
        self.owned_keys.insert(target.into(), keys);
        self
    }

    /// Look up a variable
    ///
    /// Explicit variables shadow the built-in ones (`platform`,
    /// `packageName`, `direction`, `workspaceRoot`, `packageRoot`).
    pub fn variable(&self, name: &str) -> Option<String> {
        if let Some(value) = self.variables.get(name) {
            return Some(value.clone());
        }

        match name {
            "platform" => Some(self.platform.clone()),
            "packageName" if !self.package_name.is_empty() => Some(self.package_name.clone()),
            "direction" => Some(self.direction.to_string()),
            "workspaceRoot" => Some(self.workspace_root.display().to_string()),
            "packageRoot" => Some(self.package_root.display().to_string()),
            _ => None,
        }
    }

    /// Root that source patterns are matched under
    pub fn source_root(&self) -> &PathBuf {
        match self.direction {
            Direction::Install => &self.package_root,
            Direction::Save => &self.workspace_root,
        }
    }

    /// Root that target patterns are written under
    pub fn target_root(&self) -> &PathBuf {
        match self.direction {
            Direction::Install => &self.workspace_root,
            Direction::Save => &self.package_root,
        }
    }

    /// Expand `$$name` references embedded in a string
    ///
    /// Unknown references are left as written.
    pub fn interpolate(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;

        while let Some(start) = rest.find(crate::switch::VARIABLE_PREFIX) {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let len = after
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(after.len());
            let name = &after[..len];
            match self.variable(name).filter(|_| !name.is_empty()) {
                Some(value) => out.push_str(&value),
                None => {
                    out.push_str(crate::switch::VARIABLE_PREFIX);
                    out.push_str(name);
                }
            }
            rest = &after[len..];
        }

        out.push_str(rest);
        out
    }
}
