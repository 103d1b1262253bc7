// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 opkg contributors

//! Error types for the flow engine
//!
//! Every failure the engine can report maps onto a small taxonomy
//! (see [`ErrorKind`]) so that callers can decide per item whether to
//! continue a batch.

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for engine operations
pub type FlowResult<T> = Result<T, FlowError>;

/// Coarse classification of a [`FlowError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed flow or switch expression, rejected before any I/O
    Validation,
    /// Missing source file, variable, platform or schema
    NotFound,
    /// Switch with no matching case and no default
    NoMatch,
    /// A registry transform was given out-of-domain input
    Transform,
    /// A merge strategy hit a structural conflict
    MergeConflict,
    /// Filesystem, parsing or discovery failure
    Io,
}

/// Main error type for opkg
#[derive(Error, Debug, Diagnostic)]
pub enum FlowError {
    // ─────────────────────────────────────────────────────────────────────────
    // Validation Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Invalid flow: {}", .violations.join("; "))]
    #[diagnostic(
        code(opkg::invalid_flow),
        help("Every violated rule is listed; fix them all before re-running")
    )]
    InvalidFlow { violations: Vec<String> },

    #[error("Invalid switch expression: {reason}")]
    #[diagnostic(code(opkg::invalid_switch))]
    InvalidSwitch { reason: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Not Found Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Unknown variable '$${name}'")]
    #[diagnostic(
        code(opkg::unknown_variable),
        help("Define '{name}' in the flow context variables or in .opkg.yaml")
    )]
    UnknownVariable { name: String },

    #[error("Source file not found: {path}")]
    #[diagnostic(code(opkg::source_not_found))]
    SourceNotFound { path: String },

    #[error("Unknown platform: {platform}")]
    #[diagnostic(
        code(opkg::unknown_platform),
        help("Run 'opkg platforms' to list the registered platforms")
    )]
    UnknownPlatform { platform: String },

    #[error("Detection schema not found: {id}")]
    #[diagnostic(code(opkg::schema_not_found))]
    SchemaNotFound { id: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Switch Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("No case matched '{value}' and no default was given")]
    #[diagnostic(
        code(opkg::no_matching_case),
        help("Add a 'default' to the $switch expression or a catch-all '*' case")
    )]
    NoMatchingCase { value: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Transform Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Unknown transform: {name}")]
    #[diagnostic(
        code(opkg::unknown_transform),
        help("Run 'opkg platforms --transforms' to list registered transforms")
    )]
    UnknownTransform { name: String },

    #[error("Transform '{transform}' failed: {message}")]
    #[diagnostic(code(opkg::transform_failed))]
    Transform {
        transform: String,
        message: String,
        /// The value the transform was given
        value: serde_json::Value,
        /// The options the transform was given
        options: serde_json::Value,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Merge Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Merge conflict at '{path}': cannot combine {existing} with {incoming}")]
    #[diagnostic(
        code(opkg::merge_conflict),
        help("Use 'replace' or 'composite' merge for targets with incompatible shapes")
    )]
    MergeConflict {
        path: String,
        existing: String,
        incoming: String,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // File Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Failed to read file '{path}': {error}")]
    #[diagnostic(code(opkg::file_read_error))]
    FileReadError { path: PathBuf, error: String },

    #[error("Failed to write file '{path}': {error}")]
    #[diagnostic(code(opkg::file_write_error))]
    FileWriteError { path: PathBuf, error: String },

    #[error("Failed to discover files under '{root}': {error}")]
    #[diagnostic(code(opkg::discovery_failed))]
    Discovery { root: PathBuf, error: String },

    #[error("Configuration error: {message}")]
    #[diagnostic(code(opkg::config_error))]
    ConfigError {
        message: String,
        #[help]
        help: Option<String>,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // IO/Parsing Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("IO error: {message}")]
    #[diagnostic(code(opkg::io_error))]
    Io { message: String },

    #[error("YAML parsing error: {message}")]
    #[diagnostic(code(opkg::yaml_error))]
    Yaml { message: String },

    #[error("JSON parsing error: {message}")]
    #[diagnostic(code(opkg::json_error))]
    Json { message: String },

    #[error("TOML error: {message}")]
    #[diagnostic(code(opkg::toml_error))]
    Toml { message: String },

    #[error("Glob pattern error: {message}")]
    #[diagnostic(code(opkg::glob_error))]
    GlobPattern { message: String },

    #[error("Regex error: {message}")]
    #[diagnostic(code(opkg::regex_error))]
    Regex { message: String },
}

impl From<std::io::Error> for FlowError {
    fn from(e: std::io::Error) -> Self {
        Self::Io { message: e.to_string() }
    }
}

impl From<serde_yaml::Error> for FlowError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Yaml { message: e.to_string() }
    }
}

impl From<serde_json::Error> for FlowError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json { message: e.to_string() }
    }
}

impl From<toml::de::Error> for FlowError {
    fn from(e: toml::de::Error) -> Self {
        Self::Toml { message: e.to_string() }
    }
}

impl From<toml::ser::Error> for FlowError {
    fn from(e: toml::ser::Error) -> Self {
        Self::Toml { message: e.to_string() }
    }
}

impl From<glob::PatternError> for FlowError {
    fn from(e: glob::PatternError) -> Self {
        Self::GlobPattern { message: e.to_string() }
    }
}

impl From<regex::Error> for FlowError {
    fn from(e: regex::Error) -> Self {
        Self::Regex { message: e.to_string() }
    }
}

impl FlowError {
    /// Classify this error into the engine taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidFlow { .. } | Self::InvalidSwitch { .. } | Self::ConfigError { .. } => {
                ErrorKind::Validation
            }
            Self::UnknownVariable { .. }
            | Self::SourceNotFound { .. }
            | Self::UnknownPlatform { .. }
            | Self::SchemaNotFound { .. } => ErrorKind::NotFound,
            Self::NoMatchingCase { .. } => ErrorKind::NoMatch,
            Self::UnknownTransform { .. } | Self::Transform { .. } => ErrorKind::Transform,
            Self::MergeConflict { .. } => ErrorKind::MergeConflict,
            Self::FileReadError { .. }
            | Self::FileWriteError { .. }
            | Self::Discovery { .. }
            | Self::Io { .. }
            | Self::Yaml { .. }
            | Self::Json { .. }
            | Self::Toml { .. }
            | Self::GlobPattern { .. }
            | Self::Regex { .. } => ErrorKind::Io,
        }
    }

    /// Build a transform failure that keeps the offending input around
    pub fn transform(
        transform: &str,
        message: impl Into<String>,
        value: &serde_json::Value,
        options: &serde_json::Value,
    ) -> Self {
        Self::Transform {
            transform: transform.to_string(),
            message: message.into(),
            value: value.clone(),
            options: options.clone(),
        }
    }

    /// Whether the batch driver may continue past this error
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Discovery { .. })
    }
}
