// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 opkg contributors

//! # opkg - Flow Transformation Engine
//!
//! `opkg` installs portable AI-assistant packages (agents, rules, commands,
//! skills) into the layouts of different host tools, and reads platform
//! edits back into the neutral package format.
//!
//! ## Features
//!
//! - **Declarative flows** - glob-to-glob file moves with field edits, codecs and merges
//! - **Inversion** - import flows derived from export flows, with every lossy drop reported
//! - **Format detection** - weighted frontmatter schemas pick a file's platform
//! - **Conversion** - platform-specific packages normalised to the universal layout
//!
//! ## Quick Start
//!
//! ```bash
//! # Which platform wrote these files?
//! opkg classify .claude/agents/*.md
//!
//! # Install a package for Claude
//! opkg apply --platform claude --package-root ./my-pkg
//!
//! # Convert a Cursor package to the universal layout
//! opkg convert ./cursor-pkg --output ./universal
//! ```

pub mod cache;
pub mod classifier;
pub mod cli;
pub mod config;
pub mod convert;
pub mod errors;
pub mod flow;
pub mod package;
pub mod platforms;
pub mod switch;
pub mod transforms;
pub mod utils;

// Re-export commonly used types
pub use errors::{ErrorKind, FlowError, FlowResult};
pub use flow::{Direction, Flow, FlowContext, FlowExecutor, FlowInverter, FlowReport, InvertedFlow};
pub use package::PackageFile;
pub use transforms::TransformRegistry;

// Re-export detection and conversion types
pub use classifier::{Classification, FormatClassifier, FormatGroup};
pub use convert::{ConversionCoordinator, ConversionOptions, ConversionResult};
pub use platforms::{PlatformDefinition, PlatformRegistry};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
