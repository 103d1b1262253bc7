// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 opkg contributors

//! CLI command definitions and handlers
//!
//! Defines the command-line interface for opkg.

pub mod apply;
pub mod classify;
pub mod convert;
pub mod invert;
pub mod platforms;
pub mod validate;

use clap::{Parser, Subcommand};
use miette::Result;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::flow::FileStore;
use crate::package::PackageFile;
use crate::platforms::PlatformRegistry;

/// Portable AI-assistant package tooling
///
/// Install, convert and inspect agents, rules, commands and skills across
/// host tools.
#[derive(Parser, Debug)]
#[clap(
    name = "opkg",
    version,
    about = "Flow transformation engine for portable agents, rules, commands and skills",
    long_about = None,
    after_help = "Examples:\n\
        opkg classify .claude/agents/*.md           Detect the format of files\n\
        opkg convert ./my-pkg --output ./universal  Convert a platform package\n\
        opkg apply -p claude --package-root ./pkg   Install a package for Claude\n\
        opkg invert -p cursor                       Show Cursor's import flows\n\n\
        See 'opkg <command> --help' for more information on a specific command."
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[clap(short, long, global = true)]
    pub verbose: bool,

    /// Change to directory before executing
    #[clap(short = 'C', long, global = true, value_name = "DIR")]
    pub directory: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Detect which platform format files are written in
    Classify {
        /// Files to classify
        files: Vec<PathBuf>,

        /// Output format (text, json)
        #[clap(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Convert a platform-specific package to the universal layout
    Convert {
        /// Package directory
        dir: PathBuf,

        /// Write the converted package here (report only when omitted)
        #[clap(short, long)]
        output: Option<PathBuf>,

        /// Package name used for section markers
        #[clap(long)]
        name: Option<String>,

        /// Show what would be written
        #[clap(long)]
        dry_run: bool,
    },

    /// Run a platform's flows between a package and a workspace
    Apply {
        /// Platforms to apply (defaults to `default_platforms` in .opkg.yaml)
        #[clap(short, long)]
        platform: Vec<String>,

        /// Package directory
        #[clap(long, default_value = ".")]
        package_root: PathBuf,

        /// Workspace directory
        #[clap(long, default_value = ".")]
        workspace_root: PathBuf,

        /// Package name (defaults to the package directory name)
        #[clap(long)]
        name: Option<String>,

        /// Save workspace edits back into the package instead of installing
        #[clap(long)]
        save: bool,

        /// Show what would be written
        #[clap(long)]
        dry_run: bool,

        /// Flow variable as key=value (repeatable)
        #[clap(long = "var", value_name = "KEY=VALUE")]
        vars: Vec<String>,
    },

    /// Print a platform's import flows and what inversion dropped
    Invert {
        /// Platform id
        #[clap(short, long)]
        platform: String,
    },

    /// Validate a flow file
    Validate {
        /// YAML or JSON file holding a flow or a list of flows
        flows: PathBuf,
    },

    /// List registered platforms
    Platforms {
        /// List registered transforms instead
        #[clap(long)]
        transforms: bool,
    },
}

/// Output format for classify command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

/// Configuration for the current directory
pub(crate) fn load_config() -> Result<Config> {
    let cwd = std::env::current_dir().map_err(|e| miette::miette!("Failed to get current directory: {}", e))?;
    Ok(Config::load(&cwd)?)
}

/// Built-in platforms plus any configured overrides
pub(crate) fn load_platforms(config: &Config) -> Result<PlatformRegistry> {
    Ok(PlatformRegistry::load(config.platforms.as_deref())?)
}

/// Read every text file in a store as package files
///
/// Unreadable files (binary content, permissions) are skipped with a
/// warning.
pub(crate) async fn read_package(store: &dyn FileStore) -> Result<Vec<PackageFile>> {
    let mut files = Vec::new();
    for path in store.list().await? {
        match store.read(&path).await {
            Ok(Some(content)) => files.push(PackageFile::new(path, content)),
            Ok(None) => {}
            Err(e) => tracing::warn!("Skipping {}: {}", path, e),
        }
    }
    Ok(files)
}

/// Directory name used as the default package name
pub(crate) fn package_name(root: &Path) -> String {
    root.canonicalize()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "package".to_string())
}
