// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 opkg contributors

//! Configuration
//!
//! Read from the user file (`<config dir>/opkg/config.yaml`) and then the
//! project file (`.opkg.yaml`); project values override user values key
//! by key. Missing files yield defaults.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::classifier::DEFAULT_PATH_BOOST;
use crate::errors::{FlowError, FlowResult};

/// Project configuration file name
pub const PROJECT_FILE: &str = ".opkg.yaml";

/// Conversion settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    /// Convert platform-specific packages before installing
    pub enabled: bool,
    /// Confidence added when a file sits under a platform's root dir
    pub path_boost: f64,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path_boost: DEFAULT_PATH_BOOST,
        }
    }
}

/// Resolved configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Config {
    /// Extra or overriding platform definitions
    pub platforms: Option<PathBuf>,
    /// Variables merged into every flow context
    pub variables: BTreeMap<String, String>,
    pub conversion: ConversionConfig,
    /// Platforms used when a command names none
    pub default_platforms: Vec<String>,
}

/// One configuration file as written; absent keys stay `None`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    platforms: Option<PathBuf>,
    #[serde(default)]
    variables: BTreeMap<String, String>,
    #[serde(default)]
    conversion: ConversionFile,
    default_platforms: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConversionFile {
    enabled: Option<bool>,
    path_boost: Option<f64>,
}

impl Config {
    /// Load the user file, then the project file in `dir`
    pub fn load(dir: &Path) -> FlowResult<Self> {
        let mut config = Self::default();

        if let Some(path) = Self::user_file() {
            if path.exists() {
                config.apply(Self::read(&path)?, path.parent());
            }
        }

        let project = dir.join(PROJECT_FILE);
        if project.exists() {
            config.apply(Self::read(&project)?, Some(dir));
        }

        Ok(config)
    }

    /// Load a single file over the defaults
    pub fn load_from(path: &Path) -> FlowResult<Self> {
        let mut config = Self::default();
        config.apply(Self::read(path)?, path.parent());
        Ok(config)
    }

    /// Location of the user configuration file
    pub fn user_file() -> Option<PathBuf> {
        ProjectDirs::from("", "", "opkg").map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    fn read(path: &Path) -> FlowResult<ConfigFile> {
        let content = std::fs::read_to_string(path).map_err(|e| FlowError::FileReadError {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        if content.trim().is_empty() {
            return Ok(ConfigFile::default());
        }

        let file: ConfigFile = serde_yaml::from_str(&content).map_err(|e| FlowError::ConfigError {
            message: format!("{}: {}", path.display(), e),
            help: Some(
                "Known keys: platforms, variables, conversion.enabled, conversion.path_boost, default_platforms".into(),
            ),
        })?;

        if let Some(boost) = file.conversion.path_boost {
            if !(0.0..=1.0).contains(&boost) {
                return Err(FlowError::ConfigError {
                    message: format!("{}: conversion.path_boost must be between 0 and 1, got {}", path.display(), boost),
                    help: None,
                });
            }
        }

        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(file)
    }

    /// Overlay one file; relative `platforms` paths resolve against `base`
    fn apply(&mut self, file: ConfigFile, base: Option<&Path>) {
        if let Some(platforms) = file.platforms {
            self.platforms = Some(match base {
                Some(base) if platforms.is_relative() => base.join(platforms),
                _ => platforms,
            });
        }
        self.variables.extend(file.variables);
        if let Some(enabled) = file.conversion.enabled {
            self.conversion.enabled = enabled;
        }
        if let Some(boost) = file.conversion.path_boost {
            self.conversion.path_boost = boost;
        }
        if let Some(defaults) = file.default_platforms {
            self.default_platforms = defaults;
        }
    }
}
