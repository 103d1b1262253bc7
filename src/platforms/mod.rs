// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 opkg contributors

//! Platform definitions
//!
//! A platform is a host tool with its own directory layout and
//! frontmatter conventions. Each definition carries the export flows that
//! install universal content into the platform's layout and a detection
//! schema for recognising files written in its format.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

use crate::classifier::{DetectionSchema, FormatClassifier, ImportRoot, SchemaCache};
use crate::errors::{FlowError, FlowResult};
use crate::flow::{Flow, FlowInverter, InvertedFlow};
use crate::package::DocumentFormat;
use crate::transforms::strip_json_comments;

const BUILTIN: &str = include_str!("builtin.yaml");

/// One platform definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformDefinition {
    /// Stable platform id (`claude`, `cursor`, ...)
    pub id: String,

    /// Human readable name
    #[serde(default)]
    pub name: String,

    /// Directory the platform keeps its files under
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_dir: Option<String>,

    /// Instructions file at the workspace root
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_file: Option<String>,

    /// Flows from the universal layout into this platform's layout
    #[serde(default)]
    pub export: Vec<Flow>,

    /// Frontmatter detection schema
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detection: Option<DetectionSchema>,
}

impl PlatformDefinition {
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }

    /// Import-root prefix (`.claude/`), if the platform has a root dir
    pub fn import_root(&self) -> Option<String> {
        self.root_dir
            .as_deref()
            .map(|dir| format!("{}/", dir.trim_end_matches('/')))
    }

    /// Flows that read this platform's files back as universal content
    pub fn import_flows(&self) -> Vec<InvertedFlow> {
        FlowInverter::invert_all(&self.export, &self.id)
    }
}

/// Ordered set of platform definitions
#[derive(Debug, Clone, Default)]
pub struct PlatformRegistry {
    platforms: Vec<PlatformDefinition>,
}

impl PlatformRegistry {
    /// The definitions shipped with opkg
    pub fn builtin() -> FlowResult<Self> {
        let definitions: Vec<PlatformDefinition> = serde_yaml::from_str(BUILTIN)?;
        Ok(Self::from_definitions(definitions))
    }

    /// Build a registry, later duplicates replacing earlier ones
    pub fn from_definitions(definitions: Vec<PlatformDefinition>) -> Self {
        let mut registry = Self::default();
        for definition in definitions {
            registry.insert(definition);
        }
        registry
    }

    /// Parse definitions from JSON, JSONC or YAML text
    pub fn parse(content: &str, format: DocumentFormat) -> FlowResult<Self> {
        let definitions: Vec<PlatformDefinition> = match format {
            DocumentFormat::Json | DocumentFormat::Jsonc => serde_json::from_str(&strip_json_comments(content))?,
            DocumentFormat::Yaml => serde_yaml::from_str(content)?,
            other => {
                return Err(FlowError::ConfigError {
                    message: format!("platform definitions cannot be read from {} files", other),
                    help: Some("Use a .json, .jsonc or .yaml file".into()),
                })
            }
        };
        Ok(Self::from_definitions(definitions))
    }

    /// Load definitions from a file
    pub fn from_file(path: &Path) -> FlowResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| FlowError::FileReadError {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        Self::parse(&content, DocumentFormat::from_path(&path.to_string_lossy()))
    }

    /// Built-in definitions overridden by those in `path`, if given
    pub fn load(path: Option<&Path>) -> FlowResult<Self> {
        let mut registry = Self::builtin()?;
        if let Some(path) = path {
            let custom = Self::from_file(path)?;
            tracing::debug!("Loaded {} platform definition(s) from {}", custom.len(), path.display());
            registry.merge(custom);
        }
        Ok(registry)
    }

    /// Add or replace a definition by id
    pub fn insert(&mut self, mut definition: PlatformDefinition) {
        if let Some(schema) = definition.detection.as_mut() {
            if schema.id.is_empty() {
                schema.id = definition.id.clone();
            }
        }
        match self.platforms.iter_mut().find(|p| p.id == definition.id) {
            Some(existing) => *existing = definition,
            None => self.platforms.push(definition),
        }
    }

    /// Overlay another registry; its definitions win by id
    pub fn merge(&mut self, other: PlatformRegistry) {
        for definition in other.platforms {
            self.insert(definition);
        }
    }

    pub fn get(&self, id: &str) -> Option<&PlatformDefinition> {
        self.platforms.iter().find(|p| p.id == id)
    }

    /// Like [`get`](Self::get) but failing with [`FlowError::UnknownPlatform`]
    pub fn require(&self, id: &str) -> FlowResult<&PlatformDefinition> {
        self.get(id).ok_or_else(|| FlowError::UnknownPlatform {
            platform: id.to_string(),
        })
    }

    pub fn ids(&self) -> Vec<&str> {
        self.platforms.iter().map(|p| p.id.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlatformDefinition> {
        self.platforms.iter()
    }

    pub fn len(&self) -> usize {
        self.platforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.platforms.is_empty()
    }

    /// Detection schemas of every platform that has one, via the cache
    pub fn detection_schemas(&self, cache: &SchemaCache) -> FlowResult<Vec<Arc<DetectionSchema>>> {
        self.platforms
            .iter()
            .filter(|p| p.detection.is_some())
            .map(|p| {
                cache.get_or_load(&p.id, || {
                    p.detection
                        .clone()
                        .ok_or_else(|| FlowError::SchemaNotFound { id: p.id.clone() })
                })
            })
            .collect()
    }

    /// Root-dir → platform table used for path boosting, via the cache
    pub fn import_roots(&self, cache: &SchemaCache) -> Arc<Vec<ImportRoot>> {
        cache.import_roots_or_compile(|| {
            self.platforms
                .iter()
                .filter_map(|p| {
                    p.import_root().map(|root| ImportRoot {
                        root,
                        platform: p.id.clone(),
                    })
                })
                .collect()
        })
    }

    /// A classifier over every platform's detection schema
    pub fn classifier(&self, cache: &SchemaCache, path_boost: f64) -> FlowResult<FormatClassifier> {
        Ok(FormatClassifier::new(self.detection_schemas(cache)?)
            .with_import_roots(self.import_roots(cache))
            .with_path_boost(path_boost))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{UNIVERSAL, DEFAULT_PATH_BOOST};
    use crate::flow::FlowValidator;
    use crate::package::PackageFile;
    use crate::transforms::TransformRegistry;

    #[test]
    fn test_builtin_platforms() {
        let registry = PlatformRegistry::builtin().unwrap();
        assert_eq!(registry.ids(), vec!["claude", "opencode", "cursor", "codex"]);

        let claude = registry.require("claude").unwrap();
        assert_eq!(claude.import_root().as_deref(), Some(".claude/"));
        assert_eq!(claude.detection.as_ref().unwrap().id, "claude");
        assert!(registry.get("codex").unwrap().detection.is_none());
    }

    #[test]
    fn test_builtin_flows_are_valid() {
        let transforms = TransformRegistry::with_builtins();
        let validator = FlowValidator::with_registry(&transforms);
        let registry = PlatformRegistry::builtin().unwrap();

        for platform in registry.iter() {
            for flow in &platform.export {
                let result = validator.validate(flow);
                assert!(result.is_valid(), "{}: {:?}", platform.id, result.errors);
            }
            for inverted in platform.import_flows() {
                let result = validator.validate(&inverted.flow);
                assert!(result.is_valid(), "{} import: {:?}", platform.id, result.errors);
            }
        }
    }

    #[test]
    fn test_unknown_platform() {
        let registry = PlatformRegistry::builtin().unwrap();
        let err = registry.require("emacs").unwrap_err();
        assert!(matches!(err, FlowError::UnknownPlatform { .. }));
    }

    #[test]
    fn test_custom_definitions_override_by_id() {
        let custom = PlatformRegistry::parse(
            r#"[
  // replaces the built-in definition
  { "id": "cursor", "name": "Cursor (custom)", "rootDir": ".cursor-next" },
  { "id": "windsurf", "rootDir": ".windsurf",
    "export": [ { "from": "rules/**/*.md", "to": ".windsurf/rules/**/*.md" } ] }
]"#,
            DocumentFormat::Jsonc,
        )
        .unwrap();

        let mut registry = PlatformRegistry::builtin().unwrap();
        registry.merge(custom);

        assert_eq!(registry.len(), 5);
        assert_eq!(registry.require("cursor").unwrap().display_name(), "Cursor (custom)");
        assert!(registry.require("cursor").unwrap().export.is_empty());
        assert_eq!(registry.require("windsurf").unwrap().display_name(), "windsurf");
    }

    #[test]
    fn test_from_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("platforms.yaml");
        std::fs::write(&path, "- id: zed\n  rootDir: .zed\n").unwrap();

        let registry = PlatformRegistry::load(Some(&path)).unwrap();
        assert!(registry.get("zed").is_some());
        assert!(registry.get("claude").is_some());

        let missing = PlatformRegistry::from_file(&temp.path().join("nope.yaml")).unwrap_err();
        assert!(matches!(missing, FlowError::FileReadError { .. }));

        let text = temp.path().join("platforms.txt");
        std::fs::write(&text, "").unwrap();
        assert!(matches!(
            PlatformRegistry::from_file(&text).unwrap_err(),
            FlowError::ConfigError { .. }
        ));
    }

    #[test]
    fn test_schemas_load_through_cache() {
        let registry = PlatformRegistry::builtin().unwrap();
        let cache = SchemaCache::new();

        let first = registry.detection_schemas(&cache).unwrap();
        let second = registry.detection_schemas(&cache).unwrap();
        assert_eq!(first.len(), 3);
        assert!(Arc::ptr_eq(&first[0], &second[0]));
        assert_eq!(cache.stats().loads, 3);
        assert_eq!(registry.import_roots(&cache).len(), 4);
    }

    #[test]
    fn test_builtin_classification() {
        let registry = PlatformRegistry::builtin().unwrap();
        let classifier = registry.classifier(&SchemaCache::new(), DEFAULT_PATH_BOOST).unwrap();

        let claude = PackageFile::new(
            "agents/reviewer.md",
            "---\ntools: Read, Write\npermissionMode: default\n---\nReview.\n",
        );
        let result = classifier.classify(&claude);
        assert_eq!(result.platform, "claude");
        assert!(result.confidence > 0.8);

        let universal = PackageFile::new("agents/reviewer.md", "---\ntools:\n  - read\n  - write\n---\n");
        assert_eq!(classifier.classify(&universal).platform, UNIVERSAL);

        let rule = PackageFile::new(".cursor/rules/style.mdc", "---\nglobs: \"*.rs\"\nalwaysApply: true\n---\n");
        let result = classifier.classify(&rule);
        assert_eq!(result.platform, "cursor");
        assert!((result.confidence - 1.0).abs() < 1e-9);
    }
}
