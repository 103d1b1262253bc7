// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 opkg contributors

//! Format classifier
//!
//! Decides, file by file, which platform's format a package file is
//! written in. Each platform contributes a weighted [`DetectionSchema`];
//! a file scores the sum of the weights of the fields it carries with
//! acceptable values, plus a bonus when any of them is exclusive to the
//! platform. Ambiguity never picks a platform: ties and files without
//! evidence fall back to [`UNIVERSAL`] or [`UNKNOWN`].

mod schema;

pub use crate::cache::SchemaCache;
pub use schema::{DetectionSchema, JsonType, PropertyRule, TypeConstraint};

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::package::{Frontmatter, PackageFile};

/// Reserved id for the platform-neutral format
pub const UNIVERSAL: &str = "universal";

/// Reserved id for files outside any known layout
pub const UNKNOWN: &str = "unknown";

/// Added once when any matched field is exclusive
pub const EXCLUSIVE_BONUS: f64 = 0.1;

/// Default score added for files under a platform's import root
pub const DEFAULT_PATH_BOOST: f64 = 0.2;

/// Directories of the universal package layout
pub const UNIVERSAL_ROOTS: &[&str] = &["agents/", "rules/", "commands/", "skills/"];

/// Root-level files of the universal package layout
pub const UNIVERSAL_FILES: &[&str] = &["AGENTS.md", "mcp.jsonc", "mcp.json"];

/// A directory prefix owned by a platform (`.claude/` → `claude`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportRoot {
    pub root: String,
    pub platform: String,
}

/// Result of classifying one file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    /// Winning platform id, or [`UNIVERSAL`] / [`UNKNOWN`]
    pub platform: String,
    /// Winning score clamped to `[0, 1]`, zero for the defaults
    pub confidence: f64,
    /// Fields that counted towards the winner
    pub matched_fields: Vec<String>,
    /// Score per platform that had any evidence
    pub scores: BTreeMap<String, f64>,
}

impl Classification {
    /// Whether a named platform won
    pub fn is_platform(&self) -> bool {
        self.platform != UNIVERSAL && self.platform != UNKNOWN
    }
}

/// Files sharing a detected format
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormatGroup {
    pub platform_id: String,
    pub files: Vec<PackageFile>,
    /// Average confidence of the member files
    pub confidence: f64,
}

impl FormatGroup {
    pub fn is_platform(&self) -> bool {
        self.platform_id != UNIVERSAL && self.platform_id != UNKNOWN
    }
}

/// Schema-weighted format classifier
pub struct FormatClassifier {
    schemas: Vec<Arc<DetectionSchema>>,
    import_roots: Arc<Vec<ImportRoot>>,
    path_boost: f64,
}

impl FormatClassifier {
    /// Create a classifier over the given schemas
    pub fn new(schemas: Vec<Arc<DetectionSchema>>) -> Self {
        Self {
            schemas,
            import_roots: Arc::new(Vec::new()),
            path_boost: DEFAULT_PATH_BOOST,
        }
    }

    pub fn with_import_roots(mut self, roots: Arc<Vec<ImportRoot>>) -> Self {
        self.import_roots = roots;
        self
    }

    pub fn with_path_boost(mut self, boost: f64) -> Self {
        self.path_boost = boost;
        self
    }

    /// Schemas this classifier scores against
    pub fn schemas(&self) -> &[Arc<DetectionSchema>] {
        &self.schemas
    }

    /// Score frontmatter against one schema
    ///
    /// Returns the raw score and the fields that counted.
    pub fn score(schema: &DetectionSchema, frontmatter: &Frontmatter) -> (f64, Vec<String>) {
        let mut score = 0.0;
        let mut matched = Vec::new();
        let mut exclusive = false;

        for (field, rule) in schema.weighted() {
            let Some(value) = frontmatter.get(field) else {
                continue;
            };
            if !rule.accepts(value) {
                continue;
            }
            score += rule.weight;
            exclusive |= rule.exclusive;
            matched.push(field.clone());
        }

        if exclusive {
            score += EXCLUSIVE_BONUS;
        }
        (score, matched)
    }

    /// Classify one file
    ///
    /// A schema becomes a candidate only when at least one of its fields
    /// scores. The path boost is added to candidates whose import root
    /// contains the file; a path alone never names a platform, so files
    /// under `.claude/` with no recognised fields stay universal or unknown.
    pub fn classify(&self, file: &PackageFile) -> Classification {
        let default = Classification {
            platform: default_platform(&file.path).to_string(),
            confidence: 0.0,
            matched_fields: Vec::new(),
            scores: BTreeMap::new(),
        };

        let Some(frontmatter) = file.frontmatter.as_ref().filter(|fm| !fm.is_empty()) else {
            return default;
        };

        let mut scores = BTreeMap::new();
        let mut candidates: Vec<(&str, f64, Vec<String>)> = Vec::new();

        for schema in &self.schemas {
            let (mut score, matched) = Self::score(schema, frontmatter);
            if score <= 0.0 {
                continue;
            }
            if self.under_import_root(&file.path, &schema.id) {
                score += self.path_boost;
            }
            scores.insert(schema.id.clone(), score);
            candidates.push((schema.id.as_str(), score, matched));
        }

        let best = candidates
            .iter()
            .map(|(_, score, _)| *score)
            .fold(f64::NEG_INFINITY, f64::max);
        let mut leaders = candidates.into_iter().filter(|(_, score, _)| *score == best);

        match (leaders.next(), leaders.next()) {
            (Some((platform, score, matched)), None) => Classification {
                platform: platform.to_string(),
                confidence: score.clamp(0.0, 1.0),
                matched_fields: matched,
                scores,
            },
            (Some((first, ..)), Some((second, ..))) => {
                tracing::debug!(
                    "{}: tie between '{}' and '{}' at {:.2}, using default",
                    file.path,
                    first,
                    second,
                    best
                );
                Classification { scores, ..default }
            }
            _ => Classification { scores, ..default },
        }
    }

    /// Classify every file and group by detected format
    ///
    /// Groups appear in the order their first file was seen; files keep
    /// their input order within a group.
    pub fn group(&self, files: &[PackageFile]) -> Vec<FormatGroup> {
        let mut groups: Vec<(FormatGroup, f64)> = Vec::new();

        for file in files {
            let classification = self.classify(file);
            match groups
                .iter_mut()
                .find(|(g, _)| g.platform_id == classification.platform)
            {
                Some((group, total)) => {
                    group.files.push(file.clone());
                    *total += classification.confidence;
                }
                None => groups.push((
                    FormatGroup {
                        platform_id: classification.platform,
                        files: vec![file.clone()],
                        confidence: 0.0,
                    },
                    classification.confidence,
                )),
            }
        }

        groups
            .into_iter()
            .map(|(mut group, total)| {
                group.confidence = total / group.files.len() as f64;
                group
            })
            .collect()
    }

    fn under_import_root(&self, path: &str, platform: &str) -> bool {
        self.import_roots
            .iter()
            .any(|r| r.platform == platform && path.starts_with(&r.root))
    }
}

/// Whether a path belongs to the universal package layout
pub fn is_universal_path(path: &str) -> bool {
    UNIVERSAL_ROOTS.iter().any(|root| path.starts_with(root)) || UNIVERSAL_FILES.contains(&path)
}

fn default_platform(path: &str) -> &'static str {
    if is_universal_path(path) {
        UNIVERSAL
    } else {
        UNKNOWN
    }
}
