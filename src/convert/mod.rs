// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 opkg contributors

//! Conversion of platform-specific packages into the universal layout
//!
//! Files are classified, grouped by detected platform, and each group is
//! run through that platform's import flows. The per-group outputs are
//! merged back into one file set. Conversion is best effort: any failure
//! outside a single group returns the original files.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cache::ContentHasher;
use crate::classifier::{FormatGroup, SchemaCache, DEFAULT_PATH_BOOST};
use crate::errors::{FlowError, FlowResult};
use crate::flow::{Direction, Flow, FlowContext, FlowExecutor, FlowReport, MemoryStore, Pattern};
use crate::package::PackageFile;
use crate::platforms::{PlatformDefinition, PlatformRegistry};
use crate::transforms::TransformRegistry;

/// Options for a conversion run
#[derive(Debug, Clone, Default)]
pub struct ConversionOptions {
    /// Return the input untouched
    pub skip_conversion: bool,
    /// Value of `$$packageName` inside flows
    pub package_name: String,
    /// Extra flow variables
    pub variables: BTreeMap<String, String>,
}

/// A failure recorded during conversion
#[derive(Debug, Clone, Serialize)]
pub struct ConversionError {
    pub platform: String,
    /// Offending file, if the failure concerns one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub message: String,
}

impl ConversionError {
    fn new(platform: &str, path: Option<&str>, error: &FlowError) -> Self {
        Self {
            platform: platform.to_string(),
            path: path.map(str::to_string),
            message: error.to_string(),
        }
    }
}

/// Result of a conversion run
#[derive(Debug, Clone, Serialize)]
pub struct ConversionResult {
    /// Whether the output differs from the input
    pub converted: bool,
    pub files: Vec<PackageFile>,
    pub errors: Vec<ConversionError>,
    pub warnings: Vec<String>,
}

impl ConversionResult {
    fn unchanged(files: Vec<PackageFile>) -> Self {
        Self {
            converted: false,
            files,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

/// Output of one platform group
#[derive(Default)]
struct GroupOutput {
    files: Vec<PackageFile>,
    errors: Vec<ConversionError>,
    warnings: Vec<String>,
}

/// Orchestrates classification, inversion and execution
pub struct ConversionCoordinator {
    platforms: Arc<PlatformRegistry>,
    executor: FlowExecutor,
    cache: Arc<SchemaCache>,
    path_boost: f64,
}

impl ConversionCoordinator {
    pub fn new(platforms: Arc<PlatformRegistry>, transforms: Arc<TransformRegistry>) -> Self {
        Self {
            platforms,
            executor: FlowExecutor::new(transforms),
            cache: Arc::new(SchemaCache::new()),
            path_boost: DEFAULT_PATH_BOOST,
        }
    }

    /// Share a schema cache with other classifiers
    pub fn with_cache(mut self, cache: Arc<SchemaCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_path_boost(mut self, boost: f64) -> Self {
        self.path_boost = boost;
        self
    }

    /// Convert a package file set into the universal layout
    pub async fn convert(&self, files: Vec<PackageFile>, options: &ConversionOptions) -> ConversionResult {
        if options.skip_conversion {
            debug!("Conversion disabled, keeping {} file(s) as they are", files.len());
            return ConversionResult::unchanged(files);
        }

        match self.try_convert(&files, options).await {
            Ok(Some(result)) => result,
            Ok(None) => ConversionResult::unchanged(files),
            Err(e) => {
                warn!("Conversion failed, keeping original files: {}", e);
                let mut result = ConversionResult::unchanged(files);
                result.errors.push(ConversionError::new("*", None, &e));
                result
            }
        }
    }

    async fn try_convert(
        &self,
        files: &[PackageFile],
        options: &ConversionOptions,
    ) -> FlowResult<Option<ConversionResult>> {
        let classifier = self.platforms.classifier(&self.cache, self.path_boost)?;
        let groups = classifier.group(files);

        if !groups.iter().any(FormatGroup::is_platform) {
            debug!("No platform-specific files among {} file(s)", files.len());
            return Ok(None);
        }

        let mut converted_sets = Vec::new();
        let mut universal = Vec::new();
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        for group in &groups {
            if !group.is_platform() {
                universal.extend(group.files.iter().cloned());
                continue;
            }

            match self.convert_group(group, options).await {
                Ok(output) => {
                    info!(
                        "Converted {} {} file(s) (confidence {:.2})",
                        group.files.len(),
                        group.platform_id,
                        group.confidence
                    );
                    errors.extend(output.errors);
                    warnings.extend(output.warnings);
                    converted_sets.push(output.files);
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!("Could not convert {} files: {}", group.platform_id, e);
                    errors.push(ConversionError::new(&group.platform_id, None, &e));
                    converted_sets.push(group.files.clone());
                }
            }
        }

        let merged = merge_file_sets(converted_sets, universal);
        let converted = ContentHasher::hash_files(&merged) != ContentHasher::hash_files(files);

        Ok(Some(ConversionResult {
            converted,
            files: merged,
            errors,
            warnings,
        }))
    }

    async fn convert_group(&self, group: &FormatGroup, options: &ConversionOptions) -> FlowResult<GroupOutput> {
        let platform = self.platforms.require(&group.platform_id)?;
        let flows = import_flows(platform);

        let context = FlowContext::new(&platform.id, Direction::Save)
            .with_package_name(&options.package_name)
            .with_variables(options.variables.clone());
        let source = MemoryStore::from_files(&group.files);
        let target = MemoryStore::new();

        let results = self.executor.execute_all(&flows, &context, &source, &target).await?;

        let mut output = GroupOutput::default();
        let mut consumed = BTreeSet::new();
        let mut failed = BTreeSet::new();

        for (flow, result) in flows.iter().zip(results) {
            match result {
                Ok(report) => record_report(&platform.id, report, &mut consumed, &mut failed, &mut output),
                Err(e) => {
                    debug!("{} import flow from {} failed: {}", platform.id, flow.from, e);
                    output.errors.push(ConversionError::new(&platform.id, None, &e));
                }
            }
        }

        output.files = target.files().await;
        for file in &group.files {
            if consumed.contains(&file.path) {
                continue;
            }
            if !failed.contains(&file.path) {
                output.warnings.push(format!(
                    "{}: detected as {} but no import flow matched, kept as is",
                    file.path, platform.id
                ));
            }
            output.files.push(file.clone());
        }

        Ok(output)
    }
}

fn record_report(
    platform: &str,
    report: FlowReport,
    consumed: &mut BTreeSet<String>,
    failed: &mut BTreeSet<String>,
    output: &mut GroupOutput,
) {
    for outcome in report.files {
        match outcome.result {
            Ok(_) if outcome.note.is_none() => {
                consumed.insert(outcome.source);
            }
            Ok(_) => {}
            Err(e) => {
                output.errors.push(ConversionError::new(platform, Some(&outcome.source), &e));
                failed.insert(outcome.source);
            }
        }
    }
}

/// The platform's import flows, plus copies reading from the universal
/// directories for platform-format files stored outside the root dir
fn import_flows(platform: &PlatformDefinition) -> Vec<Flow> {
    let root = platform.import_root();
    let mut flows = Vec::new();

    for inverted in platform.import_flows() {
        let relocated = root.as_deref().and_then(|root| strip_root(&inverted.flow.from, root));
        flows.push(inverted.flow.clone());
        if let Some(from) = relocated {
            flows.push(Flow { from, ..inverted.flow });
        }
    }
    flows
}

fn strip_root(pattern: &Pattern, root: &str) -> Option<Pattern> {
    match pattern {
        Pattern::Glob(glob) => glob.strip_prefix(root).map(|rest| Pattern::Glob(rest.to_string())),
        Pattern::Globs(globs) => {
            let stripped: Vec<String> = globs
                .iter()
                .filter_map(|g| g.strip_prefix(root).map(str::to_string))
                .collect();
            (!stripped.is_empty()).then_some(Pattern::Globs(stripped))
        }
        Pattern::Switch(_) => None,
    }
}

/// Merge per-group outputs: first seen wins among converted groups,
/// universal files win over everything
fn merge_file_sets(converted: Vec<Vec<PackageFile>>, universal: Vec<PackageFile>) -> Vec<PackageFile> {
    let mut merged: BTreeMap<String, PackageFile> = BTreeMap::new();
    for file in converted.into_iter().flatten() {
        if merged.contains_key(&file.path) {
            debug!("Dropping duplicate converted file {}", file.path);
            continue;
        }
        merged.insert(file.path.clone(), file);
    }
    for file in universal {
        merged.insert(file.path.clone(), file);
    }
    merged.into_values().collect()
}
