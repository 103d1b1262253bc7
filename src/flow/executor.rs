// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 opkg contributors

//! Flow executor
//!
//! Runs one flow against a source store and a target store:
//! validate, match, load, transform, merge, write. A failing file is
//! reported in the [`FlowReport`] and never aborts the rest of the batch;
//! only discovery failures are fatal.

use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;

use super::context::{Direction, FlowContext};
use super::definition::{Flow, MergeStrategy, Pattern, PipeStep, TargetSpec};
use super::fields;
use super::merge;
use super::operations::apply_operations;
use super::paths;
use super::store::{DiskStore, FileStore};
use super::validation::FlowValidator;
use crate::cache::hash_string;
use crate::errors::{FlowError, FlowResult};
use crate::package::{Document, DocumentFormat};
use crate::switch::SwitchResolver;
use crate::transforms::{extract_marked_section, upsert_marked_section, TransformRegistry, CODEC_NAMES};

/// Overall outcome of one flow
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowStatus {
    /// Every matched file was processed (some may still have failed)
    Completed,
    /// A `when` condition did not hold
    Skipped { reason: String },
}

/// How a planned write relates to what is on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Created,
    Modified,
    Unchanged,
}

/// Content the executor produced for one target path
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedWrite {
    pub path: String,
    pub content: String,
    /// BLAKE3 of `content`
    pub hash: String,
    pub change: ChangeKind,
    /// False in dry-run mode and for unchanged content
    pub written: bool,
    /// Keys a composite merge now owns in this target
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub owned_keys: Vec<String>,
}

/// Result for one matched source file
#[derive(Debug)]
pub struct FileOutcome {
    pub source: String,
    pub result: FlowResult<Vec<PlannedWrite>>,
    /// Why the file produced nothing, when it was skipped
    pub note: Option<String>,
}

/// Everything one flow execution did or would do
#[derive(Debug)]
pub struct FlowReport {
    pub status: FlowStatus,
    pub files: Vec<FileOutcome>,
    pub warnings: Vec<String>,
}

impl FlowReport {
    fn skipped(reason: String, mut warnings: Vec<String>) -> Self {
        warnings.push(reason.clone());
        Self {
            status: FlowStatus::Skipped { reason },
            files: Vec::new(),
            warnings,
        }
    }

    /// No file failed
    pub fn succeeded(&self) -> bool {
        self.files.iter().all(|f| f.result.is_ok())
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.status, FlowStatus::Skipped { .. })
    }

    /// Failed source files with their errors
    pub fn failures(&self) -> impl Iterator<Item = (&str, &FlowError)> {
        self.files
            .iter()
            .filter_map(|f| f.result.as_ref().err().map(|e| (f.source.as_str(), e)))
    }

    /// Every planned write across successful files
    pub fn writes(&self) -> impl Iterator<Item = &PlannedWrite> {
        self.files
            .iter()
            .filter_map(|f| f.result.as_ref().ok())
            .flatten()
    }
}

/// A target with its pattern resolved to a concrete glob
struct ResolvedTarget<'a> {
    glob: String,
    spec: TargetSpec<'a>,
}

/// Executes flows against file stores
pub struct FlowExecutor {
    registry: Arc<TransformRegistry>,
}

impl FlowExecutor {
    /// Create an executor using the given transform registry
    pub fn new(registry: Arc<TransformRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &TransformRegistry {
        &self.registry
    }

    /// Execute a flow between the context's package and workspace roots
    pub async fn execute_in_roots(&self, flow: &Flow, context: &FlowContext) -> FlowResult<FlowReport> {
        let source = DiskStore::new(context.source_root());
        let target = DiskStore::new(context.target_root());
        self.execute(flow, context, &source, &target).await
    }

    /// Execute an ordered list of flows
    ///
    /// Each flow gets its own result; a failing flow does not stop the
    /// ones after it. Fatal errors (discovery) abort the whole batch.
    pub async fn execute_all(
        &self,
        flows: &[Flow],
        context: &FlowContext,
        source: &dyn FileStore,
        target: &dyn FileStore,
    ) -> FlowResult<Vec<FlowResult<FlowReport>>> {
        let mut results = Vec::with_capacity(flows.len());
        for flow in flows {
            match self.execute(flow, context, source, target).await {
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::warn!("Flow {} failed: {}", flow.from, e);
                    results.push(Err(e));
                }
                Ok(report) => results.push(Ok(report)),
            }
        }
        Ok(results)
    }

    /// Execute one flow
    ///
    /// Returns `Err` only for problems that stop the whole flow: an
    /// invalid definition, an unresolvable pattern, or a discovery
    /// failure. Per-file problems are recorded in the report.
    pub async fn execute(
        &self,
        flow: &Flow,
        context: &FlowContext,
        source: &dyn FileStore,
        target: &dyn FileStore,
    ) -> FlowResult<FlowReport> {
        let validation = FlowValidator::with_registry(&self.registry).check(flow)?;
        let warnings = validation.warnings;

        if let Some(when) = &flow.when {
            if let Some(platform) = &when.platform {
                if platform != &context.platform {
                    let reason = format!(
                        "Skipped: flow is for platform '{}', running for '{}'",
                        platform, context.platform
                    );
                    tracing::debug!("{}", reason);
                    return Ok(FlowReport::skipped(reason, warnings));
                }
            }
            if let Some(exists) = &when.exists {
                let path = context.interpolate(exists);
                if !target.exists(&path).await? {
                    let reason = format!("Skipped: '{}' does not exist in {}", path, target.describe());
                    tracing::debug!("{}", reason);
                    return Ok(FlowReport::skipped(reason, warnings));
                }
            }
        }

        // Variables are looked up once per invocation
        let from_globs = resolve_globs(&flow.from, context)?;
        let targets = flow
            .targets()
            .into_iter()
            .map(|spec| {
                let glob = resolve_globs(spec.pattern, context)?
                    .into_iter()
                    .next()
                    .ok_or_else(|| FlowError::InvalidFlow {
                        violations: vec!["'to' resolved to no pattern".into()],
                    })?;
                Ok(ResolvedTarget { glob, spec })
            })
            .collect::<FlowResult<Vec<_>>>()?;

        let listed = source.list().await?;
        let Some((from_glob, matched)) = first_matching(&from_globs, &listed)? else {
            tracing::debug!("No files matched {} in {}", from_globs.join(" | "), source.describe());
            return Ok(FlowReport {
                status: FlowStatus::Completed,
                files: Vec::new(),
                warnings,
            });
        };

        let section = flow.section.as_deref().map(|s| context.interpolate(s));
        let mut files = Vec::with_capacity(matched.len());

        for path in matched {
            let outcome = match self
                .process_file(flow, context, &from_glob, &path, &targets, section.as_deref(), source, target)
                .await
            {
                Ok(Processed::Written(writes)) => FileOutcome {
                    source: path,
                    result: Ok(writes),
                    note: None,
                },
                Ok(Processed::Skipped(note)) => {
                    tracing::debug!("{}: {}", path, note);
                    FileOutcome {
                        source: path,
                        result: Ok(Vec::new()),
                        note: Some(note),
                    }
                }
                Err(e) => {
                    tracing::warn!("{}: {}", path, e);
                    FileOutcome {
                        source: path,
                        result: Err(e),
                        note: None,
                    }
                }
            };
            files.push(outcome);
        }

        Ok(FlowReport {
            status: FlowStatus::Completed,
            files,
            warnings,
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn process_file(
        &self,
        flow: &Flow,
        context: &FlowContext,
        from_glob: &str,
        path: &str,
        targets: &[ResolvedTarget<'_>],
        section: Option<&str>,
        source: &dyn FileStore,
        target: &dyn FileStore,
    ) -> FlowResult<Processed> {
        let content = source
            .read(path)
            .await?
            .ok_or_else(|| FlowError::SourceNotFound { path: path.to_string() })?;

        let content = match (section, context.direction) {
            (Some(name), Direction::Save) => match extract_marked_section(&content, name) {
                Some(block) => block,
                None => return Ok(Processed::Skipped(format!("no '{}' section", name))),
            },
            _ => content,
        };

        // Every target is planned before anything is written
        let mut writes = Vec::with_capacity(targets.len());
        for resolved in targets {
            let target_path = paths::map_path(from_glob, &resolved.glob, path);
            let existing = target.read(&target_path).await?;
            let write = self.plan_target(flow, context, path, &content, resolved.spec, &target_path, existing, section)?;
            writes.push(write);
        }

        let pending: Vec<(String, String)> = writes
            .iter()
            .filter(|w| w.change != ChangeKind::Unchanged)
            .map(|w| (w.path.clone(), w.content.clone()))
            .collect();

        if !context.dry_run && !pending.is_empty() {
            target.write_batch(&pending).await?;
            for write in writes.iter_mut().filter(|w| w.change != ChangeKind::Unchanged) {
                write.written = true;
            }
        }

        Ok(Processed::Written(writes))
    }

    #[allow(clippy::too_many_arguments)]
    fn plan_target(
        &self,
        flow: &Flow,
        context: &FlowContext,
        source_path: &str,
        content: &str,
        spec: TargetSpec<'_>,
        target_path: &str,
        existing: Option<String>,
        section: Option<&str>,
    ) -> FlowResult<PlannedWrite> {
        let registry = self.registry.as_ref();
        let codec = pipe_codec(spec.pipe);

        // Load
        let mut document = match (context.direction, codec) {
            (Direction::Save, Some(codec)) => Document::decode_with_codec(content, codec, registry)?,
            _ => Document::decode(content, DocumentFormat::from_path(source_path), registry)?,
        };

        // Transform
        if let Some(path) = &flow.path {
            document = Document::Structured(select_path(&document, path));
        }
        if let Some(map) = document.fields_mut() {
            apply_operations(map, spec.map, registry)?;
        }
        let mut pipe_merge = None;
        for step in spec.pipe {
            let name = step.name();
            if CODEC_NAMES.contains(&name) {
                continue;
            }
            if let Some(strategy) = MergeStrategy::from_name(name) {
                pipe_merge = Some(strategy);
                continue;
            }
            let value = registry.execute(name, &document.pipe_value(), step.options())?;
            document.set_pipe_value(value)?;
        }
        if let Some(key) = &flow.embed {
            let mut wrapped = Map::new();
            wrapped.insert(key.clone(), document.pipe_value());
            document = Document::Structured(Value::Object(wrapped));
        }

        // Merge and render
        let target_format = DocumentFormat::from_path(target_path);
        let output_codec = match context.direction {
            Direction::Install => codec,
            Direction::Save => None,
        };
        let strategy = spec.merge.cloned().or(pipe_merge);
        let owned_keys = match strategy {
            Some(MergeStrategy::Composite) => merge::owned_keys(&document.pipe_value(), flow.embed.as_deref()),
            _ => Vec::new(),
        };

        let rendered = match (section, context.direction) {
            (Some(name), Direction::Install) => {
                // Frontmatter travels inside the block so a save can restore it
                let block = match &document {
                    Document::Markdown { .. } => document.encode(DocumentFormat::Markdown, registry)?,
                    other => other.encode(target_format, registry)?,
                };
                upsert_marked_section(existing.as_deref().unwrap_or_default(), name, &block)
            }
            _ => {
                let merged = match (existing.as_deref(), &strategy) {
                    (Some(old), Some(strategy)) => {
                        let old_doc = match output_codec {
                            Some(codec) => Document::decode_with_codec(old, codec, registry)?,
                            None => Document::decode(old, target_format, registry)?,
                        };
                        let owned = context.owned_keys.get(target_path).map(Vec::as_slice).unwrap_or_default();
                        merge_documents(strategy, old_doc, document, flow.embed.as_deref(), owned)?
                    }
                    _ => document,
                };
                match output_codec {
                    Some(codec) => merged.encode_with_codec(codec, registry)?,
                    None => merged.encode(target_format, registry)?,
                }
            }
        };

        let hash = hash_string(&rendered);
        let change = match existing.as_deref() {
            None => ChangeKind::Created,
            Some(old) if hash_string(old) == hash => ChangeKind::Unchanged,
            Some(_) => ChangeKind::Modified,
        };

        Ok(PlannedWrite {
            path: target_path.to_string(),
            content: rendered,
            hash,
            change,
            written: false,
            owned_keys,
        })
    }
}

enum Processed {
    Written(Vec<PlannedWrite>),
    Skipped(String),
}

/// Concrete globs for a pattern, switches resolved and variables expanded
fn resolve_globs(pattern: &Pattern, context: &FlowContext) -> FlowResult<Vec<String>> {
    match pattern {
        Pattern::Switch(p) => {
            let glob = SwitchResolver::resolve_string(&p.switch, context)?;
            Ok(vec![context.interpolate(&glob)])
        }
        other => Ok(other.globs().into_iter().map(|g| context.interpolate(g)).collect()),
    }
}

/// First glob (in priority order) matching any listed path
fn first_matching(globs: &[String], listed: &[String]) -> FlowResult<Option<(String, Vec<String>)>> {
    for glob in globs {
        let pattern = paths::compile(glob)?;
        let matched: Vec<String> = listed
            .iter()
            .filter(|path| paths::matches(&pattern, path))
            .cloned()
            .collect();
        if !matched.is_empty() {
            return Ok(Some((glob.clone(), matched)));
        }
    }
    Ok(None)
}

/// Codec named in a pipe, if any
fn pipe_codec(pipe: &[PipeStep]) -> Option<&'static str> {
    pipe.iter()
        .find_map(|step| CODEC_NAMES.iter().copied().find(|c| *c == step.name()))
}

/// Sub-object at a dotted path, or an empty object when absent
fn select_path(document: &Document, path: &str) -> Value {
    document
        .pipe_value()
        .as_object()
        .and_then(|map| fields::get(map, path))
        .cloned()
        .unwrap_or_else(|| Value::Object(Map::new()))
}

fn merge_documents(
    strategy: &MergeStrategy,
    existing: Document,
    incoming: Document,
    scope: Option<&str>,
    owned: &[String],
) -> FlowResult<Document> {
    match (existing, incoming) {
        (Document::Structured(old), Document::Structured(new)) => Ok(Document::Structured(merge::merge(
            strategy, &old, &new, scope, owned,
        )?)),
        (Document::Markdown { frontmatter: old, .. }, Document::Markdown { frontmatter: new, body }) => {
            let merged = merge::merge(strategy, &Value::Object(old), &Value::Object(new), scope, owned)?;
            let frontmatter = match merged {
                Value::Object(map) => map,
                _ => Map::new(),
            };
            Ok(Document::Markdown { frontmatter, body })
        }
        (_, incoming) => Ok(incoming),
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::definition::{Condition, FlowTarget, FlowTo, Operation, TransformStep};
    use crate::flow::store::MemoryStore;
    use crate::package::PackageFile;
    use async_trait::async_trait;
    use serde_json::json;

    fn executor() -> FlowExecutor {
        FlowExecutor::new(Arc::new(TransformRegistry::with_builtins()))
    }

    fn install(platform: &str) -> FlowContext {
        FlowContext::new(platform, Direction::Install).with_package_name("demo")
    }

    async fn store(files: &[(&str, &str)]) -> MemoryStore {
        let store = MemoryStore::new();
        for (path, content) in files {
            store.insert(*path, *content).await;
        }
        store
    }

    #[tokio::test]
    async fn test_agent_install() {
        let flow = Flow::from_yaml(
            r#"
from: "agents/**/*.md"
to: ".claude/agents/**/*.md"
map:
  - $transform:
      field: tools
      steps:
        - $map: capitalize
        - $join: ", "
"#,
        )
        .unwrap();
        let source = store(&[("agents/reviewer.md", "---\nname: reviewer\ntools:\n  - read\n  - write\n---\nReview.\n")]).await;
        let target = MemoryStore::new();

        let report = executor().execute(&flow, &install("claude"), &source, &target).await.unwrap();
        assert!(report.succeeded());

        let written = target.read(".claude/agents/reviewer.md").await.unwrap().unwrap();
        let file = crate::package::PackageFile::new(".claude/agents/reviewer.md", written.as_str());
        let fm = file.frontmatter.unwrap();
        assert_eq!(fm["name"], "reviewer");
        assert_eq!(fm["tools"], "Read, Write");
        assert!(written.ends_with("---\nReview.\n"));
        let write = report.writes().next().unwrap();
        assert_eq!(write.change, ChangeKind::Created);
        assert!(write.written);
    }

    #[tokio::test]
    async fn test_switch_target_is_resolved_once() {
        let flow = Flow::from_yaml(
            r#"
from: "commands/*.md"
to:
  $switch:
    field: $$targetRoot
    cases:
      - pattern: "~/"
        value: ".config/x/*.md"
    default: ".x/*.md"
"#,
        )
        .unwrap();
        let source = store(&[("commands/test.md", "Run tests.\n")]).await;

        for (root, expected) in [("~/", ".config/x/test.md"), ("/project", ".x/test.md")] {
            let target = MemoryStore::new();
            let ctx = install("x").with_variable("targetRoot", root);
            let report = executor().execute(&flow, &ctx, &source, &target).await.unwrap();
            assert_eq!(report.writes().next().unwrap().path, expected);
            assert!(target.exists(expected).await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_unresolvable_switch_fails_the_flow() {
        let flow = Flow::from_yaml("from: a.md\nto: { $switch: { field: $$missing, cases: [{ pattern: x, value: b.md }] } }\n").unwrap();
        let source = store(&[("a.md", "A")]).await;
        let err = executor()
            .execute(&flow, &install("x"), &source, &MemoryStore::new())
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::UnknownVariable { .. }));
    }

    #[tokio::test]
    async fn test_invalid_flow_is_rejected_before_io() {
        let flow = Flow::new("", "out.md").with_merge(MergeStrategy::Unknown("sideways".into()));
        let err = executor()
            .execute(&flow, &install("x"), &MemoryStore::new(), &MemoryStore::new())
            .await
            .unwrap_err();
        match err {
            FlowError::InvalidFlow { violations } => assert_eq!(violations.len(), 2),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_deep_merge_with_existing_target() {
        let flow = Flow::new("settings.json", ".tool/settings.json").with_merge(MergeStrategy::Deep);
        let source = store(&[("settings.json", r#"{"a": 1, "b": 2}"#)]).await;
        let target = store(&[(".tool/settings.json", r#"{"b": 99, "c": 3}"#)]).await;

        let report = executor().execute(&flow, &install("x"), &source, &target).await.unwrap();
        assert_eq!(report.writes().next().unwrap().change, ChangeKind::Modified);

        let merged: Value = serde_json::from_str(&target.read(".tool/settings.json").await.unwrap().unwrap()).unwrap();
        assert_eq!(merged, json!({"a": 1, "b": 2, "c": 3}));

        // Second run changes nothing
        let again = executor().execute(&flow, &install("x"), &source, &target).await.unwrap();
        let write = again.writes().next().unwrap();
        assert_eq!(write.change, ChangeKind::Unchanged);
        assert!(!write.written);
    }

    #[tokio::test]
    async fn test_composite_merge_with_embed() {
        let mut flow = Flow::new("mcp.jsonc", "opencode.json").with_merge(MergeStrategy::Composite);
        flow.path = Some("mcpServers".into());
        flow.embed = Some("mcp".into());

        let source = store(&[(
            "mcp.jsonc",
            "// servers\n{\"mcpServers\": {\"docs\": {\"command\": \"docs-mcp\"}}}",
        )])
        .await;
        let target = store(&[(
            "opencode.json",
            r#"{"theme": "dark", "mcp": {"old": {"command": "x"}, "mine": {"command": "y"}}}"#,
        )])
        .await;
        let ctx = install("opencode").with_owned_keys("opencode.json", vec!["old".into()]);

        let report = executor().execute(&flow, &ctx, &source, &target).await.unwrap();
        assert_eq!(report.writes().next().unwrap().owned_keys, vec!["docs"]);

        let merged: Value = serde_json::from_str(&target.read("opencode.json").await.unwrap().unwrap()).unwrap();
        assert_eq!(
            merged,
            json!({"theme": "dark", "mcp": {"mine": {"command": "y"}, "docs": {"command": "docs-mcp"}}})
        );
    }

    #[tokio::test]
    async fn test_codec_pipe_runs_by_direction() {
        let mut flow = Flow::new("mcp.jsonc", ".codex/config.toml").with_pipe(&["toml"]);
        flow.path = Some("mcpServers".into());
        flow.embed = Some("mcp_servers".into());

        let source = store(&[("mcp.jsonc", r#"{"mcpServers": {"docs": {"command": "docs-mcp"}}}"#)]).await;
        let target = MemoryStore::new();
        executor().execute(&flow, &install("codex"), &source, &target).await.unwrap();

        let toml = target.read(".codex/config.toml").await.unwrap().unwrap();
        assert!(toml.contains("[mcp_servers.docs]"), "{toml}");

        // Reading it back parses with the same codec
        let mut back = Flow::new(".codex/config.toml", "mcp.jsonc").with_pipe(&["toml"]);
        back.path = Some("mcp_servers".into());
        back.embed = Some("mcpServers".into());
        let package = MemoryStore::new();
        let ctx = FlowContext::new("codex", Direction::Save);
        executor().execute(&back, &ctx, &target, &package).await.unwrap();

        let json: Value = serde_json::from_str(&package.read("mcp.jsonc").await.unwrap().unwrap()).unwrap();
        assert_eq!(json, json!({"mcpServers": {"docs": {"command": "docs-mcp"}}}));
    }

    #[tokio::test]
    async fn test_section_install_and_save() {
        let mut flow = Flow::new("AGENTS.md", "CLAUDE.md");
        flow.section = Some("$$packageName".into());

        let source = store(&[("AGENTS.md", "Use tabs.\n")]).await;
        let target = store(&[("CLAUDE.md", "# Project notes\n")]).await;
        executor().execute(&flow, &install("claude"), &source, &target).await.unwrap();

        let shared = target.read("CLAUDE.md").await.unwrap().unwrap();
        assert_eq!(
            shared,
            "# Project notes\n\n<!-- opkg:section demo -->\nUse tabs.\n<!-- /opkg:section demo -->\n"
        );

        let mut back = Flow::new("CLAUDE.md", "AGENTS.md");
        back.section = Some("$$packageName".into());
        let package = MemoryStore::new();
        let ctx = FlowContext::new("claude", Direction::Save).with_package_name("demo");
        executor().execute(&back, &ctx, &target, &package).await.unwrap();
        assert_eq!(package.read("AGENTS.md").await.unwrap().unwrap(), "Use tabs.\n");

        // Saving over the untouched original changes nothing
        let report = executor().execute(&back, &ctx, &target, &source).await.unwrap();
        assert_eq!(report.writes().next().unwrap().change, ChangeKind::Unchanged);
        assert_eq!(source.read("AGENTS.md").await.unwrap().unwrap(), "Use tabs.\n");

        // Another package's section is not there
        let ctx = FlowContext::new("claude", Direction::Save).with_package_name("other");
        let report = executor().execute(&back, &ctx, &target, &MemoryStore::new()).await.unwrap();
        assert_eq!(report.files[0].note.as_deref(), Some("no 'other' section"));
    }

    #[tokio::test]
    async fn test_section_keeps_source_frontmatter() {
        let mut flow = Flow::new("AGENTS.md", "CLAUDE.md");
        flow.section = Some("$$packageName".into());
        let original = "---\nscope: repo\n---\nUse tabs.\n";
        let source = store(&[("AGENTS.md", original)]).await;
        let target = MemoryStore::new();
        executor().execute(&flow, &install("claude"), &source, &target).await.unwrap();

        let shared = target.read("CLAUDE.md").await.unwrap().unwrap();
        assert!(shared.contains("scope: repo"));

        let mut back = Flow::new("CLAUDE.md", "AGENTS.md");
        back.section = Some("$$packageName".into());
        let ctx = FlowContext::new("claude", Direction::Save).with_package_name("demo");
        let package = MemoryStore::new();
        executor().execute(&back, &ctx, &target, &package).await.unwrap();

        let saved = PackageFile::new("AGENTS.md", package.read("AGENTS.md").await.unwrap().unwrap());
        assert_eq!(saved.frontmatter.unwrap()["scope"], json!("repo"));
        assert!(saved.content.ends_with("Use tabs.\n"));
    }

    #[tokio::test]
    async fn test_when_conditions_skip() {
        let mut flow = Flow::new("rules/*.md", ".cursor/rules/*.mdc");
        flow.when = Some(Condition {
            exists: Some(".cursor".into()),
            platform: None,
        });
        let source = store(&[("rules/style.md", "Be nice.")]).await;

        let report = executor()
            .execute(&flow, &install("cursor"), &source, &MemoryStore::new())
            .await
            .unwrap();
        assert!(report.is_skipped());
        assert_eq!(report.warnings.len(), 1);

        let target = store(&[(".cursor/mcp.json", "{}")]).await;
        let report = executor().execute(&flow, &install("cursor"), &source, &target).await.unwrap();
        assert!(!report.is_skipped());
        assert!(target.exists(".cursor/rules/style.mdc").await.unwrap());

        flow.when = Some(Condition {
            exists: None,
            platform: Some("claude".into()),
        });
        let report = executor().execute(&flow, &install("cursor"), &source, &target).await.unwrap();
        assert!(report.is_skipped());
    }

    #[tokio::test]
    async fn test_from_list_first_matching_glob_wins() {
        let mut flow = Flow::new("unused", "out/*.md");
        flow.from = Pattern::Globs(vec!["skills/*.md".into(), "agents/*.md".into(), "rules/*.md".into()]);
        let source = store(&[("agents/a.md", "A"), ("rules/r.md", "R")]).await;
        let target = MemoryStore::new();

        let report = executor().execute(&flow, &install("x"), &source, &target).await.unwrap();
        let paths: Vec<&str> = report.writes().map(|w| w.path.as_str()).collect();
        assert_eq!(paths, vec!["out/a.md"]);
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let flow = Flow::new("agents/*.md", ".claude/agents/*.md");
        let source = store(&[("agents/a.md", "A")]).await;
        let target = MemoryStore::new();

        let ctx = install("claude").with_dry_run(true);
        let report = executor().execute(&flow, &ctx, &source, &target).await.unwrap();
        let write = report.writes().next().unwrap();
        assert_eq!(write.change, ChangeKind::Created);
        assert!(!write.written);
        assert_eq!(write.hash, hash_string("A"));
        assert!(target.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_multi_target_is_all_or_nothing() {
        let flow = Flow {
            to: FlowTo::Targets(vec![
                FlowTarget {
                    target: ".a/*.json".into(),
                    map: None,
                    pipe: None,
                    merge: None,
                },
                FlowTarget {
                    target: ".b/*.json".into(),
                    map: Some(vec![Operation::Transform {
                        field: "tools".into(),
                        steps: vec![TransformStep::Keys],
                    }]),
                    pipe: Some(vec![PipeStep::Name("number".into())]),
                    merge: None,
                },
            ]),
            ..Flow::new("data/*.json", "unused")
        };
        let source = store(&[("data/ok.json", r#"{"tools": {"read": true}}"#)]).await;
        let target = MemoryStore::new();

        let report = executor().execute(&flow, &install("x"), &source, &target).await.unwrap();
        assert!(!report.succeeded());
        let (path, err) = report.failures().next().unwrap();
        assert_eq!(path, "data/ok.json");
        assert!(matches!(err, FlowError::Transform { .. }));
        assert!(target.list().await.unwrap().is_empty());
    }

    struct PhantomStore;

    #[async_trait]
    impl FileStore for PhantomStore {
        fn describe(&self) -> String {
            "<phantom>".into()
        }
        async fn list(&self) -> FlowResult<Vec<String>> {
            Ok(vec!["agents/gone.md".into()])
        }
        async fn read(&self, _path: &str) -> FlowResult<Option<String>> {
            Ok(None)
        }
        async fn exists(&self, _path: &str) -> FlowResult<bool> {
            Ok(false)
        }
        async fn write_batch(&self, _writes: &[(String, String)]) -> FlowResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_missing_source_is_reported_per_file() {
        let flow = Flow::new("agents/*.md", ".claude/agents/*.md");
        let report = executor()
            .execute(&flow, &install("claude"), &PhantomStore, &MemoryStore::new())
            .await
            .unwrap();
        let (_, err) = report.failures().next().unwrap();
        assert!(matches!(err, FlowError::SourceNotFound { .. }));
    }

    #[tokio::test]
    async fn test_execute_all_continues_past_failures() {
        let flows = vec![
            Flow::new("", "x"),
            Flow::new("agents/*.md", ".claude/agents/*.md"),
        ];
        let source = store(&[("agents/a.md", "A")]).await;
        let target = MemoryStore::new();

        let results = executor()
            .execute_all(&flows, &install("claude"), &source, &target)
            .await
            .unwrap();
        assert!(results[0].is_err());
        assert!(results[1].as_ref().unwrap().succeeded());
    }

    #[tokio::test]
    async fn test_execute_in_roots() {
        let package = tempfile::TempDir::new().unwrap();
        let workspace = tempfile::TempDir::new().unwrap();
        tokio::fs::create_dir_all(package.path().join("rules")).await.unwrap();
        tokio::fs::write(package.path().join("rules/style.md"), "Be nice.").await.unwrap();

        let flow = Flow::new("rules/**/*.md", ".cursor/rules/**/*.mdc");
        let ctx = install("cursor").with_roots(package.path(), workspace.path());
        let report = executor().execute_in_roots(&flow, &ctx).await.unwrap();
        assert!(report.succeeded());

        let written = tokio::fs::read_to_string(workspace.path().join(".cursor/rules/style.mdc")).await.unwrap();
        assert_eq!(written, "Be nice.");
    }
}
