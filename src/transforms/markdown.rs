// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 opkg contributors

//! Markdown splitters

use serde_json::{Map, Value};

use super::{string_option, FnTransform, TransformKind, TransformRegistry};
use crate::errors::{FlowError, FlowResult};
use crate::package::split_frontmatter;

pub(super) fn register(registry: &mut TransformRegistry) {
    registry.register(Box::new(FnTransform::new(
        "markdown-frontmatter",
        TransformKind::Markdown,
        "Markdown text to its frontmatter object",
        frontmatter,
    )));
    registry.register(Box::new(FnTransform::new(
        "markdown-body",
        TransformKind::Markdown,
        "Markdown text to its body without frontmatter",
        body,
    )));
    registry.register(Box::new(FnTransform::new(
        "markdown-sections",
        TransformKind::Markdown,
        "Markdown text to an object of heading -> section text",
        sections,
    )));
    registry.register(Box::new(FnTransform::new(
        "markdown-section",
        TransformKind::Markdown,
        "The section under the heading named by the 'heading' option",
        section,
    )));
}

fn text<'a>(name: &str, value: &'a Value, options: &Value) -> FlowResult<&'a str> {
    value.as_str().ok_or_else(|| {
        FlowError::transform(name, format!("expected markdown text, got {}", value), value, options)
    })
}

fn split(name: &str, value: &Value, options: &Value) -> FlowResult<(Option<Map<String, Value>>, String)> {
    split_frontmatter(text(name, value, options)?)
        .map_err(|e| FlowError::transform(name, e.to_string(), value, options))
}

fn frontmatter(value: &Value, options: &Value) -> FlowResult<Value> {
    let (fm, _) = split("markdown-frontmatter", value, options)?;
    Ok(Value::Object(fm.unwrap_or_default()))
}

fn body(value: &Value, options: &Value) -> FlowResult<Value> {
    let (_, body) = split("markdown-body", value, options)?;
    Ok(Value::String(body))
}

fn sections(value: &Value, options: &Value) -> FlowResult<Value> {
    let (_, body) = split("markdown-sections", value, options)?;
    let mut out = Map::new();
    for (heading, content) in parse_sections(&body) {
        out.insert(heading, Value::String(content));
    }
    Ok(Value::Object(out))
}

fn section(value: &Value, options: &Value) -> FlowResult<Value> {
    let heading = string_option(options, "heading").ok_or_else(|| {
        FlowError::transform("markdown-section", "missing 'heading' option", value, options)
    })?;
    let (_, body) = split("markdown-section", value, options)?;

    parse_sections(&body)
        .into_iter()
        .find(|(h, _)| h == heading)
        .map(|(_, content)| Value::String(content))
        .ok_or_else(|| {
            FlowError::transform(
                "markdown-section",
                format!("no section titled '{}'", heading),
                value,
                options,
            )
        })
}

/// Split a body into `(heading, content)` pairs
///
/// Text before the first heading is keyed by the empty string when it is
/// not blank.
fn parse_sections(body: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut lines: Vec<&str> = Vec::new();
    let mut in_fence = false;

    for line in body.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
        }
        if !in_fence {
            if let Some(heading) = heading_text(line) {
                flush(&current, &mut lines, &mut out);
                current = heading;
                continue;
            }
        }
        lines.push(line);
    }
    flush(&current, &mut lines, &mut out);
    out
}

fn flush(heading: &str, lines: &mut Vec<&str>, out: &mut Vec<(String, String)>) {
    let content = lines.join("\n").trim().to_string();
    if !heading.is_empty() || !content.is_empty() {
        out.push((heading.to_string(), content));
    }
    lines.clear();
}

fn heading_text(line: &str) -> Option<String> {
    let trimmed = line.trim_start();
    let hashes = trimmed.chars().take_while(|c| *c == '#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = &trimmed[hashes..];
    if !rest.starts_with(' ') {
        return None;
    }
    Some(rest.trim().to_string())
}

fn markers(name: &str) -> (String, String) {
    (
        format!("<!-- opkg:section {} -->", name),
        format!("<!-- /opkg:section {} -->", name),
    )
}

/// Content of the marker block called `name`, if present
///
/// A non-empty block comes back with a single trailing newline, matching
/// how [`upsert_marked_section`] stores it.
pub fn extract_marked_section(document: &str, name: &str) -> Option<String> {
    let (open, close) = markers(name);
    let start = document.find(&open)? + open.len();
    let end = document[start..].find(&close)? + start;
    let block = document[start..end].trim_matches('\n');
    if block.is_empty() {
        Some(String::new())
    } else {
        Some(format!("{}\n", block))
    }
}

/// Insert or replace the marker block called `name`
///
/// Everything outside the block is preserved. A new block is appended
/// after a blank line.
pub fn upsert_marked_section(document: &str, name: &str, content: &str) -> String {
    let (open, close) = markers(name);
    let block = format!("{}\n{}\n{}", open, content.trim_matches('\n'), close);

    if let Some(start) = document.find(&open) {
        if let Some(rel_end) = document[start..].find(&close) {
            let end = start + rel_end + close.len();
            return format!("{}{}{}", &document[..start], block, &document[end..]);
        }
    }

    let trimmed = document.trim_end_matches('\n');
    if trimmed.is_empty() {
        format!("{}\n", block)
    } else {
        format!("{}\n\n{}\n", trimmed, block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const DOC: &str = "---\nname: x\n---\nIntro\n\n## Usage\nRun it.\n\n```\n# not a heading\n```\n## Notes\nNone.\n";

    #[test]
    fn test_sections() {
        let registry = TransformRegistry::with_builtins();
        let out = registry.execute("markdown-sections", &json!(DOC), None).unwrap();
        assert_eq!(out[""], "Intro");
        assert_eq!(out["Usage"], "Run it.\n\n```\n# not a heading\n```");
        assert_eq!(out["Notes"], "None.");
    }

    #[test]
    fn test_single_section_and_missing_heading() {
        let registry = TransformRegistry::with_builtins();
        let out = registry
            .execute("markdown-section", &json!(DOC), Some(&json!({"heading": "Notes"})))
            .unwrap();
        assert_eq!(out, json!("None."));

        let err = registry
            .execute("markdown-section", &json!(DOC), Some(&json!({"heading": "Missing"})))
            .unwrap_err();
        assert!(matches!(err, FlowError::Transform { .. }));
    }

    #[test]
    fn test_frontmatter_and_body() {
        let registry = TransformRegistry::with_builtins();
        let fm = registry.execute("markdown-frontmatter", &json!(DOC), None).unwrap();
        assert_eq!(fm, json!({"name": "x"}));
        let body = registry.execute("markdown-body", &json!("plain"), None).unwrap();
        assert_eq!(body, json!("plain"));
    }

    #[test]
    fn test_marked_sections() {
        let doc = "# Project\n\nOwn text.\n";
        let inserted = upsert_marked_section(doc, "pkg", "Package rules");
        assert_eq!(
            inserted,
            "# Project\n\nOwn text.\n\n<!-- opkg:section pkg -->\nPackage rules\n<!-- /opkg:section pkg -->\n"
        );
        assert_eq!(extract_marked_section(&inserted, "pkg").unwrap(), "Package rules\n");

        let replaced = upsert_marked_section(&inserted, "pkg", "New rules");
        assert!(replaced.contains("New rules"));
        assert!(!replaced.contains("Package rules"));
        assert!(replaced.starts_with("# Project\n\nOwn text.\n"));
        assert!(extract_marked_section(doc, "pkg").is_none());
    }
}
