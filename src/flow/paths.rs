// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 opkg contributors

//! Glob matching and source → target path mapping

use glob::{MatchOptions, Pattern};

use crate::errors::FlowResult;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Compile a glob
pub fn compile(pattern: &str) -> FlowResult<Pattern> {
    Ok(Pattern::new(pattern)?)
}

/// Whether a relative path matches a glob (`*` stays within a segment)
pub fn matches(pattern: &Pattern, path: &str) -> bool {
    pattern.matches_with(path, MATCH_OPTIONS)
}

fn is_literal(segment: &str) -> bool {
    !segment.contains(['*', '?', '[', '{'])
}

/// Leading literal directory of a pattern (`agents/**/*.md` → `agents`)
pub fn static_base(pattern: &str) -> String {
    let segments: Vec<&str> = pattern.split('/').collect();
    let literal = segments
        .iter()
        .take(segments.len().saturating_sub(1))
        .take_while(|s| is_literal(s))
        .copied()
        .collect::<Vec<_>>();
    literal.join("/")
}

/// Map a matched source path onto a target pattern
///
/// The part of `path` below the literal base of `from` is re-rooted under
/// the literal base of `to`. When the target's file segment contains a
/// `*`, the source file stem is substituted into it and the target's
/// extension replaces the source's. A fully literal target is returned
/// as written.
pub fn map_path(from: &str, to: &str, path: &str) -> String {
    let to_segments: Vec<&str> = to.split('/').collect();
    if to_segments.iter().all(|s| is_literal(s)) {
        return to.to_string();
    }

    let source_base = static_base(from);
    let relative = if source_base.is_empty() {
        path
    } else {
        path.strip_prefix(&source_base)
            .map(|rest| rest.trim_start_matches('/'))
            .unwrap_or(path)
    };

    let (rel_dir, file) = match relative.rsplit_once('/') {
        Some((dir, file)) => (dir, file),
        None => ("", relative),
    };

    let target_base = static_base(to);
    let target_file_pattern = to_segments.last().copied().unwrap_or("*");
    let from_file_pattern = from.rsplit('/').next().unwrap_or(from);
    let file_name = map_file_name(from_file_pattern, target_file_pattern, file);

    // Subdirectories only carry over when the target keeps a wildcard directory
    let target_dirs = &to_segments[target_base.split('/').filter(|s| !s.is_empty()).count()
        ..to_segments.len() - 1];
    let keep_dirs = target_dirs.iter().any(|s| s.contains("**"));

    let mut parts: Vec<&str> = Vec::new();
    if !target_base.is_empty() {
        parts.push(&target_base);
    }
    if keep_dirs && !rel_dir.is_empty() {
        parts.push(rel_dir);
    } else {
        parts.extend(target_dirs.iter().filter(|s| is_literal(s)).copied());
    }
    parts.push(&file_name);
    parts.join("/")
}

/// Substitute a source file name into a target file segment
fn map_file_name(from_segment: &str, to_segment: &str, file: &str) -> String {
    if is_literal(to_segment) {
        return to_segment.to_string();
    }

    let Some((prefix, suffix)) = to_segment.split_once('*') else {
        return file.to_string();
    };

    // What `*` captured in the source segment
    let captured = match from_segment.split_once('*') {
        Some((src_prefix, src_suffix)) => {
            let stripped = file.strip_prefix(src_prefix).unwrap_or(file);
            stripped.strip_suffix(src_suffix).unwrap_or(stripped)
        }
        None => file,
    };

    // A target extension replaces an uncaptured source extension
    let captured = if suffix.contains('.') {
        match captured.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => captured,
        }
    } else {
        captured
    };

    format!("{prefix}{captured}{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_separator() {
        let pattern = compile("commands/*.md").unwrap();
        assert!(matches(&pattern, "commands/test.md"));
        assert!(!matches(&pattern, "commands/nested/test.md"));

        let deep = compile("agents/**/*.md").unwrap();
        assert!(matches(&deep, "agents/a.md"));
        assert!(matches(&deep, "agents/team/a.md"));
    }

    #[test]
    fn test_static_base() {
        assert_eq!(static_base("agents/**/*.md"), "agents");
        assert_eq!(static_base(".claude/agents/*.md"), ".claude/agents");
        assert_eq!(static_base("*.md"), "");
        assert_eq!(static_base("AGENTS.md"), "");
    }

    #[test]
    fn test_map_simple_and_nested() {
        assert_eq!(map_path("commands/*.md", ".config/x/*.md", "commands/test.md"), ".config/x/test.md");
        assert_eq!(
            map_path("agents/**/*.md", ".claude/agents/**/*.md", "agents/team/a.md"),
            ".claude/agents/team/a.md"
        );
        assert_eq!(
            map_path("agents/**/*.md", ".opencode/agent/*.md", "agents/team/a.md"),
            ".opencode/agent/a.md"
        );
    }

    #[test]
    fn test_map_extension_change() {
        assert_eq!(
            map_path("rules/**/*.md", ".cursor/rules/**/*.mdc", "rules/style.md"),
            ".cursor/rules/style.mdc"
        );
        assert_eq!(
            map_path(".cursor/rules/**/*.mdc", "rules/**/*.md", ".cursor/rules/style.mdc"),
            "rules/style.md"
        );
    }

    #[test]
    fn test_map_literal_target() {
        assert_eq!(map_path("AGENTS.md", "CLAUDE.md", "AGENTS.md"), "CLAUDE.md");
        assert_eq!(map_path("mcp.jsonc", ".mcp.json", "mcp.jsonc"), ".mcp.json");
    }
}
