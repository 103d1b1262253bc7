// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 opkg contributors

//! YAML frontmatter splitting and joining

use serde_json::{Map, Value};

use crate::errors::{FlowError, FlowResult};

/// Parsed frontmatter, key order preserved
pub type Frontmatter = Map<String, Value>;

const DELIMITER: &str = "---";

/// Split markdown into its frontmatter and body
///
/// Returns `None` for the frontmatter when the content does not open with
/// a `---` line. The body is returned byte-for-byte as it follows the
/// closing delimiter line.
pub fn split_frontmatter(content: &str) -> FlowResult<(Option<Frontmatter>, String)> {
    let Some(rest) = strip_opening(content) else {
        return Ok((None, content.to_string()));
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end_matches(['\r', '\n']) == DELIMITER {
            let yaml = &rest[..offset];
            let body = &rest[offset + line.len()..];
            let frontmatter = parse_yaml_mapping(yaml)?;
            return Ok((Some(frontmatter), body.to_string()));
        }
        offset += line.len();
    }

    Err(FlowError::Yaml {
        message: "Missing closing --- for frontmatter".into(),
    })
}

/// Render frontmatter and body back into a markdown document
///
/// An absent or empty frontmatter produces the body alone.
pub fn join_frontmatter(frontmatter: Option<&Frontmatter>, body: &str) -> FlowResult<String> {
    match frontmatter {
        Some(fm) if !fm.is_empty() => {
            let yaml = serde_yaml::to_string(fm)?;
            Ok(format!("{DELIMITER}\n{yaml}{DELIMITER}\n{body}"))
        }
        _ => Ok(body.to_string()),
    }
}

fn strip_opening(content: &str) -> Option<&str> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let rest = content.strip_prefix(DELIMITER)?;
    rest.strip_prefix("\r\n").or_else(|| rest.strip_prefix('\n'))
}

fn parse_yaml_mapping(yaml: &str) -> FlowResult<Frontmatter> {
    if yaml.trim().is_empty() {
        return Ok(Frontmatter::new());
    }

    match serde_yaml::from_str::<Value>(yaml)? {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Frontmatter::new()),
        other => Err(FlowError::Yaml {
            message: format!("Frontmatter must be a mapping, found {}", other),
        }),
    }
}
