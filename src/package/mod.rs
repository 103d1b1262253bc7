// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 opkg contributors

//! Package files and documents
//!
//! A [`PackageFile`] is the unit the engine accepts and returns. A
//! [`Document`] is the structured view the executor edits.

mod document;
mod frontmatter;

pub use document::{Document, DocumentFormat};
pub use frontmatter::{join_frontmatter, split_frontmatter, Frontmatter};

use serde::{Deserialize, Serialize};

/// A file inside a package, addressed by a relative path
///
/// Values are immutable: transforms produce new instances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageFile {
    /// Path relative to the package (or workspace) root, `/`-separated
    pub path: String,

    /// Raw file content
    pub content: String,

    /// Parsed frontmatter for markdown files that carry one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frontmatter: Option<Frontmatter>,
}

impl PackageFile {
    /// Create a file, parsing frontmatter when the file is markdown
    ///
    /// Frontmatter that fails to parse is treated as absent; the raw
    /// content is always preserved.
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        let path = normalize_path(&path.into());
        let content = content.into();

        let frontmatter = if DocumentFormat::from_path(&path) == DocumentFormat::Markdown {
            match split_frontmatter(&content) {
                Ok((fm, _)) => fm,
                Err(e) => {
                    tracing::debug!("Ignoring unparsable frontmatter in {}: {}", path, e);
                    None
                }
            }
        } else {
            None
        };

        Self {
            path,
            content,
            frontmatter,
        }
    }

    /// Same file at a different path
    pub fn relocated(&self, path: impl Into<String>) -> Self {
        Self {
            path: normalize_path(&path.into()),
            content: self.content.clone(),
            frontmatter: self.frontmatter.clone(),
        }
    }

    /// Whether the file has a non-empty frontmatter block
    pub fn has_frontmatter(&self) -> bool {
        self.frontmatter.as_ref().is_some_and(|fm| !fm.is_empty())
    }

    /// The document format implied by the file extension
    pub fn format(&self) -> DocumentFormat {
        DocumentFormat::from_path(&self.path)
    }
}

/// Normalize a relative path to forward slashes without a leading `./`
pub fn normalize_path(path: &str) -> String {
    let replaced = path.replace('\\', "/");
    let trimmed = replaced.trim_start_matches("./");
    trimmed.to_string()
}
