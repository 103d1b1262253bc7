// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 opkg contributors

//! Structured document view over file content

use serde_json::{Map, Value};

use super::frontmatter::{join_frontmatter, split_frontmatter, Frontmatter};
use crate::errors::{FlowError, FlowResult};
use crate::transforms::{CodecDirection, TransformRegistry};

/// On-disk format, decided by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    /// `.md`, `.mdc`: YAML frontmatter plus body
    Markdown,
    /// `.json`
    Json,
    /// `.jsonc`
    Jsonc,
    /// `.yaml`, `.yml`
    Yaml,
    /// `.toml`
    Toml,
    /// Anything else
    Text,
}

impl DocumentFormat {
    /// Detect the format of a path from its extension
    pub fn from_path(path: &str) -> Self {
        let file = path.rsplit('/').next().unwrap_or(path);
        let ext = match file.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => ext.to_ascii_lowercase(),
            _ => return Self::Text,
        };

        match ext.as_str() {
            "md" | "mdc" | "markdown" => Self::Markdown,
            "json" => Self::Json,
            "jsonc" => Self::Jsonc,
            "yaml" | "yml" => Self::Yaml,
            "toml" => Self::Toml,
            _ => Self::Text,
        }
    }

    /// Registry codec that reads and writes this format
    ///
    /// Plain JSON is read with the comment-tolerant codec; the output is
    /// the same either way.
    pub fn codec(&self) -> Option<&'static str> {
        match self {
            Self::Json | Self::Jsonc => Some("jsonc"),
            Self::Yaml => Some("yaml"),
            Self::Toml => Some("toml"),
            Self::Markdown | Self::Text => None,
        }
    }
}

impl std::fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Markdown => write!(f, "markdown"),
            Self::Json => write!(f, "json"),
            Self::Jsonc => write!(f, "jsonc"),
            Self::Yaml => write!(f, "yaml"),
            Self::Toml => write!(f, "toml"),
            Self::Text => write!(f, "text"),
        }
    }
}

/// Content decoded into something map operations can edit
#[derive(Debug, Clone, PartialEq)]
pub enum Document {
    /// Markdown with (possibly empty) frontmatter
    Markdown { frontmatter: Frontmatter, body: String },
    /// Parsed JSON/YAML/TOML
    Structured(Value),
    /// Opaque text
    Text(String),
}

impl Document {
    /// Decode content according to its format
    pub fn decode(content: &str, format: DocumentFormat, registry: &TransformRegistry) -> FlowResult<Self> {
        match format {
            DocumentFormat::Markdown => {
                let (frontmatter, body) = split_frontmatter(content)?;
                Ok(Self::Markdown {
                    frontmatter: frontmatter.unwrap_or_default(),
                    body,
                })
            }
            DocumentFormat::Text => Ok(Self::Text(content.to_string())),
            structured => match structured.codec() {
                Some(codec) => Self::decode_with_codec(content, codec, registry),
                None => Ok(Self::Text(content.to_string())),
            },
        }
    }

    /// Decode content with an explicit codec, ignoring the extension
    pub fn decode_with_codec(content: &str, codec: &str, registry: &TransformRegistry) -> FlowResult<Self> {
        let value = registry.run_codec(codec, &Value::String(content.to_string()), CodecDirection::Parse)?;
        Ok(Self::Structured(value))
    }

    /// Encode for a target format
    ///
    /// Crossing formats is allowed: markdown written to a structured
    /// format keeps its frontmatter, structured data written to markdown
    /// becomes frontmatter with an empty body.
    pub fn encode(&self, format: DocumentFormat, registry: &TransformRegistry) -> FlowResult<String> {
        match (self, format) {
            (Self::Text(text), _) => Ok(text.clone()),
            (Self::Markdown { frontmatter, body }, DocumentFormat::Markdown | DocumentFormat::Text) => {
                join_frontmatter(Some(frontmatter), body)
            }
            (Self::Structured(value), DocumentFormat::Markdown) => match value {
                Value::Object(map) => join_frontmatter(Some(map), ""),
                Value::String(s) => Ok(s.clone()),
                other => Err(FlowError::transform(
                    "markdown",
                    "only objects can become frontmatter",
                    other,
                    &Value::Null,
                )),
            },
            (Self::Structured(Value::String(s)), DocumentFormat::Text) => Ok(s.clone()),
            (_, format) => {
                let codec = format.codec().unwrap_or("json");
                self.encode_with_codec(codec, registry)
            }
        }
    }

    /// Encode with an explicit codec
    pub fn encode_with_codec(&self, codec: &str, registry: &TransformRegistry) -> FlowResult<String> {
        let value = match self {
            Self::Text(text) => return Ok(text.clone()),
            Self::Markdown { frontmatter, .. } => Value::Object(frontmatter.clone()),
            Self::Structured(value) => value.clone(),
        };

        match registry.run_codec(codec, &value, CodecDirection::Serialize)? {
            Value::String(s) => Ok(s),
            other => Ok(other.to_string()),
        }
    }

    /// The object map operations edit, if the document has one
    ///
    /// A null structured value is promoted to an empty object.
    pub fn fields_mut(&mut self) -> Option<&mut Map<String, Value>> {
        match self {
            Self::Markdown { frontmatter, .. } => Some(frontmatter),
            Self::Structured(value) => {
                if value.is_null() {
                    *value = Value::Object(Map::new());
                }
                value.as_object_mut()
            }
            Self::Text(_) => None,
        }
    }

    /// The value non-codec pipe transforms see
    pub fn pipe_value(&self) -> Value {
        match self {
            Self::Markdown { frontmatter, .. } => Value::Object(frontmatter.clone()),
            Self::Structured(value) => value.clone(),
            Self::Text(text) => Value::String(text.clone()),
        }
    }

    /// Store the output of a pipe transform
    pub fn set_pipe_value(&mut self, value: Value) -> FlowResult<()> {
        match self {
            Self::Markdown { frontmatter, body } => match value {
                Value::Object(map) => *frontmatter = map,
                Value::Null => frontmatter.clear(),
                Value::String(text) => *body = text,
                other => {
                    return Err(FlowError::transform(
                        "pipe",
                        "markdown frontmatter must stay an object",
                        &other,
                        &Value::Null,
                    ))
                }
            },
            Self::Structured(current) => *current = value,
            Self::Text(text) => match value {
                Value::String(s) => *text = s,
                other => *self = Self::Structured(other),
            },
        }
        Ok(())
    }
}
