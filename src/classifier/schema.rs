// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 opkg contributors

//! Detection schemas
//!
//! A JSON-Schema-shaped description of one platform's frontmatter with
//! per-property detection weights.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::errors::FlowResult;
use crate::transforms::strip_json_comments;

/// Weighted detection schema for one platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionSchema {
    /// Platform id, filled in from the platform when embedded in one
    #[serde(alias = "$id", default)]
    pub id: String,

    /// Frontmatter fields that identify the platform
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyRule>,
}

impl DetectionSchema {
    /// Parse from JSON (comments allowed)
    pub fn from_json(json: &str) -> FlowResult<Self> {
        Ok(serde_json::from_str(&strip_json_comments(json))?)
    }

    /// Properties that contribute to the score
    pub fn weighted(&self) -> impl Iterator<Item = (&String, &PropertyRule)> {
        self.properties.iter().filter(|(_, rule)| rule.weight > 0.0)
    }
}

/// Detection rule for one frontmatter field
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyRule {
    #[serde(rename = "x-detection-weight", default)]
    pub weight: f64,

    /// Only this platform ever uses the field
    #[serde(rename = "x-exclusive", default, skip_serializing_if = "std::ops::Not::not")]
    pub exclusive: bool,

    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<Value>>,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub types: Option<TypeConstraint>,
}

impl PropertyRule {
    /// Whether a value satisfies the enum and type constraints
    pub fn accepts(&self, value: &Value) -> bool {
        if let Some(allowed) = &self.allowed {
            if !allowed.contains(value) {
                return false;
            }
        }
        match &self.types {
            Some(TypeConstraint::One(t)) => t.matches(value),
            Some(TypeConstraint::Many(ts)) => ts.iter().any(|t| t.matches(value)),
            None => true,
        }
    }
}

/// `type: x` or `type: [x, y]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TypeConstraint {
    One(JsonType),
    Many(Vec<JsonType>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JsonType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
    Null,
}

impl JsonType {
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
            Self::Null => value.is_null(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_schema() {
        let schema = DetectionSchema::from_json(
            r#"{
  "$id": "claude",
  // frontmatter fields
  "properties": {
    "tools": { "type": "string", "x-detection-weight": 0.5 },
    "permissionMode": {
      "enum": ["default", "plan"],
      "x-detection-weight": 0.3,
      "x-exclusive": true
    },
    "description": { "type": "string" }
  }
}"#,
        )
        .unwrap();

        assert_eq!(schema.id, "claude");
        assert_eq!(schema.weighted().count(), 2);
        assert!(schema.properties["permissionMode"].exclusive);
    }

    #[test]
    fn test_constraints() {
        let rule = PropertyRule {
            weight: 0.5,
            types: Some(TypeConstraint::Many(vec![JsonType::String, JsonType::Array])),
            ..Default::default()
        };
        assert!(rule.accepts(&json!("Read")));
        assert!(rule.accepts(&json!(["Read"])));
        assert!(!rule.accepts(&json!({"read": true})));

        let rule = PropertyRule {
            weight: 0.3,
            allowed: Some(vec![json!("primary"), json!("subagent")]),
            ..Default::default()
        };
        assert!(rule.accepts(&json!("subagent")));
        assert!(!rule.accepts(&json!("other")));
    }
}
