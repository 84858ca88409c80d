//! Boundary shapes for the external analysis service.
//!
//! Payloads from the service are duck-typed JSON; they are validated into
//! these explicit shapes before anything else in the crate touches them, so
//! core logic never handles partially-shaped data.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::usage::WeightedField;

/// A readiness analysis for one explore, as returned by the analysis service.
///
/// Members the service omitted deserialize to their empty defaults —
/// downstream code treats empty and absent identically.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub model_name: String,
    #[serde(default)]
    pub explore_name: String,
    #[serde(default)]
    pub grade: Option<i64>,
    #[serde(default)]
    pub rationale: Option<String>,
    #[serde(default)]
    pub top_used_fields: Vec<WeightedField>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub agent_instructions: Vec<String>,
    #[serde(default)]
    pub lookml_suggestions: Option<String>,
    /// Serialized JSON of the explore definition (base view + joins).
    /// Opaque here; parsed on demand via [`RawExplore::parse`].
    #[serde(default)]
    pub raw_analysis: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl AnalysisResult {
    /// Validate a loose service payload into the explicit shape.
    ///
    /// Never fails: unknown members are dropped, malformed `top_used_fields`
    /// entries are skipped, wrong-typed members fall back to empty.
    pub fn from_value(value: &Value) -> Self {
        let str_member = |key: &str| -> Option<String> {
            value.get(key).and_then(Value::as_str).map(str::to_string)
        };
        let list_member = |key: &str| -> Vec<String> {
            value
                .get(key)
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default()
        };

        let mut top_used_fields = Vec::new();
        if let Some(pairs) = value.get("top_used_fields").and_then(Value::as_array) {
            for pair in pairs {
                let name = pair.get(0).and_then(Value::as_str);
                let weight = pair.get(1).and_then(Value::as_f64);
                match (name, weight) {
                    (Some(name), Some(weight)) if !name.is_empty() => {
                        top_used_fields.push(WeightedField::new(name, weight));
                    }
                    _ => warn!(?pair, "skipping malformed top_used_fields entry"),
                }
            }
        }

        Self {
            status: str_member("status").unwrap_or_default(),
            model_name: str_member("model_name").unwrap_or_default(),
            explore_name: str_member("explore_name").unwrap_or_default(),
            grade: value.get("grade").and_then(Value::as_i64),
            rationale: str_member("rationale"),
            top_used_fields,
            recommendations: list_member("recommendations"),
            agent_instructions: list_member("agent_instructions"),
            lookml_suggestions: str_member("lookml_suggestions"),
            raw_analysis: str_member("raw_analysis"),
            error: str_member("error"),
        }
    }
}

/// The explore definition carried in `raw_analysis`: base view plus joins.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawExplore {
    #[serde(default)]
    pub view_name: Option<String>,
    #[serde(default)]
    pub joins: Vec<JoinDescriptor>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JoinDescriptor {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "from")]
    pub from_view: Option<String>,
    #[serde(default, rename = "type")]
    pub join_type: Option<String>,
    #[serde(default)]
    pub relationship: Option<String>,
    #[serde(default)]
    pub sql_on: Option<String>,
}

impl RawExplore {
    /// Parse the serialized explore definition. Parse failure is local and
    /// recoverable — callers fall back to whatever they already derived.
    pub fn parse(raw: &str) -> Option<Self> {
        match serde_json::from_str(raw) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                warn!(error = %e, "raw_analysis did not parse; falling back");
                None
            }
        }
    }
}
