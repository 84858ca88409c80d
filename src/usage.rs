use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, warn};

/// One historical query execution from the usage-history source.
///
/// `fields` arrives pre-serialized as a JSON list of `view.field` identifier
/// strings. `run_count` may be absent or non-numeric upstream and is treated
/// as zero in either case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRecord {
    #[serde(default)]
    pub fields: String,
    #[serde(default)]
    pub run_count: Value,
    /// Query origin (dashboard, explore, api, ...) — carried through for
    /// callers, not part of the weighting itself.
    #[serde(default)]
    pub source: Option<String>,
}

impl QueryRecord {
    pub fn new(fields: impl Into<String>, run_count: f64) -> Self {
        Self {
            fields: fields.into(),
            run_count: Value::from(run_count),
            source: None,
        }
    }

    /// The record's run count, or zero when absent or non-numeric.
    fn run_count(&self) -> f64 {
        match &self.run_count {
            Value::Number(n) => n.as_f64().unwrap_or(0.0),
            Value::String(s) => s.trim().parse().unwrap_or(0.0),
            _ => 0.0,
        }
    }
}

/// A field identifier paired with its aggregated historical-usage score.
///
/// Serializes as a `[name, weight]` pair — the format the analysis service
/// uses for `top_used_fields`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "(String, f64)", into = "(String, f64)")]
pub struct WeightedField {
    pub name: String,
    pub weight: f64,
}

impl WeightedField {
    pub fn new(name: impl Into<String>, weight: f64) -> Self {
        Self {
            name: name.into(),
            weight,
        }
    }
}

impl From<(String, f64)> for WeightedField {
    fn from((name, weight): (String, f64)) -> Self {
        Self { name, weight }
    }
}

impl From<WeightedField> for (String, f64) {
    fn from(field: WeightedField) -> (String, f64) {
        (field.name, field.weight)
    }
}

/// Aggregate historical query records into a ranked field-usage list.
///
/// Each record contributes its run count to every field in its list. Records
/// whose field list fails to parse are skipped — a local condition, never
/// fatal. Output is sorted by descending weight; equal weights keep
/// first-seen input order. Field names are matched exactly, case-sensitive.
pub fn aggregate_usage(records: &[QueryRecord]) -> Vec<WeightedField> {
    let mut weights: HashMap<String, f64> = HashMap::new();
    let mut order: Vec<String> = Vec::new();
    let mut skipped = 0usize;

    for record in records {
        let parsed: Vec<String> = match serde_json::from_str::<Value>(&record.fields) {
            Ok(Value::Array(items)) => items
                .into_iter()
                .filter_map(|item| match item {
                    Value::String(s) if !s.is_empty() => Some(s),
                    _ => None,
                })
                .collect(),
            _ => {
                skipped += 1;
                continue;
            }
        };

        let run_count = record.run_count();
        for field in parsed {
            if !weights.contains_key(&field) {
                order.push(field.clone());
            }
            *weights.entry(field).or_insert(0.0) += run_count;
        }
    }

    if skipped > 0 {
        warn!(skipped, total = records.len(), "skipped records with unparseable field lists");
    }

    let mut ranked: Vec<WeightedField> = order
        .into_iter()
        .map(|name| {
            let weight = weights[&name];
            WeightedField { name, weight }
        })
        .collect();

    // sort_by is stable: ties keep first-seen order
    ranked.sort_by(|a, b| {
        b.weight
            .partial_cmp(&a.weight)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    debug!(fields = ranked.len(), "usage aggregation complete");
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_record_round_trip() {
        let records = vec![QueryRecord::new(r#"["a.x","a.y"]"#, 5.0)];
        let ranked = aggregate_usage(&records);
        assert_eq!(
            ranked,
            vec![WeightedField::new("a.x", 5.0), WeightedField::new("a.y", 5.0)]
        );
    }

    #[test]
    fn test_empty_input() {
        assert!(aggregate_usage(&[]).is_empty());
    }

    #[test]
    fn test_unparseable_lists_yield_empty_output() {
        let records = vec![
            QueryRecord::new("not json", 3.0),
            QueryRecord::new(r#"{"a": 1}"#, 2.0),
            QueryRecord::new("", 1.0),
        ];
        assert!(aggregate_usage(&records).is_empty());
    }

    #[test]
    fn test_accumulation_and_descending_order() {
        let records = vec![
            QueryRecord::new(r#"["orders.total","users.name"]"#, 3.0),
            QueryRecord::new(r#"["orders.total"]"#, 7.0),
            QueryRecord::new(r#"["orders.count"]"#, 4.0),
        ];
        let ranked = aggregate_usage(&records);
        assert_eq!(
            ranked,
            vec![
                WeightedField::new("orders.total", 10.0),
                WeightedField::new("orders.count", 4.0),
                WeightedField::new("users.name", 3.0),
            ]
        );
    }

    #[test]
    fn test_ties_keep_first_seen_order() {
        let records = vec![
            QueryRecord::new(r#"["b.x","a.x","c.x"]"#, 2.0),
            QueryRecord::new(r#"["c.x"]"#, 0.0),
        ];
        let ranked = aggregate_usage(&records);
        let names: Vec<&str> = ranked.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["b.x", "a.x", "c.x"]);
    }

    #[test]
    fn test_missing_run_count_treated_as_zero() {
        let mut record = QueryRecord::new(r#"["a.x"]"#, 0.0);
        record.run_count = Value::Null;
        let ranked = aggregate_usage(&[record]);
        // zero-weight fields are still included when they appeared in a record
        assert_eq!(ranked, vec![WeightedField::new("a.x", 0.0)]);
    }

    #[test]
    fn test_non_numeric_run_count_treated_as_zero() {
        let mut record = QueryRecord::new(r#"["a.x"]"#, 0.0);
        record.run_count = Value::from("lots");
        assert_eq!(aggregate_usage(&[record]), vec![WeightedField::new("a.x", 0.0)]);
    }

    #[test]
    fn test_bad_record_does_not_abort_the_rest() {
        let records = vec![
            QueryRecord::new("garbage", 9.0),
            QueryRecord::new(r#"["a.x"]"#, 2.0),
        ];
        assert_eq!(aggregate_usage(&records), vec![WeightedField::new("a.x", 2.0)]);
    }

    #[test]
    fn test_non_string_entries_skipped_within_list() {
        let records = vec![QueryRecord::new(r#"["a.x", 42, null, "a.y"]"#, 1.0)];
        let ranked = aggregate_usage(&records);
        let names: Vec<&str> = ranked.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a.x", "a.y"]);
    }

    #[test]
    fn test_weighted_field_pair_serde() {
        let json = r#"[["orders.total", 10], ["users.name", 1.5]]"#;
        let fields: Vec<WeightedField> = serde_json::from_str(json).unwrap();
        assert_eq!(
            fields,
            vec![
                WeightedField::new("orders.total", 10.0),
                WeightedField::new("users.name", 1.5),
            ]
        );
        let back = serde_json::to_value(&fields).unwrap();
        assert_eq!(back, serde_json::json!([["orders.total", 10.0], ["users.name", 1.5]]));
    }
}
