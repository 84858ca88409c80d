//! Section derivation: the independently-generatable units of an explore.
//!
//! A section is either the root explore or one referenced view. Derivation is
//! a pure function of the analysis result — no side effects, no external
//! calls — and its output order is stable: root first, then field-prefix
//! sections in `top_used_fields` order, then join-derived names in join order.

use std::collections::HashSet;

use crate::analysis::{AnalysisResult, RawExplore};
use crate::usage::WeightedField;

/// Marker for the root explore section.
pub const ROOT_SECTION: &str = "explore";

/// Derive the ordered set of generatable sections from an analysis result.
///
/// The root section is always present. A field name of the two-part
/// `object.field` form contributes its `object`; names with zero or more
/// than one separator contribute nothing. When `raw_analysis` parses, the
/// base view name and each join's `name` and `from` are added; when it does
/// not parse, the field-derived sections stand on their own.
pub fn derive_sections(analysis: &AnalysisResult) -> Vec<String> {
    let mut sections: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut push = |sections: &mut Vec<String>, name: &str| {
        if !name.is_empty() && seen.insert(name.to_string()) {
            sections.push(name.to_string());
        }
    };

    push(&mut sections, ROOT_SECTION);

    for field in &analysis.top_used_fields {
        if let Some(object) = object_prefix(&field.name) {
            push(&mut sections, object);
        }
    }

    if let Some(raw) = analysis.raw_analysis.as_deref() {
        if let Some(explore) = RawExplore::parse(raw) {
            if let Some(base) = explore.view_name.as_deref() {
                push(&mut sections, base);
            }
            for join in &explore.joins {
                if let Some(name) = join.name.as_deref() {
                    push(&mut sections, name);
                }
                if let Some(from) = join.from_view.as_deref() {
                    push(&mut sections, from);
                }
            }
        }
    }

    sections
}

/// The `object` of a two-part `object.field` name, or `None` for malformed
/// names (zero or more than one separator, or an empty part).
fn object_prefix(name: &str) -> Option<&str> {
    let mut parts = name.split('.');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(object), Some(field), None) if !object.is_empty() && !field.is_empty() => {
            Some(object)
        }
        _ => None,
    }
}

/// The subset of weighted fields relevant to one section: everything for the
/// root section, `"{section}."`-prefixed names otherwise. Prefix matching is
/// case-insensitive, mirroring the upstream service's filtering.
pub fn fields_for_section(section: &str, fields: &[WeightedField]) -> Vec<WeightedField> {
    if section == ROOT_SECTION {
        return fields.to_vec();
    }
    let prefix = format!("{}.", section.to_lowercase());
    fields
        .iter()
        .filter(|f| f.name.to_lowercase().starts_with(&prefix))
        .cloned()
        .collect()
}
