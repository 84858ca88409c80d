//! LookML scaffolding and prompt-material helpers.

use crate::analysis::{AnalysisResult, RawExplore};
use crate::sections::ROOT_SECTION;
use crate::usage::WeightedField;

/// Suffix appended to CA-optimized views and explores.
pub const CA_SUFFIX: &str = "_ca";

/// How many top fields to surface in generated agent instructions.
const AGENT_INSTRUCTION_TOP_FIELDS: usize = 5;

/// Scaffold a LookML file of `_ca` extends views and an extended explore
/// from the analyzed explore definition. The output is a starting point the
/// user refines — connection name and include paths are placeholders.
pub fn scaffold_ca_file(model_name: &str, explore_name: &str, analysis: &AnalysisResult) -> String {
    let indent = "  ";
    let ca_explore_name = format!("{}{}", explore_name, CA_SUFFIX);
    let mut lines: Vec<String> = Vec::new();

    lines.push(format!(
        "# LookML File for CA-Optimized Explore: {}/{}",
        model_name, explore_name
    ));
    lines.push("# Generated by Conversational Readiness Analyzer".to_string());
    lines.push("#".to_string());
    lines.push("# Purpose: This file defines extended Views and a new Explore based on".to_string());
    lines.push(format!(
        "#          '{}', curated for Conversational Analytics (CA).",
        explore_name
    ));
    lines.push("#".to_string());
    lines.push("# Instructions:".to_string());
    lines.push("# 1. Save this file in your LookML project".to_string());
    lines.push("# 2. Replace 'CONNECTION_NAME_PLACEHOLDER' with your actual connection name".to_string());
    lines.push("# 3. Verify the 'include:' paths point correctly to your original view files".to_string());
    lines.push("# 4. Review and refine the auto-generated labels and descriptions".to_string());
    lines.push(String::new());
    lines.push("connection: \"CONNECTION_NAME_PLACEHOLDER\"".to_string());

    let explore_def = analysis
        .raw_analysis
        .as_deref()
        .and_then(RawExplore::parse)
        .unwrap_or_default();

    if let Some(base_view) = explore_def.view_name.as_deref() {
        lines.push(format!(
            "\nview: {base}{suffix} extends: [{base}] {{",
            base = base_view,
            suffix = CA_SUFFIX
        ));
        lines.push(format!("{}# Add CA-specific refinements here", indent));
        lines.push("}".to_string());
    }

    lines.push(format!("\nexplore: {} {{", ca_explore_name));
    if let Some(base_view) = explore_def.view_name.as_deref() {
        lines.push(format!("{}from: {}{}", indent, base_view, CA_SUFFIX));
    }

    for join in &explore_def.joins {
        let Some(join_view) = join.name.as_deref() else {
            continue;
        };
        lines.push(format!("\n{}join: {}{} {{", indent, join_view, CA_SUFFIX));
        lines.push(format!("{i}{i}from: {}{}", join_view, CA_SUFFIX, i = indent));
        if let Some(join_type) = join.join_type.as_deref() {
            lines.push(format!("{i}{i}type: {}", join_type, i = indent));
        }
        if let Some(relationship) = join.relationship.as_deref() {
            lines.push(format!("{i}{i}relationship: {}", relationship, i = indent));
        }
        if let Some(sql_on) = join.sql_on.as_deref() {
            lines.push(format!("{i}{i}sql_on: {} ;;", sql_on, i = indent));
        }
        lines.push(format!("{}}}", indent));
    }

    lines.push("}".to_string());
    lines.join("\n")
}

/// Suggested agent instructions from user context and the top used fields.
pub fn agent_instructions(
    user_description: &str,
    common_questions: &str,
    user_goals: &str,
    top_used_fields: &[WeightedField],
) -> Vec<String> {
    let mut instructions = Vec::new();

    if !user_description.is_empty() {
        instructions.push(format!("User Description: {}", user_description));
    }
    if !common_questions.is_empty() {
        instructions.push(format!("Common Questions: {}", common_questions));
    }
    if !user_goals.is_empty() {
        instructions.push(format!("User Goals: {}", user_goals));
    }

    if !top_used_fields.is_empty() {
        let names: Vec<&str> = top_used_fields
            .iter()
            .take(AGENT_INSTRUCTION_TOP_FIELDS)
            .map(|f| f.name.as_str())
            .collect();
        instructions.push(format!("Most Common Fields: {}", names.join(", ")));
    }

    if instructions.is_empty() {
        instructions.push(
            "No specific agent instructions generated automatically. \
             Review recommendations and top fields manually."
                .to_string(),
        );
    }

    instructions
}

/// Keep only the recommendations relevant to one section: explore/join-level
/// (or "all") mentions for the root, view-name (or "all") mentions otherwise.
pub fn filter_recommendations(section: &str, recommendations: &[String]) -> Vec<String> {
    let section_lower = section.to_lowercase();
    recommendations
        .iter()
        .filter(|rec| {
            let rec_lower = rec.to_lowercase();
            if section == ROOT_SECTION {
                rec_lower.contains("explore")
                    || rec_lower.contains("join")
                    || rec_lower.contains("all")
            } else {
                rec_lower.contains(&section_lower) || rec_lower.contains("all")
            }
        })
        .cloned()
        .collect()
}

/// Keep only the suggestion lines relevant to one section.
pub fn filter_suggestions(section: &str, suggestions: &str) -> Option<String> {
    let section_lower = section.to_lowercase();
    let relevant: Vec<&str> = suggestions
        .lines()
        .filter(|line| {
            let line_lower = line.to_lowercase();
            line_lower.contains(&section_lower) || line_lower.contains("explore")
        })
        .collect();
    if relevant.is_empty() {
        None
    } else {
        Some(relevant.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analysis_with_raw(raw: &str) -> AnalysisResult {
        AnalysisResult {
            raw_analysis: Some(raw.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_scaffold_contains_extended_views_and_joins() {
        let raw = r#"{
            "view_name": "orders",
            "joins": [
                {"name": "users", "type": "left_outer", "relationship": "many_to_one",
                 "sql_on": "${orders.user_id} = ${users.id}"}
            ]
        }"#;
        let file = scaffold_ca_file("ecommerce", "order_items", &analysis_with_raw(raw));
        assert!(file.contains("connection: \"CONNECTION_NAME_PLACEHOLDER\""));
        assert!(file.contains("view: orders_ca extends: [orders] {"));
        assert!(file.contains("explore: order_items_ca {"));
        assert!(file.contains("from: orders_ca"));
        assert!(file.contains("join: users_ca {"));
        assert!(file.contains("type: left_outer"));
        assert!(file.contains("relationship: many_to_one"));
        assert!(file.contains("sql_on: ${orders.user_id} = ${users.id} ;;"));
    }

    #[test]
    fn test_scaffold_survives_unparseable_raw_analysis() {
        let file = scaffold_ca_file("m", "e", &analysis_with_raw("{broken"));
        assert!(file.contains("explore: e_ca {"));
        assert!(!file.contains("view:"));
    }

    #[test]
    fn test_agent_instructions_with_context_and_fields() {
        let fields: Vec<WeightedField> = (0..7)
            .map(|i| WeightedField::new(format!("orders.f{}", i), (7 - i) as f64))
            .collect();
        let instructions = agent_instructions("Retail data", "", "Track revenue", &fields);
        assert_eq!(instructions[0], "User Description: Retail data");
        assert_eq!(instructions[1], "User Goals: Track revenue");
        // only the top 5 fields are listed
        assert_eq!(
            instructions[2],
            "Most Common Fields: orders.f0, orders.f1, orders.f2, orders.f3, orders.f4"
        );
    }

    #[test]
    fn test_agent_instructions_fallback() {
        let instructions = agent_instructions("", "", "", &[]);
        assert_eq!(instructions.len(), 1);
        assert!(instructions[0].starts_with("No specific agent instructions"));
    }

    #[test]
    fn test_filter_recommendations_root_vs_view() {
        let recs = vec![
            "Simplify the explore joins.".to_string(),
            "Add a description to users.name.".to_string(),
            "Hide all technical fields.".to_string(),
        ];
        let root = filter_recommendations(ROOT_SECTION, &recs);
        assert_eq!(root.len(), 2);
        assert!(root.iter().all(|r| !r.contains("users.name")));

        let view = filter_recommendations("users", &recs);
        assert_eq!(view.len(), 2);
        assert!(view.iter().any(|r| r.contains("users.name")));
    }

    #[test]
    fn test_filter_suggestions_by_section() {
        let suggestions = "view: users {\n  dimension: name {}\n}\nexplore: orders {}";
        let filtered = filter_suggestions("users", suggestions).unwrap();
        assert!(filtered.contains("view: users {"));
        assert!(filtered.contains("explore: orders {}"));
        assert!(!filtered.contains("dimension: name"));
    }
}
