//! Deterministic prompt templates for section generation.
//!
//! The same synthesis feeds the token estimator and the request materials, so
//! an estimate always reflects what would actually be submitted.

use crate::lookml::{filter_recommendations, filter_suggestions};
use crate::sections::{fields_for_section, ROOT_SECTION};

use super::{ExploreContext, GenerationConfig};

/// Truncate a user-supplied context string to `max_chars` characters.
pub(crate) fn clamp_context(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Synthesize the full prompt for one section's generation request.
pub fn render_generation_prompt(
    section: &str,
    context: &ExploreContext,
    config: &GenerationConfig,
) -> String {
    let fields: Vec<String> = fields_for_section(section, &context.weighted_fields)
        .into_iter()
        .take(config.max_weighted_fields)
        .map(|f| f.name)
        .collect();
    let capped: Vec<String> = context
        .recommendations
        .iter()
        .take(config.max_recommendations)
        .cloned()
        .collect();
    let recommendations = filter_recommendations(section, &capped);

    let user_description = clamp_context(&context.user_description, config.max_context_chars);
    let common_questions = clamp_context(&context.common_questions, config.max_context_chars);
    let user_goals = clamp_context(&context.user_goals, config.max_context_chars);

    let mut prompt = if section == ROOT_SECTION {
        format!(
            "You are an expert LookML developer. Generate the LookML for the explore '{explore}' \
             in model '{model}', implementing as many of the summarized recommendations as \
             possible for Conversational Analytics readiness. Use the weighted fields to \
             prioritize which joins or explore-level settings to improve. Use the user context \
             to inform labels and descriptions. Output only the LookML code for the explore, \
             ready to copy/paste into a LookML project.\n\n\
             User Description: {user_description}\n\
             Common Questions: {common_questions}\n\
             User Goals: {user_goals}\n\n\
             Weighted Fields (most important first): {fields}\n\n\
             Summarized Recommendations:\n",
            explore = context.explore_name,
            model = context.model_name,
            fields = fields.join(", "),
        )
    } else {
        format!(
            "You are an expert LookML developer. Generate an extends view for '{section}' in \
             model '{model}', including ONLY the relevant fields below. Implement as many of \
             the summarized recommendations as possible for Conversational Analytics readiness. \
             Use the weighted fields to prioritize which fields to improve. Use the user \
             context to inform labels and descriptions.\n\n\
             IMPORTANT RULES:\n\
             1. Keep all synonyms within the description parameter, do not add a separate synonym parameter\n\
             2. Only include the relevant fields listed below in the extends view\n\
             3. Output only the LookML code for the extends view, ready to copy/paste into a LookML project.\n\n\
             User Description: {user_description}\n\
             Common Questions: {common_questions}\n\
             User Goals: {user_goals}\n\n\
             Relevant Fields (most important first): {fields}\n\n\
             Summarized Recommendations:\n",
            model = context.model_name,
            fields = fields.join(", "),
        )
    };

    for rec in &recommendations {
        prompt.push_str("- ");
        prompt.push_str(rec);
        prompt.push('\n');
    }

    if let Some(suggestions) = context
        .lookml_suggestions
        .as_deref()
        .and_then(|s| filter_suggestions(section, s))
    {
        prompt.push_str("\nRelevant LookML Suggestions:\n");
        prompt.push_str(&suggestions);
        prompt.push('\n');
    }

    prompt.push_str("\nGenerate only the LookML code for this section. Do not include other views or explores.");
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usage::WeightedField;

    fn context() -> ExploreContext {
        ExploreContext {
            model_name: "ecommerce".into(),
            explore_name: "order_items".into(),
            user_description: "Retail orders".into(),
            common_questions: "What were sales last month?".into(),
            user_goals: "Track revenue".into(),
            use_extends: false,
            recommendations: vec![
                "Simplify the explore joins.".into(),
                "Add a description to orders.total.".into(),
            ],
            weighted_fields: vec![
                WeightedField::new("orders.total", 10.0),
                WeightedField::new("users.name", 1.0),
            ],
            lookml_suggestions: None,
        }
    }

    #[test]
    fn test_root_prompt_lists_all_fields() {
        let prompt = render_generation_prompt(ROOT_SECTION, &context(), &GenerationConfig::default());
        assert!(prompt.contains("the explore 'order_items' in model 'ecommerce'"));
        assert!(prompt.contains("orders.total, users.name"));
        assert!(prompt.contains("- Simplify the explore joins."));
        // view-specific recommendation filtered out at the root
        assert!(!prompt.contains("orders.total.\n"));
    }

    #[test]
    fn test_view_prompt_scopes_fields_and_recs() {
        let prompt = render_generation_prompt("orders", &context(), &GenerationConfig::default());
        assert!(prompt.contains("an extends view for 'orders'"));
        assert!(prompt.contains("Relevant Fields (most important first): orders.total"));
        assert!(!prompt.contains("users.name"));
        assert!(prompt.contains("- Add a description to orders.total."));
    }

    #[test]
    fn test_context_clamped() {
        let mut ctx = context();
        ctx.user_description = "x".repeat(1000);
        let config = GenerationConfig::default();
        let prompt = render_generation_prompt(ROOT_SECTION, &ctx, &config);
        assert!(prompt.contains(&"x".repeat(config.max_context_chars)));
        assert!(!prompt.contains(&"x".repeat(config.max_context_chars + 1)));
    }

    #[test]
    fn test_prompt_is_deterministic() {
        let ctx = context();
        let config = GenerationConfig::default();
        assert_eq!(
            render_generation_prompt("orders", &ctx, &config),
            render_generation_prompt("orders", &ctx, &config)
        );
    }
}
