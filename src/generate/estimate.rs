//! Advisory token estimation for generation requests.
//!
//! The estimate never blocks submission; it only lets a caller warn before
//! sending a request that is likely to blow the downstream context window.

use super::prompts::render_generation_prompt;
use super::{ExploreContext, GenerationConfig};

/// Rough characters-per-token ratio for the downstream model family.
pub const CHARS_PER_TOKEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenEstimate {
    pub tokens: usize,
    pub exceeds_budget: bool,
}

/// Estimate the token count of arbitrary prompt text against a budget.
pub fn estimate_text(text: &str, token_budget: usize) -> TokenEstimate {
    let tokens = text.chars().count().div_ceil(CHARS_PER_TOKEN);
    TokenEstimate {
        tokens,
        exceeds_budget: tokens > token_budget,
    }
}

/// Estimate the request that would be submitted for one section, by
/// synthesizing the exact prompt the orchestrator would send.
pub fn estimate_section(
    section: &str,
    context: &ExploreContext,
    config: &GenerationConfig,
) -> TokenEstimate {
    let prompt = render_generation_prompt(section, context, config);
    estimate_text(&prompt, config.token_budget)
}
