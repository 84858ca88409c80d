//! Sectioned, resumable generation orchestration.
//!
//! One tagged-variant state machine per section, driven against an external
//! [`GenerationTransport`]. Transitions happen only at the owning
//! request/response pair; responses are keyed by a request token so a stale
//! response from a superseded request can never mutate newer state.

pub mod estimate;
pub mod prompts;

use std::collections::{HashMap, HashSet};

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::lookml::{filter_recommendations, filter_suggestions};
use crate::sections::{fields_for_section, ROOT_SECTION};
use crate::transport::{GenerationRequest, GenerationTransport};
use crate::usage::WeightedField;

pub use estimate::{estimate_section, estimate_text, TokenEstimate, CHARS_PER_TOKEN};

/// Default token budget, tracking the downstream model's context window.
pub const DEFAULT_TOKEN_BUDGET: usize = 8192;

/// Tunable limits for prompt assembly and estimation.
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    /// Advisory token budget for one generation request.
    pub token_budget: usize,
    /// Most recommendations carried into one request.
    pub max_recommendations: usize,
    /// Most weighted fields carried into one request.
    pub max_weighted_fields: usize,
    /// Per-string cap on user-supplied context.
    pub max_context_chars: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            token_budget: DEFAULT_TOKEN_BUDGET,
            max_recommendations: 7,
            max_weighted_fields: 10,
            max_context_chars: 300,
        }
    }
}

/// Everything about the analyzed explore that generation requests draw on.
#[derive(Debug, Clone, Default)]
pub struct ExploreContext {
    pub model_name: String,
    pub explore_name: String,
    pub user_description: String,
    pub common_questions: String,
    pub user_goals: String,
    /// Style flag: generate the root as `extends` rather than a refinement.
    /// Non-root sections always generate as extends.
    pub use_extends: bool,
    pub recommendations: Vec<String>,
    pub weighted_fields: Vec<WeightedField>,
    pub lookml_suggestions: Option<String>,
}

/// Per-section generation state. State-specific payload keeps invalid
/// combinations (code without a prompt, continuing while idle) out of the
/// type entirely.
#[derive(Debug, Clone, PartialEq)]
pub enum SectionPhase {
    Idle,
    Generating {
        token: u64,
    },
    Ready {
        code: String,
        prompt: String,
    },
    Truncated {
        code: String,
        prompt: String,
    },
    /// A continuation is outstanding. Carries the accumulated code so a
    /// failed continuation can restore the prior phase without loss.
    Continuing {
        code: String,
        prompt: String,
        was_truncated: bool,
        token: u64,
    },
    Failed {
        message: String,
    },
}

impl SectionPhase {
    /// Accumulated code, when any has been produced.
    pub fn code(&self) -> Option<&str> {
        match self {
            SectionPhase::Ready { code, .. }
            | SectionPhase::Truncated { code, .. }
            | SectionPhase::Continuing { code, .. } => Some(code),
            _ => None,
        }
    }

    /// True while a request for this section is outstanding.
    pub fn in_flight(&self) -> bool {
        matches!(
            self,
            SectionPhase::Generating { .. } | SectionPhase::Continuing { .. }
        )
    }

    pub fn is_truncated(&self) -> bool {
        matches!(self, SectionPhase::Truncated { .. })
    }
}

/// Running position of a bulk generation, for "generating i/n" display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkProgress {
    pub index: usize,
    pub total: usize,
}

/// Precondition failures, rejected synchronously before any transport call.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("no sections selected for generation")]
    NoSectionsSelected,
    #[error("section '{0}' has no previous generation to continue")]
    NothingToContinue(String),
}

#[derive(Default)]
struct SectionTable {
    phases: HashMap<String, SectionPhase>,
    copied: HashSet<String>,
    last_errors: HashMap<String, String>,
    bulk: Option<BulkProgress>,
    next_token: u64,
}

impl SectionTable {
    fn mint_token(&mut self) -> u64 {
        self.next_token += 1;
        self.next_token
    }

    fn phase(&self, section: &str) -> SectionPhase {
        self.phases
            .get(section)
            .cloned()
            .unwrap_or(SectionPhase::Idle)
    }

    /// True when `section` still holds an in-flight phase carrying `token`.
    fn owns_token(&self, section: &str, token: u64) -> bool {
        match self.phases.get(section) {
            Some(SectionPhase::Generating { token: t }) => *t == token,
            Some(SectionPhase::Continuing { token: t, .. }) => *t == token,
            _ => false,
        }
    }
}

/// Drives section-scoped generation workflows for one analyzed explore.
/// Constructed per explore and discarded (or [`reset`](Self::reset)) when the
/// selection changes.
pub struct GenerationOrchestrator<T> {
    transport: T,
    context: ExploreContext,
    config: GenerationConfig,
    state: Mutex<SectionTable>,
}

impl<T: GenerationTransport> GenerationOrchestrator<T> {
    pub fn new(transport: T, context: ExploreContext, config: GenerationConfig) -> Self {
        Self {
            transport,
            context,
            config,
            state: Mutex::new(SectionTable::default()),
        }
    }

    pub fn context(&self) -> &ExploreContext {
        &self.context
    }

    /// Current phase of one section (Idle when never touched).
    pub async fn phase(&self, section: &str) -> SectionPhase {
        self.state.lock().await.phase(section)
    }

    /// Snapshot of every section that has left Idle.
    pub async fn phases(&self) -> HashMap<String, SectionPhase> {
        self.state.lock().await.phases.clone()
    }

    /// Error message from the most recent failed request for a section, if
    /// the failure did not leave the section in `Failed` (a failed
    /// continuation restores the prior phase but keeps its message here).
    pub async fn last_error(&self, section: &str) -> Option<String> {
        self.state.lock().await.last_errors.get(section).cloned()
    }

    /// Advisory size estimate for one section's request.
    pub fn estimate(&self, section: &str) -> TokenEstimate {
        estimate_section(section, &self.context, &self.config)
    }

    /// Generate one section. A trigger while the section already has an
    /// outstanding request is a no-op returning the in-flight phase; no
    /// second transport call is issued.
    pub async fn generate_section(&self, section: &str) -> SectionPhase {
        let token = {
            let mut table = self.state.lock().await;
            let current = table.phase(section);
            if current.in_flight() {
                debug!(section, "generation already in flight; ignoring duplicate trigger");
                return current;
            }
            let token = table.mint_token();
            table
                .phases
                .insert(section.to_string(), SectionPhase::Generating { token });
            table.copied.remove(section);
            table.last_errors.remove(section);
            token
        };

        info!(section, token, "section generation started");
        let request = self.build_request(section, None);
        let result = self.transport.generate(&request).await;

        let mut table = self.state.lock().await;
        if !table.owns_token(section, token) {
            debug!(section, token, "stale generation response discarded");
            return table.phase(section);
        }

        let next = match result {
            Ok(response) => {
                info!(
                    section,
                    code_len = response.code.len(),
                    is_truncated = response.is_truncated,
                    "section generation complete"
                );
                if response.is_truncated {
                    SectionPhase::Truncated {
                        code: response.code,
                        prompt: response.prompt,
                    }
                } else {
                    SectionPhase::Ready {
                        code: response.code,
                        prompt: response.prompt,
                    }
                }
            }
            Err(e) => {
                warn!(section, error = %e, "section generation failed");
                SectionPhase::Failed {
                    message: format!("Generation failed: {:#}", e),
                }
            }
        };
        table.phases.insert(section.to_string(), next.clone());
        next
    }

    /// Continue a truncated (or Ready) section from its stored prompt and
    /// accumulated code. The returned fragment is appended, minus any
    /// trailing lines the service repeated. A transport failure restores the
    /// pre-continuation phase with the accumulated code intact.
    pub async fn continue_section(
        &self,
        section: &str,
    ) -> Result<SectionPhase, OrchestratorError> {
        let (token, code, prompt, was_truncated) = {
            let mut table = self.state.lock().await;
            let current = table.phase(section);
            if current.in_flight() {
                debug!(section, "continuation already in flight; ignoring duplicate trigger");
                return Ok(current);
            }
            let (code, prompt, was_truncated) = match current {
                SectionPhase::Truncated { code, prompt } if !code.is_empty() && !prompt.is_empty() => {
                    (code, prompt, true)
                }
                SectionPhase::Ready { code, prompt } if !code.is_empty() && !prompt.is_empty() => {
                    (code, prompt, false)
                }
                _ => return Err(OrchestratorError::NothingToContinue(section.to_string())),
            };
            let token = table.mint_token();
            table.phases.insert(
                section.to_string(),
                SectionPhase::Continuing {
                    code: code.clone(),
                    prompt: prompt.clone(),
                    was_truncated,
                    token,
                },
            );
            table.last_errors.remove(section);
            (token, code, prompt, was_truncated)
        };

        info!(section, token, was_truncated, "section continuation started");
        let request = self.build_request(section, Some((&prompt, &code)));
        let result = self.transport.generate(&request).await;

        let mut table = self.state.lock().await;
        if !table.owns_token(section, token) {
            debug!(section, token, "stale continuation response discarded");
            return Ok(table.phase(section));
        }

        let next = match result {
            Ok(response) => {
                let combined = append_continuation(&code, &response.code);
                info!(
                    section,
                    fragment_len = response.code.len(),
                    total_len = combined.len(),
                    is_truncated = response.is_truncated,
                    "section continuation complete"
                );
                if response.is_truncated {
                    SectionPhase::Truncated {
                        code: combined,
                        prompt: response.prompt,
                    }
                } else {
                    SectionPhase::Ready {
                        code: combined,
                        prompt: response.prompt,
                    }
                }
            }
            Err(e) => {
                warn!(section, error = %e, "continuation failed; restoring prior phase");
                table
                    .last_errors
                    .insert(section.to_string(), format!("Continuation failed: {:#}", e));
                if was_truncated {
                    SectionPhase::Truncated { code, prompt }
                } else {
                    SectionPhase::Ready { code, prompt }
                }
            }
        };
        table.phases.insert(section.to_string(), next.clone());
        Ok(next)
    }

    /// Generate an ordered set of sections one at a time, waiting for each to
    /// reach a terminal state before starting the next. One section's failure
    /// does not abort the rest. Progress is observable via
    /// [`bulk_progress`](Self::bulk_progress) while the run is active.
    pub async fn generate_bulk(
        &self,
        sections: &[String],
    ) -> Result<Vec<SectionPhase>, OrchestratorError> {
        if sections.is_empty() {
            return Err(OrchestratorError::NoSectionsSelected);
        }

        let total = sections.len();
        let mut outcomes = Vec::with_capacity(total);
        for (i, section) in sections.iter().enumerate() {
            let progress = BulkProgress {
                index: i + 1,
                total,
            };
            self.state.lock().await.bulk = Some(progress);
            info!(section = %section, index = progress.index, total, "bulk generation step");
            outcomes.push(self.generate_section(section).await);
        }
        self.state.lock().await.bulk = None;
        info!(total, "bulk generation finished");
        Ok(outcomes)
    }

    /// Position of the active bulk run, if one is in progress.
    pub async fn bulk_progress(&self) -> Option<BulkProgress> {
        self.state.lock().await.bulk
    }

    /// Discard all section state (back to Idle). Requests already in flight
    /// are not aborted; their responses are discarded on arrival.
    pub async fn reset(&self) {
        let mut table = self.state.lock().await;
        table.phases.clear();
        table.copied.clear();
        table.last_errors.clear();
        table.bulk = None;
        info!("orchestrator reset; in-flight responses will be discarded");
    }

    /// Mark a section's code as copied for UI feedback. Transient, no effect
    /// on the state machine. Returns false when there is no code to copy.
    pub async fn mark_copied(&self, section: &str) -> bool {
        let mut table = self.state.lock().await;
        let has_code = matches!(
            table.phase(section),
            SectionPhase::Ready { .. } | SectionPhase::Truncated { .. }
        );
        if has_code {
            table.copied.insert(section.to_string());
        }
        has_code
    }

    pub async fn is_copied(&self, section: &str) -> bool {
        self.state.lock().await.copied.contains(section)
    }

    fn build_request(
        &self,
        section: &str,
        continuation: Option<(&str, &str)>,
    ) -> GenerationRequest {
        let ctx = &self.context;
        let config = &self.config;
        let capped: Vec<String> = ctx
            .recommendations
            .iter()
            .take(config.max_recommendations)
            .cloned()
            .collect();
        GenerationRequest {
            model_name: ctx.model_name.clone(),
            explore_name: ctx.explore_name.clone(),
            section: section.to_string(),
            recommendations: filter_recommendations(section, &capped),
            weighted_fields: fields_for_section(section, &ctx.weighted_fields)
                .into_iter()
                .take(config.max_weighted_fields)
                .collect(),
            user_description: prompts::clamp_context(&ctx.user_description, config.max_context_chars),
            common_questions: prompts::clamp_context(&ctx.common_questions, config.max_context_chars),
            user_goals: prompts::clamp_context(&ctx.user_goals, config.max_context_chars),
            // views always generate as extends
            use_extends: ctx.use_extends || section != ROOT_SECTION,
            continuation: continuation.is_some(),
            previous_prompt: continuation.map(|(prompt, _)| prompt.to_string()),
            previous_output: continuation.map(|(_, code)| code.to_string()),
            lookml_suggestions: ctx
                .lookml_suggestions
                .as_deref()
                .and_then(|s| filter_suggestions(section, s)),
        }
    }
}

/// Maximum lines of overlap to trim when stitching a continuation fragment
/// onto accumulated code (the service repeats trailing lines for context).
const MAX_CONTINUATION_OVERLAP: usize = 30;

/// Append a continuation fragment, dropping any leading lines that repeat
/// the tail of the accumulated code.
fn append_continuation(previous: &str, fragment: &str) -> String {
    if fragment.trim().is_empty() {
        return previous.to_string();
    }

    let prev_lines: Vec<&str> = previous.trim_end().lines().collect();
    let new_lines: Vec<&str> = fragment.trim_matches('\n').lines().collect();

    let max_overlap = MAX_CONTINUATION_OVERLAP
        .min(prev_lines.len())
        .min(new_lines.len());
    let mut overlap = 0;
    for i in (1..=max_overlap).rev() {
        if prev_lines[prev_lines.len() - i..] == new_lines[..i] {
            overlap = i;
            break;
        }
    }

    let mut combined = previous.to_string();
    if !combined.ends_with('\n') {
        combined.push('\n');
    }
    combined.push_str(&new_lines[overlap..].join("\n"));
    combined
}
