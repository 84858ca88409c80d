//! Conversational-analytics readiness core.
//!
//! Evaluates how well a Looker explore is suited for natural-language
//! querying and drives iterative generation of CA-optimized LookML for it:
//!
//! - [`usage`] — weight fields by historical query usage
//! - [`sections`] — derive the independently-generatable sections of an explore
//! - [`generate`] — the per-section generation state machine, token
//!   estimation, and prompt synthesis
//! - [`transport`] — the wire contract with the analysis/generation service
//! - [`artifacts`] — persistence of analysis results with optimistic versioning
//! - [`lookml`] — scaffolding and prompt-material helpers
//!
//! The surrounding application (selection UI, HTTP server, page chrome) is
//! the caller's glue; this crate owns only the parts with engineering depth.

pub mod analysis;
pub mod artifacts;
pub mod generate;
pub mod lookml;
pub mod sections;
pub mod transport;
pub mod usage;

pub use analysis::{AnalysisResult, JoinDescriptor, RawExplore};
pub use artifacts::{ArtifactStore, StoredAnalysis, VersionConflict};
pub use generate::{
    BulkProgress, ExploreContext, GenerationConfig, GenerationOrchestrator, OrchestratorError,
    SectionPhase, TokenEstimate, DEFAULT_TOKEN_BUDGET,
};
pub use sections::{derive_sections, fields_for_section, ROOT_SECTION};
pub use transport::{
    AnalyzeRequest, GenerationRequest, GenerationResponse, GenerationTransport,
    HttpGenerationClient,
};
pub use usage::{aggregate_usage, QueryRecord, WeightedField};
