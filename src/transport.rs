use anyhow::{Context, Result};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::analysis::AnalysisResult;
use crate::usage::WeightedField;

/// One section-scoped generation request, in the generation service's wire
/// shape. Continuation requests additionally carry the exact prompt the
/// service used previously and the output accumulated so far.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationRequest {
    pub model_name: String,
    pub explore_name: String,
    pub section: String,
    pub recommendations: Vec<String>,
    pub weighted_fields: Vec<WeightedField>,
    pub user_description: String,
    pub common_questions: String,
    pub user_goals: String,
    pub use_extends: bool,
    #[serde(rename = "continue")]
    pub continuation: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lookml_suggestions: Option<String>,
}

/// The generation service's response: generated text, a truncation flag, and
/// the exact prompt used (needed to support continuation — the orchestrator
/// is otherwise stateless about what the service tracks internally).
#[derive(Debug, Clone, Deserialize)]
pub struct GenerationResponse {
    #[serde(rename = "ca_lookml_code")]
    pub code: String,
    #[serde(default)]
    pub is_truncated: bool,
    #[serde(default)]
    pub prompt: String,
}

/// Seam between the orchestrator and whatever actually produces text.
///
/// Object-safe so the orchestrator can be exercised against an in-memory
/// transport in tests and wrapped arbitrarily by callers.
pub trait GenerationTransport: Send + Sync {
    fn generate<'a>(
        &'a self,
        request: &'a GenerationRequest,
    ) -> BoxFuture<'a, Result<GenerationResponse>>;
}

impl<T: GenerationTransport + ?Sized> GenerationTransport for std::sync::Arc<T> {
    fn generate<'a>(
        &'a self,
        request: &'a GenerationRequest,
    ) -> BoxFuture<'a, Result<GenerationResponse>> {
        (**self).generate(request)
    }
}

/// Parameters for a full readiness analysis of one explore.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyzeRequest {
    pub model_name: String,
    pub explore_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub common_questions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_goals: Option<String>,
}

/// HTTP client for the analysis/generation service.
pub struct HttpGenerationClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpGenerationClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key,
        })
    }

    pub fn from_env() -> Result<Self> {
        let base_url =
            dotenv::var("CA_BASE_URL").unwrap_or_else(|_| "http://localhost:8080".to_string());
        let api_key = dotenv::var("CA_API_KEY").ok().filter(|k| !k.is_empty());
        Self::new(base_url, api_key)
    }

    /// Resolve an endpoint path against the base URL.
    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn post_json<B: Serialize>(&self, path: &str, body: &B) -> Result<serde_json::Value> {
        let mut req = self.client.post(self.endpoint(path)).json(body);
        if let Some(key) = &self.api_key {
            req = req.header("Authorization", format!("Bearer {}", key));
        }

        let resp = req.send().await.context("request failed")?;
        let status = resp.status();
        let text = resp.text().await.context("failed to read response body")?;
        if !status.is_success() {
            anyhow::bail!("service returned {}: {}", status, text);
        }
        serde_json::from_str(&text).context("failed to parse response JSON")
    }

    /// Run a full readiness analysis. The loose payload is validated into
    /// [`AnalysisResult`] at this boundary.
    pub async fn analyze(&self, request: &AnalyzeRequest) -> Result<AnalysisResult> {
        debug!(
            model = %request.model_name,
            explore = %request.explore_name,
            "analysis request"
        );
        let json = self.post_json("analyze", request).await?;
        Ok(AnalysisResult::from_value(&json))
    }
}

impl GenerationTransport for HttpGenerationClient {
    fn generate<'a>(
        &'a self,
        request: &'a GenerationRequest,
    ) -> BoxFuture<'a, Result<GenerationResponse>> {
        Box::pin(async move {
            debug!(
                section = %request.section,
                continuation = request.continuation,
                fields = request.weighted_fields.len(),
                "generation request"
            );
            let json = self.post_json("generate_ca_lookml", request).await?;
            let response: GenerationResponse =
                serde_json::from_value(json).context("malformed generation response")?;
            debug!(
                section = %request.section,
                code_len = response.code.len(),
                is_truncated = response.is_truncated,
                "generation response"
            );
            Ok(response)
        })
    }
}
