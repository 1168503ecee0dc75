//! Remote-proxy backend: four stable JSON endpoints on a configured base URL.

use base64::Engine as _;
use serde_json::json;

use async_trait::async_trait;

use memoir_net::ApiError;
use memoir_store::{AnalysisResult, EnvironmentContext};

use crate::provider::EnrichmentProvider;
use crate::types::{
    tags_from_value, AnalysisContext, ChatReply, ChatTurn, EnrichmentContext, MediaPayload,
    SummaryResult,
};

/// Per-request deadline; elapsed time maps to [`ApiError::Timeout`].
const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct ProxyProvider {
    client: reqwest::Client,
    base_url: String,
}

impl ProxyProvider {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    fn endpoint(&self, operation: &str) -> String {
        format!("{}/{operation}", self.base_url.trim_end_matches('/'))
    }

    fn base_body(
        history: &[ChatTurn],
        analysis: &Option<AnalysisContext>,
        environment: &Option<EnvironmentContext>,
        context: &EnrichmentContext,
    ) -> serde_json::Value {
        json!({
            "history": history,
            "analysis": analysis,
            "environment": environment,
            "persona": context.persona,
            "language": context.language,
            "premium": context.premium,
        })
    }

    async fn post(
        &self,
        operation: &str,
        payload: serde_json::Value,
    ) -> Result<serde_json::Value, ApiError> {
        let response = self
            .client
            .post(self.endpoint(operation))
            .timeout(REQUEST_TIMEOUT)
            .json(&payload)
            .send()
            .await
            .map_err(ApiError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status.as_u16(), body));
        }

        response
            .json()
            .await
            .map_err(|err| ApiError::MalformedResponse(err.to_string()))
    }
}

#[async_trait]
impl EnrichmentProvider for ProxyProvider {
    fn name(&self) -> &'static str {
        "proxy"
    }

    async fn analyze_media(
        &self,
        payload: MediaPayload,
        environment: Option<EnvironmentContext>,
        context: EnrichmentContext,
    ) -> Result<AnalysisResult, ApiError> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(&payload.bytes);
        let body = json!({
            "media_kind": payload.kind,
            "media_base64": encoded,
            "environment": environment,
            "persona": context.persona,
            "language": context.language,
            "premium": context.premium,
        });

        let value = self.post("analyze", body).await?;
        serde_json::from_value(value).map_err(|err| ApiError::MalformedResponse(err.to_string()))
    }

    async fn converse(
        &self,
        history: Vec<ChatTurn>,
        analysis: Option<AnalysisContext>,
        environment: Option<EnvironmentContext>,
        context: EnrichmentContext,
    ) -> Result<ChatReply, ApiError> {
        let body = Self::base_body(&history, &analysis, &environment, &context);
        let value = self.post("chat", body).await?;
        // The proxy is expected to return the structured shape but some
        // deployments hand back a bare string; both decode.
        ChatReply::from_value(value)
    }

    async fn summarize(
        &self,
        history: Vec<ChatTurn>,
        analysis: Option<AnalysisContext>,
        environment: Option<EnvironmentContext>,
        context: EnrichmentContext,
    ) -> Result<SummaryResult, ApiError> {
        let body = Self::base_body(&history, &analysis, &environment, &context);
        let value = self.post("summary", body).await?;
        serde_json::from_value(value).map_err(|err| ApiError::MalformedResponse(err.to_string()))
    }

    async fn extract_tags(
        &self,
        history: Vec<ChatTurn>,
        analysis: Option<AnalysisContext>,
        existing: Vec<String>,
        context: EnrichmentContext,
    ) -> Result<Vec<String>, ApiError> {
        let mut body = Self::base_body(&history, &analysis, &None, &context);
        body["existing_tags"] = json!(existing);
        let value = self.post("tags", body).await?;
        tags_from_value(value)
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
