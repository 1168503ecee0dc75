use async_trait::async_trait;

use memoir_net::ApiError;
use memoir_store::{AnalysisResult, EnvironmentContext};

use crate::types::{AnalysisContext, ChatReply, ChatTurn, EnrichmentContext, MediaPayload, SummaryResult};

/// The single enrichment interface all three backends implement.
///
/// Arguments are passed owned so callers can re-issue a call cheaply under
/// the retry wrapper without threading borrows through it.
#[async_trait]
pub trait EnrichmentProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Analyze a finished media payload into scene description, mood, and tags.
    async fn analyze_media(
        &self,
        payload: MediaPayload,
        environment: Option<EnvironmentContext>,
        context: EnrichmentContext,
    ) -> Result<AnalysisResult, ApiError>;

    /// Produce the next conversational reply for the capture-time chat.
    async fn converse(
        &self,
        history: Vec<ChatTurn>,
        analysis: Option<AnalysisContext>,
        environment: Option<EnvironmentContext>,
        context: EnrichmentContext,
    ) -> Result<ChatReply, ApiError>;

    /// Distill the conversation into a title and narrative summary.
    async fn summarize(
        &self,
        history: Vec<ChatTurn>,
        analysis: Option<AnalysisContext>,
        environment: Option<EnvironmentContext>,
        context: EnrichmentContext,
    ) -> Result<SummaryResult, ApiError>;

    /// Suggest up to 3 classification tags, preferring names from `existing`.
    async fn extract_tags(
        &self,
        history: Vec<ChatTurn>,
        analysis: Option<AnalysisContext>,
        existing: Vec<String>,
        context: EnrichmentContext,
    ) -> Result<Vec<String>, ApiError>;
}
