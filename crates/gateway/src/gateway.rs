use std::sync::{Arc, RwLock};

use tracing::debug;

use memoir_config::{GatewayConfig, ProviderMode};
use memoir_net::{retry, ApiError, RetryPolicy};
use memoir_store::{AnalysisResult, EnvironmentContext};

use crate::direct::DirectProvider;
use crate::mock::MockProvider;
use crate::provider::EnrichmentProvider;
use crate::proxy::ProxyProvider;
use crate::types::{
    AnalysisContext, ChatReply, ChatTurn, EnrichmentContext, MediaPayload, SummaryResult, MAX_TAGS,
};

/// Facade over the three enrichment backends.
///
/// Cheap to clone; the configuration lives behind a shared lock so a mode
/// change (say, a proxy URL appearing) is observed by the very next call —
/// selection is re-evaluated per call, never cached.
#[derive(Clone)]
pub struct EnrichmentGateway {
    config: Arc<RwLock<GatewayConfig>>,
    retry: RetryPolicy,
    client: reqwest::Client,
}

impl EnrichmentGateway {
    pub fn new(config: GatewayConfig, retry: RetryPolicy) -> Self {
        Self::with_shared_config(Arc::new(RwLock::new(config)), retry)
    }

    pub fn with_shared_config(config: Arc<RwLock<GatewayConfig>>, retry: RetryPolicy) -> Self {
        Self {
            config,
            retry,
            client: reqwest::Client::new(),
        }
    }

    /// Handle for runtime configuration changes (e.g. credentials arriving).
    pub fn config_handle(&self) -> Arc<RwLock<GatewayConfig>> {
        self.config.clone()
    }

    fn snapshot(&self) -> GatewayConfig {
        self.config
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Build the provider for this call.  The bool says whether the call
    /// goes through the retry wrapper (the mock cannot fail, so it skips it).
    fn provider_for(&self, config: &GatewayConfig) -> (Box<dyn EnrichmentProvider>, bool) {
        match config.provider_mode() {
            ProviderMode::Proxy => (
                Box::new(ProxyProvider::new(
                    self.client.clone(),
                    config.proxy_base_url.clone(),
                )),
                true,
            ),
            ProviderMode::Direct => (
                Box::new(DirectProvider::new(
                    self.client.clone(),
                    config.api_key.clone(),
                    config.direct_model.clone(),
                )),
                true,
            ),
            ProviderMode::Mock => (Box::new(MockProvider::new(config.mock_seed)), false),
        }
    }

    pub async fn analyze_media(
        &self,
        payload: MediaPayload,
        environment: Option<EnvironmentContext>,
    ) -> Result<AnalysisResult, ApiError> {
        let config = self.snapshot();
        let context = EnrichmentContext::from_config(&config);
        let (provider, retryable) = self.provider_for(&config);
        debug!(provider = provider.name(), "analyze_media");

        if retryable {
            retry(&self.retry, "analyze", || {
                provider.analyze_media(payload.clone(), environment.clone(), context.clone())
            })
            .await
        } else {
            provider.analyze_media(payload, environment, context).await
        }
    }

    pub async fn converse(
        &self,
        history: &[ChatTurn],
        analysis: Option<AnalysisContext>,
        environment: Option<EnvironmentContext>,
    ) -> Result<ChatReply, ApiError> {
        let config = self.snapshot();
        let context = EnrichmentContext::from_config(&config);
        let (provider, retryable) = self.provider_for(&config);
        debug!(provider = provider.name(), turns = history.len(), "converse");

        if retryable {
            retry(&self.retry, "chat", || {
                provider.converse(
                    history.to_vec(),
                    analysis.clone(),
                    environment.clone(),
                    context.clone(),
                )
            })
            .await
        } else {
            provider
                .converse(history.to_vec(), analysis, environment, context)
                .await
        }
    }

    pub async fn summarize(
        &self,
        history: &[ChatTurn],
        analysis: Option<AnalysisContext>,
        environment: Option<EnvironmentContext>,
    ) -> Result<SummaryResult, ApiError> {
        let config = self.snapshot();
        let context = EnrichmentContext::from_config(&config);
        let (provider, retryable) = self.provider_for(&config);
        debug!(provider = provider.name(), "summarize");

        if retryable {
            retry(&self.retry, "summary", || {
                provider.summarize(
                    history.to_vec(),
                    analysis.clone(),
                    environment.clone(),
                    context.clone(),
                )
            })
            .await
        } else {
            provider
                .summarize(history.to_vec(), analysis, environment, context)
                .await
        }
    }

    pub async fn extract_tags(
        &self,
        history: &[ChatTurn],
        analysis: Option<AnalysisContext>,
        existing: &[String],
    ) -> Result<Vec<String>, ApiError> {
        let config = self.snapshot();
        let context = EnrichmentContext::from_config(&config);
        let (provider, retryable) = self.provider_for(&config);
        debug!(provider = provider.name(), existing = existing.len(), "extract_tags");

        let mut tags = if retryable {
            retry(&self.retry, "tags", || {
                provider.extract_tags(
                    history.to_vec(),
                    analysis.clone(),
                    existing.to_vec(),
                    context.clone(),
                )
            })
            .await?
        } else {
            provider
                .extract_tags(history.to_vec(), analysis, existing.to_vec(), context)
                .await?
        };

        tags.truncate(MAX_TAGS);
        Ok(tags)
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
