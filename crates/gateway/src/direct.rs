//! Direct-provider backend: an OpenAI-style chat-completions API driven with
//! per-operation instruction prompts.  The model is asked for JSON, but the
//! decode path never trusts it to comply.

use base64::Engine as _;
use serde_json::json;

use async_trait::async_trait;

use memoir_net::ApiError;
use memoir_store::{AnalysisResult, EnvironmentContext, MediaKind};

use crate::provider::EnrichmentProvider;
use crate::types::{
    tags_from_value, AnalysisContext, ChatReply, ChatTurn, EnrichmentContext, MediaPayload,
    SummaryResult, MAX_TAGS,
};

const COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Per-request deadline; elapsed time maps to [`ApiError::Timeout`].
const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct DirectProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl DirectProvider {
    pub fn new(client: reqwest::Client, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    async fn complete(&self, messages: serde_json::Value) -> Result<String, ApiError> {
        if self.api_key.trim().is_empty() {
            return Err(ApiError::NotConfigured("direct provider credential"));
        }

        let payload = json!({
            "model": self.model,
            "messages": messages,
        });

        let response = self
            .client
            .post(COMPLETIONS_URL)
            .timeout(REQUEST_TIMEOUT)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(ApiError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status.as_u16(), body));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|err| ApiError::MalformedResponse(err.to_string()))?;

        body.get("choices")
            .and_then(|choices| choices.get(0))
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(|content| content.as_str())
            .map(ToString::to_string)
            .ok_or_else(|| ApiError::MalformedResponse("completion missing content".to_string()))
    }

    fn instruction_messages(instruction: String, transcript: String) -> serde_json::Value {
        json!([
            {"role": "system", "content": instruction},
            {"role": "user", "content": transcript},
        ])
    }
}

/// Render history the way the prompts consume it.
fn render_transcript(history: &[ChatTurn]) -> String {
    history
        .iter()
        .map(|turn| {
            let speaker = match turn.role {
                memoir_store::MessageRole::User => "User",
                memoir_store::MessageRole::Assistant => "Assistant",
            };
            format!("{speaker}: {}", turn.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_context(
    analysis: &Option<AnalysisContext>,
    environment: &Option<EnvironmentContext>,
) -> String {
    let mut lines = Vec::new();
    if let Some(analysis) = analysis {
        lines.push(format!(
            "Photo analysis: {} (mood: {}, scene: {})",
            analysis.description,
            analysis.mood,
            analysis.scene_tags.join(", ")
        ));
    }
    if let Some(env) = environment {
        if let Some(time) = &env.time_of_day {
            lines.push(format!("Time of day: {time}"));
        }
        if let Some(weather) = &env.weather_condition {
            lines.push(format!("Weather: {weather}"));
        }
        if let Some(location) = &env.location_label {
            lines.push(format!("Location: {location}"));
        }
    }
    lines.join("\n")
}

/// Extract the first valid JSON value from a completion.
///
/// Strategy 1: fenced ```json blocks.  Strategy 2: first `{`/`[` to its
/// matching last close.  Returns `None` when neither yields valid JSON.
pub fn extract_json_value(response: &str) -> Option<serde_json::Value> {
    if let Some(fence_start) = response.find("```json") {
        let after_fence = &response[fence_start + "```json".len()..];
        if let Some(json_start) = after_fence.find(|c: char| !c.is_whitespace()) {
            let json_body = &after_fence[json_start..];
            if let Some(fence_end) = json_body.find("```") {
                let json_str = json_body[..fence_end].trim();
                if let Ok(val) = serde_json::from_str(json_str) {
                    return Some(val);
                }
            }
        }
    }

    let trimmed = response.trim();
    for (open, close) in [('{', '}'), ('[', ']')] {
        if let Some(start) = trimmed.find(open) {
            if let Some(end) = trimmed.rfind(close) {
                if end > start {
                    let candidate = &trimmed[start..=end];
                    if let Ok(val) = serde_json::from_str(candidate) {
                        return Some(val);
                    }
                }
            }
        }
    }

    None
}

#[async_trait]
impl EnrichmentProvider for DirectProvider {
    fn name(&self) -> &'static str {
        "direct"
    }

    async fn analyze_media(
        &self,
        payload: MediaPayload,
        environment: Option<EnvironmentContext>,
        context: EnrichmentContext,
    ) -> Result<AnalysisResult, ApiError> {
        let mime = match payload.kind {
            MediaKind::Photo => "image/jpeg",
            MediaKind::Video => "video/mp4",
        };
        let encoded = base64::engine::general_purpose::STANDARD.encode(&payload.bytes);
        let instruction = format!(
            "You are a {} photo companion. Analyze the attached media and reply with ONLY a JSON object: \
             {{\"description\": string, \"scene_tags\": [string], \"mood\": string, \
             \"suggested_opener\": string, \"has_people\": bool, \"confidence\": number}}. \
             Respond in language '{}'.",
            context.persona, context.language
        );
        let env_block = render_context(&None, &environment);

        let messages = json!([
            {"role": "system", "content": instruction},
            {"role": "user", "content": [
                {"type": "text", "text": if env_block.is_empty() { "Analyze this.".to_string() } else { env_block }},
                {"type": "image_url", "image_url": {"url": format!("data:{mime};base64,{encoded}")}},
            ]},
        ]);

        let completion = self.complete(messages).await?;
        let value = extract_json_value(&completion).ok_or_else(|| {
            ApiError::MalformedResponse("analysis completion carried no JSON".to_string())
        })?;
        serde_json::from_value(value).map_err(|err| ApiError::MalformedResponse(err.to_string()))
    }

    async fn converse(
        &self,
        history: Vec<ChatTurn>,
        analysis: Option<AnalysisContext>,
        environment: Option<EnvironmentContext>,
        context: EnrichmentContext,
    ) -> Result<ChatReply, ApiError> {
        let instruction = format!(
            "You are a {} companion helping someone capture a memory. Reply in language '{}'. \
             Prefer ONLY a JSON object {{\"reply\": string, \"follow_ups\": [string], \
             \"suggested_topics\": [string], \"tone_tags\": [string], \"safety_note\": string|null}} \
             with at most 2 follow_ups and 3 suggested_topics.",
            context.persona, context.language
        );
        let mut transcript = render_context(&analysis, &environment);
        if !transcript.is_empty() {
            transcript.push_str("\n\n");
        }
        transcript.push_str(&render_transcript(&history));

        let completion = self
            .complete(Self::instruction_messages(instruction, transcript))
            .await?;

        // The model may ignore the schema; a bare completion is still a reply.
        match extract_json_value(&completion) {
            Some(value) => ChatReply::from_value(value),
            None if completion.trim().is_empty() => Err(ApiError::MalformedResponse(
                "empty chat completion".to_string(),
            )),
            None => Ok(ChatReply::from_text(completion.trim())),
        }
    }

    async fn summarize(
        &self,
        history: Vec<ChatTurn>,
        analysis: Option<AnalysisContext>,
        environment: Option<EnvironmentContext>,
        context: EnrichmentContext,
    ) -> Result<SummaryResult, ApiError> {
        let instruction = format!(
            "Summarize this captured memory in language '{}'. Reply with ONLY a JSON object \
             {{\"title\": string, \"narrative\": string}}. The title is at most 6 words; the \
             narrative is 2-3 first-person sentences.",
            context.language
        );
        let mut transcript = render_context(&analysis, &environment);
        if !transcript.is_empty() {
            transcript.push_str("\n\n");
        }
        transcript.push_str(&render_transcript(&history));

        let completion = self
            .complete(Self::instruction_messages(instruction, transcript))
            .await?;
        let value = extract_json_value(&completion).ok_or_else(|| {
            ApiError::MalformedResponse("summary completion carried no JSON".to_string())
        })?;
        serde_json::from_value(value).map_err(|err| ApiError::MalformedResponse(err.to_string()))
    }

    async fn extract_tags(
        &self,
        history: Vec<ChatTurn>,
        analysis: Option<AnalysisContext>,
        existing: Vec<String>,
        context: EnrichmentContext,
    ) -> Result<Vec<String>, ApiError> {
        let instruction = format!(
            "Pick at most {MAX_TAGS} short classification tags for this memory in language '{}'. \
             Reuse names from this existing vocabulary whenever one fits: [{}]. \
             Reply with ONLY a JSON array of strings.",
            context.language,
            existing.join(", ")
        );
        let mut transcript = render_context(&analysis, &None);
        if !transcript.is_empty() {
            transcript.push_str("\n\n");
        }
        transcript.push_str(&render_transcript(&history));

        let completion = self
            .complete(Self::instruction_messages(instruction, transcript))
            .await?;
        let value = extract_json_value(&completion).ok_or_else(|| {
            ApiError::MalformedResponse("tags completion carried no JSON".to_string())
        })?;
        tags_from_value(value)
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
