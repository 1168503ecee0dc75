use bytes::Bytes;
use serde::{Deserialize, Serialize};

use memoir_config::GatewayConfig;
use memoir_net::ApiError;
use memoir_store::{AnalysisResult, ConversationMessage, MediaKind, MessageRole};

/// Follow-up questions carried on a chat reply are capped at 2.
pub const MAX_FOLLOW_UPS: usize = 2;
/// Suggested topics carried on a chat reply are capped at 3.
pub const MAX_SUGGESTED_TOPICS: usize = 3;
/// Tag extraction returns at most 3 names.
pub const MAX_TAGS: usize = 3;

// ── Request side ──────────────────────────────────────────────────────────────

/// One role/content pair of conversation history as sent over the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: MessageRole,
    pub content: String,
}

impl From<&ConversationMessage> for ChatTurn {
    fn from(message: &ConversationMessage) -> Self {
        Self {
            role: message.role,
            content: message.text.clone(),
        }
    }
}

/// Compact analysis context derived from a stored [`AnalysisResult`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisContext {
    pub description: String,
    #[serde(default)]
    pub scene_tags: Vec<String>,
    pub mood: String,
    #[serde(default)]
    pub has_people: bool,
}

impl From<&AnalysisResult> for AnalysisContext {
    fn from(analysis: &AnalysisResult) -> Self {
        Self {
            description: analysis.description.clone(),
            scene_tags: analysis.scene_tags.clone(),
            mood: analysis.mood.clone(),
            has_people: analysis.has_people,
        }
    }
}

/// Per-request style and entitlement selectors, read from configuration at
/// call time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentContext {
    pub persona: String,
    pub language: String,
    pub premium: bool,
}

impl EnrichmentContext {
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            persona: config.persona.clone(),
            language: config.language.clone(),
            premium: config.premium,
        }
    }
}

/// Finished media payload handed in by the capture surface.
#[derive(Debug, Clone)]
pub struct MediaPayload {
    pub kind: MediaKind,
    pub bytes: Bytes,
}

impl MediaPayload {
    pub fn photo(bytes: impl Into<Bytes>) -> Self {
        Self {
            kind: MediaKind::Photo,
            bytes: bytes.into(),
        }
    }
}

// ── Response side ─────────────────────────────────────────────────────────────

/// Structured conversational reply.
///
/// Providers are asked for this shape but are not trusted to produce it; see
/// [`ChatReply::from_value`] for the fallback path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatReply {
    pub reply: String,
    pub follow_ups: Vec<String>,
    pub suggested_topics: Vec<String>,
    pub tone_tags: Vec<String>,
    pub safety_note: Option<String>,
}

impl ChatReply {
    /// Wrap a bare text reply in the structured shape.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            reply: text.into(),
            ..Self::default()
        }
    }

    /// Decode a provider response that is either the structured object or a
    /// bare JSON string.  Accommodates providers that ignore the requested
    /// schema; only when both shapes fail is the response malformed.
    pub fn from_value(value: serde_json::Value) -> Result<Self, ApiError> {
        match value {
            serde_json::Value::String(text) if !text.trim().is_empty() => {
                Ok(Self::from_text(text).capped())
            }
            serde_json::Value::Object(ref map) => {
                let mut reply: Self = serde_json::from_value(value.clone())
                    .map_err(|err| ApiError::MalformedResponse(err.to_string()))?;
                if reply.reply.trim().is_empty() {
                    // Providers occasionally rename the primary field.
                    for key in ["text", "message", "content"] {
                        if let Some(text) = map.get(key).and_then(|v| v.as_str()) {
                            reply.reply = text.to_string();
                            break;
                        }
                    }
                }
                if reply.reply.trim().is_empty() {
                    return Err(ApiError::MalformedResponse(
                        "chat response carried no reply text".to_string(),
                    ));
                }
                Ok(reply.capped())
            }
            other => Err(ApiError::MalformedResponse(format!(
                "unexpected chat response shape: {other}"
            ))),
        }
    }

    /// Enforce the wire caps on list fields.
    pub fn capped(mut self) -> Self {
        self.follow_ups.truncate(MAX_FOLLOW_UPS);
        self.suggested_topics.truncate(MAX_SUGGESTED_TOPICS);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryResult {
    pub title: String,
    pub narrative: String,
}

/// Decode a tags response that is either a bare array or `{"tags": [...]}`.
pub fn tags_from_value(value: serde_json::Value) -> Result<Vec<String>, ApiError> {
    let names = match value {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(mut map) => match map.remove("tags") {
            Some(serde_json::Value::Array(items)) => items,
            _ => {
                return Err(ApiError::MalformedResponse(
                    "tags response missing array".to_string(),
                ))
            }
        },
        other => {
            return Err(ApiError::MalformedResponse(format!(
                "unexpected tags response shape: {other}"
            )))
        }
    };

    let mut tags: Vec<String> = names
        .into_iter()
        .filter_map(|v| match v {
            serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            _ => None,
        })
        .collect();
    tags.truncate(MAX_TAGS);
    Ok(tags)
}

// ── Tests ────────────────────────────────────────────────────────────────────
