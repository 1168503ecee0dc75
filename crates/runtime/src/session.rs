use tracing::debug;
use uuid::Uuid;

use memoir_gateway::{AnalysisContext, ChatReply, ChatTurn, EnrichmentGateway};
use memoir_net::ApiError;
use memoir_store::{
    AnalysisResult, ConversationMessage, EnvironmentContext, MediaRef,
};

/// Interactive-session progression, before any save.
///
/// `Idle → Capturing` when media is attached and a draft id is assigned;
/// `Capturing → Conversing` once chat turns accumulate.  Save freezes the
/// session into a snapshot and returns it to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Capturing,
    Conversing,
}

/// Immutable copy of session state taken at save time; the sole input to the
/// background pipeline.  Nothing mutates a snapshot after capture.
#[derive(Debug, Clone)]
pub struct EntrySnapshot {
    pub entry_id: Uuid,
    pub user_text: String,
    pub conversation: Vec<ConversationMessage>,
    pub analysis: Option<AnalysisResult>,
    pub environment: Option<EnvironmentContext>,
    pub media: Option<MediaRef>,
}

/// Mutable state of the one interactive capture surface.
///
/// Exclusively owned by the interactive context; background tasks never see
/// it — they get an [`EntrySnapshot`].
#[derive(Debug, Default)]
pub struct CaptureSession {
    state: Option<ActiveSession>,
    /// Last chat input that failed to send, preserved for immediate retry.
    pending_input: Option<String>,
}

#[derive(Debug)]
struct ActiveSession {
    entry_id: Uuid,
    media: Option<MediaRef>,
    environment: Option<EnvironmentContext>,
    user_text: String,
    conversation: Vec<ConversationMessage>,
    analysis: Option<AnalysisResult>,
}

impl CaptureSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SessionState {
        match &self.state {
            None => SessionState::Idle,
            Some(active) if active.conversation.is_empty() => SessionState::Capturing,
            Some(_) => SessionState::Conversing,
        }
    }

    /// Start a new draft.  Assigns the entry identifier that stays stable
    /// for the rest of the entry's life.
    pub fn begin_capture(
        &mut self,
        media: Option<MediaRef>,
        environment: Option<EnvironmentContext>,
    ) -> Uuid {
        let entry_id = Uuid::new_v4();
        debug!(entry = %entry_id, "capture started");
        self.state = Some(ActiveSession {
            entry_id,
            media,
            environment,
            user_text: String::new(),
            conversation: Vec::new(),
            analysis: None,
        });
        self.pending_input = None;
        entry_id
    }

    pub fn entry_id(&self) -> Option<Uuid> {
        self.state.as_ref().map(|active| active.entry_id)
    }

    pub fn set_user_text(&mut self, text: impl Into<String>) {
        if let Some(active) = &mut self.state {
            active.user_text = text.into();
        }
    }

    pub fn attach_analysis(&mut self, analysis: AnalysisResult) {
        if let Some(active) = &mut self.state {
            active.analysis = Some(analysis);
        }
    }

    pub fn analysis(&self) -> Option<&AnalysisResult> {
        self.state.as_ref().and_then(|active| active.analysis.as_ref())
    }

    /// Append-only; messages are never mutated once added.
    pub fn append_user_message(&mut self, text: impl Into<String>) {
        if let Some(active) = &mut self.state {
            active.conversation.push(ConversationMessage::user(text));
        }
    }

    pub fn append_assistant_message(&mut self, text: impl Into<String>) {
        if let Some(active) = &mut self.state {
            active.conversation.push(ConversationMessage::assistant(text));
        }
    }

    pub fn conversation(&self) -> &[ConversationMessage] {
        self.state
            .as_ref()
            .map(|active| active.conversation.as_slice())
            .unwrap_or(&[])
    }

    /// Input that failed to send in [`CaptureSession::converse`], kept so the
    /// surface can offer an immediate retry instead of discarding the text.
    pub fn pending_input(&self) -> Option<&str> {
        self.pending_input.as_deref()
    }

    /// One live chat turn: send `input` plus the history to the gateway and
    /// append both sides on success.
    ///
    /// On failure nothing is appended; the input is preserved in
    /// [`CaptureSession::pending_input`] and the typed error is returned so
    /// the surface can present a retry affordance.
    pub async fn converse(
        &mut self,
        gateway: &EnrichmentGateway,
        input: impl Into<String>,
    ) -> Result<ChatReply, ApiError> {
        let input = input.into();
        let (history, analysis, environment) = match &self.state {
            Some(active) => {
                let mut history: Vec<ChatTurn> =
                    active.conversation.iter().map(ChatTurn::from).collect();
                history.push(ChatTurn {
                    role: memoir_store::MessageRole::User,
                    content: input.clone(),
                });
                (
                    history,
                    active.analysis.as_ref().map(AnalysisContext::from),
                    active.environment.clone(),
                )
            }
            None => {
                return Err(ApiError::NotConfigured("no active capture session"));
            }
        };

        match gateway.converse(&history, analysis, environment).await {
            Ok(reply) => {
                self.pending_input = None;
                self.append_user_message(input);
                self.append_assistant_message(reply.reply.clone());
                Ok(reply)
            }
            Err(err) => {
                self.pending_input = Some(input);
                Err(err)
            }
        }
    }

    /// Whether there is anything worth saving.
    pub fn has_content(&self) -> bool {
        match &self.state {
            None => false,
            Some(active) => {
                active.media.is_some()
                    || !active.user_text.trim().is_empty()
                    || !active.conversation.is_empty()
            }
        }
    }

    /// Freeze the current state into an immutable snapshot.  The session
    /// itself is untouched; the coordinator clears it after the local commit
    /// succeeds.
    pub fn snapshot(&self) -> Option<EntrySnapshot> {
        self.state.as_ref().map(|active| EntrySnapshot {
            entry_id: active.entry_id,
            user_text: active.user_text.clone(),
            conversation: active.conversation.clone(),
            analysis: active.analysis.clone(),
            environment: active.environment.clone(),
            media: active.media.clone(),
        })
    }

    /// Return to `Idle` so the surface can be reused immediately.
    pub fn reset(&mut self) {
        self.state = None;
        self.pending_input = None;
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use memoir_config::GatewayConfig;
    use memoir_net::RetryPolicy;
    use std::time::Duration;

    fn mock_gateway() -> EnrichmentGateway {
        let retry = RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        };
        EnrichmentGateway::new(GatewayConfig::default(), retry)
    }

    #[test]
    fn session_walks_idle_capturing_conversing() {
        let mut session = CaptureSession::new();
        assert_eq!(session.state(), SessionState::Idle);
        assert!(!session.has_content());

        session.begin_capture(Some(MediaRef::photo("/tmp/a.jpg")), None);
        assert_eq!(session.state(), SessionState::Capturing);
        assert!(session.has_content());

        session.append_user_message("hello");
        assert_eq!(session.state(), SessionState::Conversing);

        session.reset();
        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.entry_id().is_none());
    }

    #[test]
    fn snapshot_captures_everything_and_detaches() {
        let mut session = CaptureSession::new();
        let id = session.begin_capture(Some(MediaRef::photo("/tmp/a.jpg")), None);
        session.set_user_text("a walk");
        session.append_user_message("first");

        let snapshot = session.snapshot().unwrap();
        assert_eq!(snapshot.entry_id, id);
        assert_eq!(snapshot.user_text, "a walk");
        assert_eq!(snapshot.conversation.len(), 1);

        // Later session mutations don't touch the snapshot.
        session.append_user_message("second");
        assert_eq!(snapshot.conversation.len(), 1);
    }

    #[test]
    fn snapshot_of_idle_session_is_none() {
        let session = CaptureSession::new();
        assert!(session.snapshot().is_none());
    }

    #[tokio::test]
    async fn converse_appends_both_turns() {
        let gateway = mock_gateway();
        let mut session = CaptureSession::new();
        session.begin_capture(None, None);

        let reply = session.converse(&gateway, "dinner was great").await.unwrap();
        assert!(!reply.reply.is_empty());
        assert_eq!(session.conversation().len(), 2);
        assert_eq!(session.conversation()[0].text, "dinner was great");
        assert!(session.pending_input().is_none());
    }

    #[tokio::test]
    async fn converse_failure_preserves_unsent_input() {
        let gateway = mock_gateway();
        {
            let handle = gateway.config_handle();
            let mut config = handle.write().unwrap();
            config.proxy_base_url = "http://127.0.0.1:9".to_string();
        }
        let mut session = CaptureSession::new();
        session.begin_capture(None, None);

        let result = session.converse(&gateway, "will not send").await;
        assert!(result.is_err());
        assert_eq!(session.pending_input(), Some("will not send"));
        // Nothing was appended.
        assert!(session.conversation().is_empty());
    }

    #[tokio::test]
    async fn converse_without_capture_is_rejected() {
        let gateway = mock_gateway();
        let mut session = CaptureSession::new();
        assert!(session.converse(&gateway, "hi").await.is_err());
    }
}
