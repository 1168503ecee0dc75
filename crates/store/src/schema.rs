use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Lifecycle states ──────────────────────────────────────────────────────────

/// Background-pipeline progress of a saved entry.
///
/// | State            | Meaning                                                |
/// |------------------|--------------------------------------------------------|
/// | `CommittedLocal` | Durably written to the draft store, pipeline not begun |
/// | `AiGenerating`   | Enrichment (summary / tags) in flight                  |
/// | `Uploading`      | Sync engine pushing to the remote store                |
/// | `Completed`      | Terminal success                                       |
/// | `Failed`         | Terminal failure, retryable (sync stage only)          |
///
/// Transitions are one-directional except `Failed → Uploading` on retry.
/// Enrichment is never re-entered: results already attached are reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingState {
    CommittedLocal,
    AiGenerating,
    Uploading,
    Completed,
    Failed,
}

impl ProcessingState {
    /// Kebab-case slug used in log lines.
    pub fn slug(self) -> &'static str {
        match self {
            Self::CommittedLocal => "committed-local",
            Self::AiGenerating => "ai-generating",
            Self::Uploading => "uploading",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// A non-terminal state found on disk at startup means the process died
    /// mid-pipeline; such entries are recoverable, not lost.
    pub fn is_interrupted(self) -> bool {
        matches!(self, Self::AiGenerating | Self::Uploading)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Local,
    Syncing,
    Synced,
    Failed,
}

// ── Media ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Photo,
    Video,
}

impl MediaKind {
    /// Slug used in blob storage keys (`entries/{id}/{slug}`).
    pub fn slug(self) -> &'static str {
        match self {
            Self::Photo => "photo",
            Self::Video => "video",
        }
    }
}

/// Reference to the entry's attached media, local and (after sync) remote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaRef {
    pub kind: MediaKind,
    pub local_path: String,
    #[serde(default)]
    pub remote_path: Option<String>,
    #[serde(default)]
    pub remote_url: Option<String>,
    #[serde(default)]
    pub thumbnail_local_path: Option<String>,
    #[serde(default)]
    pub thumbnail_remote_path: Option<String>,
}

impl MediaRef {
    pub fn photo(local_path: impl Into<String>) -> Self {
        Self {
            kind: MediaKind::Photo,
            local_path: local_path.into(),
            remote_path: None,
            remote_url: None,
            thumbnail_local_path: None,
            thumbnail_remote_path: None,
        }
    }
}

// ── Conversation ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
}

/// One turn of the capture-time conversation.  Created during the interactive
/// session, frozen into the snapshot at save time, never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub id: Uuid,
    pub role: MessageRole,
    pub text: String,
    pub sent_at: DateTime<Utc>,
}

impl ConversationMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(MessageRole::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, text)
    }

    fn new(role: MessageRole, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            text: text.into(),
            sent_at: Utc::now(),
        }
    }
}

// ── Enrichment results ────────────────────────────────────────────────────────

/// Media analysis produced once per entry by the enrichment gateway.
/// Immutable once attached; absence is valid and blocks nothing downstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub description: String,
    #[serde(default)]
    pub scene_tags: Vec<String>,
    pub mood: String,
    #[serde(default)]
    pub suggested_opener: Option<String>,
    #[serde(default)]
    pub has_people: bool,
    pub confidence: f32,
}

/// Ambient context captured alongside the media, handed in by the caller.
/// Device capabilities (GPS, weather lookup) are external collaborators.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentContext {
    pub time_of_day: Option<String>,
    pub weather_condition: Option<String>,
    pub temperature_c: Option<f32>,
    pub location_label: Option<String>,
}

// ── Tags ──────────────────────────────────────────────────────────────────────

/// Stable tag identifier.
///
/// `Remote` ids come from the remote vocabulary.  `Local` ids are synthesized
/// when the remote is unreachable during reconciliation so saving is never
/// blocked; they are swapped for remote ids on the next successful sync.
/// The distinction is serialized so pending reconciliation survives a restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagId {
    Remote(Uuid),
    Local(Uuid),
}

impl TagId {
    pub fn local() -> Self {
        Self::Local(Uuid::new_v4())
    }

    pub fn uuid(self) -> Uuid {
        match self {
            Self::Remote(id) | Self::Local(id) => id,
        }
    }

    pub fn is_local(self) -> bool {
        matches!(self, Self::Local(_))
    }
}

/// Name of the sentinel "all/none" filter tag.  Always present in a
/// vocabulary, never deleted, never duplicated.
pub const SENTINEL_TAG_NAME: &str = "All";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub id: TagId,
    /// Case-sensitive unique within one user's vocabulary.
    pub name: String,
    pub position: i64,
    pub is_system: bool,
}

impl Tag {
    /// The well-known sentinel tag.  Fixed id so every device agrees on it.
    pub fn sentinel() -> Self {
        Self {
            id: TagId::Remote(Uuid::from_u128(1)),
            name: SENTINEL_TAG_NAME.to_string(),
            position: 0,
            is_system: true,
        }
    }
}

// ── Entry ─────────────────────────────────────────────────────────────────────

/// The persisted unit of work: one captured memory.
///
/// The id never changes after creation.  `sync_status == Synced` implies the
/// remote store holds a representation with the same id matching the last
/// locally committed snapshot at the time of upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub media: Option<MediaRef>,
    #[serde(default)]
    pub user_text: String,
    /// Ordered, append-only before snapshot; frozen after.
    #[serde(default)]
    pub conversation: Vec<ConversationMessage>,
    #[serde(default)]
    pub analysis: Option<AnalysisResult>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub tag_ids: Vec<TagId>,
    #[serde(default)]
    pub environment: Option<EnvironmentContext>,
    pub processing_state: ProcessingState,
    pub sync_status: SyncStatus,
    #[serde(default)]
    pub last_error: Option<String>,
}

impl Entry {
    pub fn new(id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id,
            created_at: now,
            updated_at: now,
            media: None,
            user_text: String::new(),
            conversation: Vec::new(),
            analysis: None,
            title: None,
            summary: None,
            tag_ids: Vec::new(),
            environment: None,
            processing_state: ProcessingState::CommittedLocal,
            sync_status: SyncStatus::Local,
            last_error: None,
        }
    }

    /// First 8 characters of the UUID, used as a compact display identifier.
    pub fn id_short(&self) -> String {
        self.id.to_string()[..8].to_string()
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// A failed entry retries only the sync stage; enrichment results
    /// already attached are reused.
    pub fn is_retryable(&self) -> bool {
        self.processing_state == ProcessingState::Failed
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
