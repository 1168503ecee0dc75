use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use async_trait::async_trait;

use memoir_config::SyncConfig;
use memoir_net::ApiError;
use memoir_store::{
    AnalysisResult, ConversationMessage, Entry, EnvironmentContext, MessageRole, Tag, TagId,
};
use memoir_tags::TagDirectory;

// ── Wire records ──────────────────────────────────────────────────────────────

/// Remote shape of an entry.  Local-only fields (processing state, local
/// paths, sync status) never cross the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryRecord {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub user_text: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub media_remote_path: Option<String>,
    #[serde(default)]
    pub media_remote_url: Option<String>,
    #[serde(default)]
    pub thumbnail_remote_path: Option<String>,
    #[serde(default)]
    pub analysis: Option<AnalysisResult>,
    #[serde(default)]
    pub environment: Option<EnvironmentContext>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: Uuid,
    pub role: MessageRole,
    pub text: String,
    pub sent_at: DateTime<Utc>,
}

impl From<&ConversationMessage> for MessageRecord {
    fn from(message: &ConversationMessage) -> Self {
        Self {
            id: message.id,
            role: message.role,
            text: message.text.clone(),
            sent_at: message.sent_at,
        }
    }
}

/// Remote wire shape of a tag; ids on the wire are always remote-scoped.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TagRecord {
    id: Uuid,
    name: String,
    #[serde(default)]
    position: i64,
    #[serde(default)]
    is_system: bool,
}

impl From<TagRecord> for Tag {
    fn from(record: TagRecord) -> Self {
        Self {
            id: TagId::Remote(record.id),
            name: record.name,
            position: record.position,
            is_system: record.is_system,
        }
    }
}

// ── RemoteStore contract ──────────────────────────────────────────────────────

/// The remote operations the sync engine issues, scoped to the
/// authenticated caller's own data.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Idempotent by `key`: re-uploading the same content to the same key is
    /// safe.  Returns the public URL of the stored blob.
    async fn upload_blob(&self, key: &str, bytes: Bytes) -> Result<String, ApiError>;

    /// Merge-on-conflict write keyed by `record.id`.
    async fn upsert_entry(&self, record: EntryRecord) -> Result<(), ApiError>;

    /// Fully-replacing write (delete-then-insert) scoped to `entry_id`.
    async fn replace_messages(
        &self,
        entry_id: Uuid,
        messages: Vec<MessageRecord>,
    ) -> Result<(), ApiError>;

    /// Fully-replacing write scoped to `entry_id`.  Locally-scoped tag ids
    /// are not yet known remotely and are skipped by implementations.
    async fn replace_tag_links(&self, entry_id: Uuid, tag_ids: Vec<TagId>) -> Result<(), ApiError>;

    /// Atomic from the caller's point of view: no duplicate is created under
    /// concurrent calls for the same name.
    async fn find_or_create_tag(&self, name: &str) -> Result<Tag, ApiError>;

    async fn list_tags(&self) -> Result<Vec<Tag>, ApiError>;
}

/// [`TagDirectory`] view over a remote store, for the reconciler.
#[derive(Clone)]
pub struct RemoteTagDirectory(pub Arc<dyn RemoteStore>);

#[async_trait]
impl TagDirectory for RemoteTagDirectory {
    async fn find_or_create(&self, name: &str) -> Result<Tag, ApiError> {
        self.0.find_or_create_tag(name).await
    }

    async fn list(&self) -> Result<Vec<Tag>, ApiError> {
        self.0.list_tags().await
    }
}

// ── HTTP implementation ───────────────────────────────────────────────────────

pub struct HttpRemoteStore {
    client: reqwest::Client,
    base_url: String,
    auth_token: String,
    timeout: Duration,
}

impl HttpRemoteStore {
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.remote_base_url.trim_end_matches('/').to_string(),
            auth_token: config.auth_token.clone(),
            timeout: Duration::from_secs(config.request_timeout_secs.max(1)),
        }
    }

    fn endpoint(&self, path: &str) -> Result<String, ApiError> {
        if self.base_url.is_empty() {
            return Err(ApiError::NotConfigured("remote store base url"));
        }
        Ok(format!("{}/{path}", self.base_url))
    }

    async fn send_json(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<serde_json::Value, ApiError> {
        let response = builder
            .timeout(self.timeout)
            .bearer_auth(&self.auth_token)
            .send()
            .await
            .map_err(ApiError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status.as_u16(), body));
        }

        if status == reqwest::StatusCode::NO_CONTENT {
            return Ok(serde_json::Value::Null);
        }
        response
            .json()
            .await
            .map_err(|err| ApiError::MalformedResponse(err.to_string()))
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn upload_blob(&self, key: &str, bytes: Bytes) -> Result<String, ApiError> {
        let endpoint = self.endpoint(&format!("blobs/{key}"))?;
        let value = self
            .send_json(
                self.client
                    .put(&endpoint)
                    .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
                    .body(bytes),
            )
            .await?;

        // Servers answer `{"url": ...}`; older deployments answer 204 and the
        // blob is addressable at its key.
        Ok(value
            .get("url")
            .and_then(|url| url.as_str())
            .map(ToString::to_string)
            .unwrap_or(endpoint))
    }

    async fn upsert_entry(&self, record: EntryRecord) -> Result<(), ApiError> {
        let endpoint = self.endpoint(&format!("entries/{}", record.id))?;
        self.send_json(self.client.put(&endpoint).json(&record))
            .await?;
        Ok(())
    }

    async fn replace_messages(
        &self,
        entry_id: Uuid,
        messages: Vec<MessageRecord>,
    ) -> Result<(), ApiError> {
        let endpoint = self.endpoint(&format!("entries/{entry_id}/messages"))?;
        self.send_json(self.client.put(&endpoint).json(&messages))
            .await?;
        Ok(())
    }

    async fn replace_tag_links(&self, entry_id: Uuid, tag_ids: Vec<TagId>) -> Result<(), ApiError> {
        let ids: Vec<Uuid> = tag_ids
            .into_iter()
            .filter(|id| !id.is_local())
            .map(TagId::uuid)
            .collect();
        let endpoint = self.endpoint(&format!("entries/{entry_id}/tags"))?;
        self.send_json(
            self.client
                .put(&endpoint)
                .json(&serde_json::json!({ "tag_ids": ids })),
        )
        .await?;
        Ok(())
    }

    async fn find_or_create_tag(&self, name: &str) -> Result<Tag, ApiError> {
        let endpoint = self.endpoint("tags/find-or-create")?;
        let value = self
            .send_json(
                self.client
                    .post(&endpoint)
                    .json(&serde_json::json!({ "name": name })),
            )
            .await?;
        let record: TagRecord = serde_json::from_value(value)
            .map_err(|err| ApiError::MalformedResponse(err.to_string()))?;
        Ok(record.into())
    }

    async fn list_tags(&self) -> Result<Vec<Tag>, ApiError> {
        let endpoint = self.endpoint("tags")?;
        let value = self.send_json(self.client.get(&endpoint)).await?;
        let records: Vec<TagRecord> = serde_json::from_value(value)
            .map_err(|err| ApiError::MalformedResponse(err.to_string()))?;
        Ok(records.into_iter().map(Tag::from).collect())
    }
}

impl EntryRecord {
    /// Project an [`Entry`] into its remote shape.  Remote media fields come
    /// from the entry itself (already written back by a previous sync) unless
    /// the caller supplies fresher values.
    pub fn from_entry(entry: &Entry) -> Self {
        Self {
            id: entry.id,
            created_at: entry.created_at,
            updated_at: entry.updated_at,
            user_text: entry.user_text.clone(),
            title: entry.title.clone(),
            summary: entry.summary.clone(),
            media_remote_path: entry.media.as_ref().and_then(|m| m.remote_path.clone()),
            media_remote_url: entry.media.as_ref().and_then(|m| m.remote_url.clone()),
            thumbnail_remote_path: entry
                .media
                .as_ref()
                .and_then(|m| m.thumbnail_remote_path.clone()),
            analysis: entry.analysis.clone(),
            environment: entry.environment.clone(),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
