use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use memoir_net::ApiError;
use memoir_store::{Entry, MediaKind};

use crate::remote::{EntryRecord, MessageRecord, RemoteStore};

/// Result of one upload pass.
///
/// Carries the remote paths/urls to write back to the entry and the first
/// error encountered.  Steps after a failed one still run; retry re-attempts
/// every step since all of them are idempotent.
#[derive(Debug, Default)]
pub struct SyncOutcome {
    pub media_remote_path: Option<String>,
    pub media_remote_url: Option<String>,
    pub thumbnail_remote_path: Option<String>,
    pub first_error: Option<ApiError>,
}

impl SyncOutcome {
    pub fn is_success(&self) -> bool {
        self.first_error.is_none()
    }

    fn record_error(&mut self, step: &'static str, err: ApiError) {
        warn!(step, error = %err, "sync step failed");
        if self.first_error.is_none() {
            self.first_error = Some(err);
        }
    }
}

pub struct SyncEngine {
    remote: Arc<dyn RemoteStore>,
}

impl SyncEngine {
    pub fn new(remote: Arc<dyn RemoteStore>) -> Self {
        Self { remote }
    }

    pub fn remote(&self) -> Arc<dyn RemoteStore> {
        self.remote.clone()
    }

    /// Blob storage key for an entry's media: stable across retries, so
    /// re-uploads overwrite rather than duplicate.
    fn blob_key(entry: &Entry, kind: MediaKind, thumbnail: bool) -> String {
        if thumbnail {
            format!("entries/{}/{}-thumb", entry.id, kind.slug())
        } else {
            format!("entries/{}/{}", entry.id, kind.slug())
        }
    }

    /// Upload media, metadata, conversation log, and tag associations.
    ///
    /// Media failure does not abort the metadata write; the outcome carries
    /// the first failure and the entry stays retryable.
    pub async fn upload(&self, entry: &Entry) -> SyncOutcome {
        let mut outcome = SyncOutcome::default();

        // 1. blobs
        if let Some(media) = &entry.media {
            let key = Self::blob_key(entry, media.kind, false);
            match self.upload_file(&key, &media.local_path).await {
                Ok(url) => {
                    outcome.media_remote_path = Some(key);
                    outcome.media_remote_url = Some(url);
                }
                Err(err) => outcome.record_error("media", err),
            }

            if let Some(thumb_path) = &media.thumbnail_local_path {
                let key = Self::blob_key(entry, media.kind, true);
                match self.upload_file(&key, thumb_path).await {
                    Ok(_) => outcome.thumbnail_remote_path = Some(key),
                    Err(err) => outcome.record_error("thumbnail", err),
                }
            }
        }

        // 2. metadata upsert (merge-on-conflict by entry id)
        let mut record = EntryRecord::from_entry(entry);
        if outcome.media_remote_path.is_some() {
            record.media_remote_path = outcome.media_remote_path.clone();
        }
        if outcome.media_remote_url.is_some() {
            record.media_remote_url = outcome.media_remote_url.clone();
        }
        if outcome.thumbnail_remote_path.is_some() {
            record.thumbnail_remote_path = outcome.thumbnail_remote_path.clone();
        }
        if let Err(err) = self.remote.upsert_entry(record).await {
            outcome.record_error("metadata", err);
        }

        // 3. conversation log, fully replacing
        let messages: Vec<MessageRecord> =
            entry.conversation.iter().map(MessageRecord::from).collect();
        if let Err(err) = self.remote.replace_messages(entry.id, messages).await {
            outcome.record_error("messages", err);
        }

        // 4. tag associations, fully replacing
        if let Err(err) = self
            .remote
            .replace_tag_links(entry.id, entry.tag_ids.clone())
            .await
        {
            outcome.record_error("tags", err);
        }

        if outcome.is_success() {
            info!(entry = %entry.id_short(), "entry uploaded");
        }
        outcome
    }

    async fn upload_file(&self, key: &str, path: &str) -> Result<String, ApiError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|err| ApiError::LocalPersistence(format!("reading {path}: {err}")))?;

        let digest = format!("{:x}", Sha256::digest(&bytes));
        debug!(key, digest = %digest[..12], size = bytes.len(), "uploading blob");

        self.remote.upload_blob(key, bytes.into()).await
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
