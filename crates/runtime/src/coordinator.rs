use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex as StdMutex};

use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use memoir_config::AppConfig;
use memoir_gateway::EnrichmentGateway;
use memoir_net::RetryPolicy;
use memoir_store::{DraftStore, Entry, ProcessingState, StoreError, SyncStatus};
use memoir_sync::{HttpRemoteStore, RemoteStore, SyncEngine};
use memoir_tags::{TagReconciler, TagVocabulary};

use crate::pipeline::{self, PipelineContext};
use crate::projection::ProjectionHandle;
use crate::session::CaptureSession;

#[derive(Debug, Error)]
pub enum SaveError {
    #[error("local persistence failure: {0}")]
    Store(#[from] StoreError),
    #[error("a background task is already running for entry {0}")]
    AlreadyInFlight(Uuid),
    #[error("entry {0} is not in a failed state")]
    NotFailed(Uuid),
    #[error("unknown entry {0}")]
    UnknownEntry(Uuid),
    #[error("nothing to save: session holds no content")]
    EmptySession,
}

/// Removes its entry id from the in-flight set on drop, so the slot is
/// released even when a pipeline task panics.
struct InFlightGuard {
    set: Arc<StdMutex<HashSet<Uuid>>>,
    id: Uuid,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&self.id);
    }
}

/// Orchestrates the entry lifecycle: two-phase save, retry, and startup
/// recovery.
///
/// Constructed once at startup with its collaborators injected; there are no
/// global instances.  Guarantees at most one background pipeline task per
/// entry identifier at any time.
pub struct EntryCoordinator {
    store: Arc<DraftStore>,
    gateway: EnrichmentGateway,
    sync: Arc<SyncEngine>,
    projection: ProjectionHandle,
    reconciler: TagReconciler,
    vocabulary: Arc<tokio::sync::Mutex<TagVocabulary>>,
    in_flight: Arc<StdMutex<HashSet<Uuid>>>,
}

impl EntryCoordinator {
    pub fn new(
        store: Arc<DraftStore>,
        gateway: EnrichmentGateway,
        remote: Arc<dyn RemoteStore>,
        projection: ProjectionHandle,
    ) -> Self {
        Self {
            store,
            gateway,
            sync: Arc::new(SyncEngine::new(remote)),
            projection,
            reconciler: TagReconciler::new(),
            vocabulary: Arc::new(tokio::sync::Mutex::new(TagVocabulary::with_sentinel())),
            in_flight: Arc::new(StdMutex::new(HashSet::new())),
        }
    }

    /// Wire the default collaborators from configuration: redb store under
    /// the data dir, gateway with the configured retry policy, HTTP remote.
    pub fn bootstrap(config: &AppConfig, projection: ProjectionHandle) -> Result<Self, StoreError> {
        let store = Arc::new(DraftStore::open(
            Path::new(&config.store.data_dir).join("drafts.redb"),
        )?);
        let gateway =
            EnrichmentGateway::new(config.gateway.clone(), RetryPolicy::from(&config.retry));
        let remote: Arc<dyn RemoteStore> = Arc::new(HttpRemoteStore::new(&config.sync));
        Ok(Self::new(store, gateway, remote, projection))
    }

    pub fn gateway(&self) -> &EnrichmentGateway {
        &self.gateway
    }

    pub fn projection(&self) -> &ProjectionHandle {
        &self.projection
    }

    pub fn entry(&self, id: Uuid) -> Result<Option<Entry>, StoreError> {
        self.store.load(id)
    }

    pub fn entries(&self) -> Result<Vec<Entry>, StoreError> {
        self.store.load_all()
    }

    fn claim(&self, id: Uuid) -> Result<InFlightGuard, SaveError> {
        let mut set = self
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !set.insert(id) {
            return Err(SaveError::AlreadyInFlight(id));
        }
        Ok(InFlightGuard {
            set: self.in_flight.clone(),
            id,
        })
    }

    fn is_in_flight(&self, id: Uuid) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(&id)
    }

    /// Phase 1 of the two-phase save.  Synchronous with respect to the
    /// network: freezes the session into a snapshot, commits it to the draft
    /// store, projects it optimistically, clears the session, and schedules
    /// the detached background pipeline.  Returns before any network call.
    ///
    /// A failure here is surfaced to the caller — the user must know
    /// immediately if their content could not be durably captured.  Every
    /// later failure lands on the entry instead.
    pub fn save(&self, session: &mut CaptureSession) -> Result<Uuid, SaveError> {
        if !session.has_content() {
            return Err(SaveError::EmptySession);
        }
        let snapshot = session.snapshot().ok_or(SaveError::EmptySession)?;
        let id = snapshot.entry_id;

        // Claim the slot first: a concurrent save/retry for this id is
        // rejected, never run in parallel.
        let guard = self.claim(id)?;

        let mut entry = self.store.load(id)?.unwrap_or_else(|| Entry::new(id));
        entry.user_text = snapshot.user_text.clone();
        entry.conversation = snapshot.conversation.clone();
        entry.analysis = snapshot.analysis.clone();
        entry.environment = snapshot.environment.clone();
        if entry.media.is_none() {
            entry.media = snapshot.media.clone();
        }

        let enrich = !entry.conversation.is_empty();
        entry.processing_state = if enrich {
            ProcessingState::AiGenerating
        } else {
            ProcessingState::Uploading
        };
        entry.sync_status = SyncStatus::Local;
        entry.last_error = None;
        entry.touch();

        self.store.save(&entry)?;
        self.projection.upsert(entry.clone());
        session.reset();

        info!(entry = %entry.id_short(), enrich, "entry committed locally; pipeline scheduled");
        self.spawn_pipeline(entry, enrich, guard);
        Ok(id)
    }

    /// Re-enter the pipeline for a failed entry.
    ///
    /// Only the sync stage runs again — enrichment results already attached
    /// are reused, never regenerated.
    pub fn retry(&self, id: Uuid) -> Result<(), SaveError> {
        let guard = self.claim(id)?;

        let entry = self.store.load(id)?.ok_or(SaveError::UnknownEntry(id))?;
        if !entry.is_retryable() {
            return Err(SaveError::NotFailed(id));
        }

        info!(entry = %entry.id_short(), "retrying sync stage");
        self.spawn_pipeline(entry, false, guard);
        Ok(())
    }

    /// Startup scan: seed the projection from the draft store and turn
    /// entries stranded mid-pipeline by a dead process into retryable
    /// failures.  Returns the ids that were recovered.
    pub fn recover(&self) -> Result<Vec<Uuid>, StoreError> {
        let mut recovered = Vec::new();
        for entry in self.store.load_all()? {
            if entry.processing_state.is_interrupted() && !self.is_in_flight(entry.id) {
                let updated = self.store.update(entry.id, |e| {
                    e.processing_state = ProcessingState::Failed;
                    e.sync_status = SyncStatus::Failed;
                    e.last_error = Some("interrupted before completion".to_string());
                })?;
                if let Some(updated) = updated {
                    info!(entry = %updated.id_short(), "recovered interrupted entry");
                    self.projection.upsert(updated);
                    recovered.push(entry.id);
                }
            } else {
                self.projection.upsert(entry);
            }
        }
        Ok(recovered)
    }

    fn spawn_pipeline(&self, entry: Entry, enrich: bool, guard: InFlightGuard) {
        let ctx = PipelineContext {
            store: self.store.clone(),
            gateway: self.gateway.clone(),
            sync: self.sync.clone(),
            projection: self.projection.clone(),
            reconciler: self.reconciler,
            vocabulary: self.vocabulary.clone(),
        };
        // Detached: the task outlives the interactive context that spawned
        // it and reports back only through the store and the projection.
        tokio::spawn(async move {
            let _guard = guard;
            pipeline::run(ctx, entry, enrich).await;
        });
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use memoir_config::GatewayConfig;
    use memoir_net::ApiError;
    use memoir_store::Tag;
    use tempfile::TempDir;

    use async_trait::async_trait;
    use bytes::Bytes;

    struct UnreachableRemote;

    #[async_trait]
    impl RemoteStore for UnreachableRemote {
        async fn upload_blob(&self, _key: &str, _bytes: Bytes) -> Result<String, ApiError> {
            Err(ApiError::NoNetwork)
        }
        async fn upsert_entry(&self, _record: memoir_sync::EntryRecord) -> Result<(), ApiError> {
            Err(ApiError::NoNetwork)
        }
        async fn replace_messages(
            &self,
            _entry_id: Uuid,
            _messages: Vec<memoir_sync::MessageRecord>,
        ) -> Result<(), ApiError> {
            Err(ApiError::NoNetwork)
        }
        async fn replace_tag_links(
            &self,
            _entry_id: Uuid,
            _tag_ids: Vec<memoir_store::TagId>,
        ) -> Result<(), ApiError> {
            Err(ApiError::NoNetwork)
        }
        async fn find_or_create_tag(&self, _name: &str) -> Result<Tag, ApiError> {
            Err(ApiError::NoNetwork)
        }
        async fn list_tags(&self) -> Result<Vec<Tag>, ApiError> {
            Err(ApiError::NoNetwork)
        }
    }

    fn coordinator(dir: &TempDir) -> EntryCoordinator {
        let store = Arc::new(DraftStore::open(dir.path().join("drafts.redb")).unwrap());
        let gateway = EnrichmentGateway::new(GatewayConfig::default(), RetryPolicy::default());
        EntryCoordinator::new(
            store,
            gateway,
            Arc::new(UnreachableRemote),
            crate::projection::spawn_projection(),
        )
    }

    #[tokio::test]
    async fn empty_session_is_rejected() {
        let dir = TempDir::new().unwrap();
        let coordinator = coordinator(&dir);
        let mut session = CaptureSession::new();
        assert!(matches!(
            coordinator.save(&mut session),
            Err(SaveError::EmptySession)
        ));

        // A capture with no media, text, or conversation is still empty.
        session.begin_capture(None, None);
        assert!(matches!(
            coordinator.save(&mut session),
            Err(SaveError::EmptySession)
        ));
    }

    #[tokio::test]
    async fn retry_of_unknown_entry_is_rejected() {
        let dir = TempDir::new().unwrap();
        let coordinator = coordinator(&dir);
        assert!(matches!(
            coordinator.retry(Uuid::new_v4()),
            Err(SaveError::UnknownEntry(_))
        ));
    }

    #[tokio::test]
    async fn retry_of_non_failed_entry_is_rejected() {
        let dir = TempDir::new().unwrap();
        let coordinator = coordinator(&dir);

        let mut entry = Entry::new(Uuid::new_v4());
        entry.processing_state = ProcessingState::Completed;
        entry.sync_status = SyncStatus::Synced;
        coordinator.store.save(&entry).unwrap();

        assert!(matches!(
            coordinator.retry(entry.id),
            Err(SaveError::NotFailed(_))
        ));
    }

    #[tokio::test]
    async fn recover_marks_interrupted_entries_failed() {
        let dir = TempDir::new().unwrap();
        let coordinator = coordinator(&dir);

        let mut stuck = Entry::new(Uuid::new_v4());
        stuck.title = Some("kept title".to_string());
        stuck.processing_state = ProcessingState::AiGenerating;
        coordinator.store.save(&stuck).unwrap();

        let mut done = Entry::new(Uuid::new_v4());
        done.processing_state = ProcessingState::Completed;
        done.sync_status = SyncStatus::Synced;
        coordinator.store.save(&done).unwrap();

        let recovered = coordinator.recover().unwrap();
        assert_eq!(recovered, vec![stuck.id]);

        let reloaded = coordinator.entry(stuck.id).unwrap().unwrap();
        assert_eq!(reloaded.processing_state, ProcessingState::Failed);
        assert!(reloaded.is_retryable());
        assert!(reloaded.last_error.is_some());
        // No data was lost.
        assert_eq!(reloaded.title.as_deref(), Some("kept title"));

        // Both entries were projected.
        let visible = coordinator.projection().snapshot().await;
        assert_eq!(visible.len(), 2);
    }
}
