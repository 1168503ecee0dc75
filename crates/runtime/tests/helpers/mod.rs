#![allow(dead_code)]

//! Shared test doubles for the pipeline integration tests.

use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tempfile::TempDir;
use uuid::Uuid;

use memoir_config::GatewayConfig;
use memoir_gateway::EnrichmentGateway;
use memoir_net::{ApiError, RetryPolicy};
use memoir_runtime::{spawn_projection, EntryCoordinator};
use memoir_store::{DraftStore, Entry, MediaRef, Tag, TagId};
use memoir_sync::{EntryRecord, MessageRecord, RemoteStore};

/// Remote store double honouring the real contract: keyed blob puts,
/// merge-on-conflict entry upserts, replacing child writes, atomic tag
/// find-or-create.  Can be switched into total failure and given a per-call
/// delay to keep pipeline tasks in flight.
#[derive(Default)]
pub struct FakeRemote {
    pub blobs: Mutex<HashMap<String, Bytes>>,
    pub entries: Mutex<HashMap<Uuid, EntryRecord>>,
    pub messages: Mutex<HashMap<Uuid, Vec<MessageRecord>>>,
    pub tag_links: Mutex<HashMap<Uuid, Vec<Uuid>>>,
    pub tags: Mutex<HashMap<String, Tag>>,
    pub tag_creates: AtomicUsize,
    calls: AtomicUsize,
    fail_all: AtomicBool,
    delay_ms: AtomicU64,
}

impl FakeRemote {
    pub fn failing() -> Self {
        let remote = Self::default();
        remote.fail_all.store(true, Ordering::SeqCst);
        remote
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_all.store(failing, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Total remote operations attempted, across every endpoint.
    pub fn total_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn gate(&self) -> Result<(), ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail_all.load(Ordering::SeqCst) {
            return Err(ApiError::NoNetwork);
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for FakeRemote {
    async fn upload_blob(&self, key: &str, bytes: Bytes) -> Result<String, ApiError> {
        self.gate().await?;
        self.blobs.lock().unwrap().insert(key.to_string(), bytes);
        Ok(format!("https://cdn.example.com/{key}"))
    }

    async fn upsert_entry(&self, record: EntryRecord) -> Result<(), ApiError> {
        self.gate().await?;
        self.entries.lock().unwrap().insert(record.id, record);
        Ok(())
    }

    async fn replace_messages(
        &self,
        entry_id: Uuid,
        messages: Vec<MessageRecord>,
    ) -> Result<(), ApiError> {
        self.gate().await?;
        self.messages.lock().unwrap().insert(entry_id, messages);
        Ok(())
    }

    async fn replace_tag_links(&self, entry_id: Uuid, tag_ids: Vec<TagId>) -> Result<(), ApiError> {
        self.gate().await?;
        let ids = tag_ids
            .into_iter()
            .filter(|id| !id.is_local())
            .map(TagId::uuid)
            .collect();
        self.tag_links.lock().unwrap().insert(entry_id, ids);
        Ok(())
    }

    async fn find_or_create_tag(&self, name: &str) -> Result<Tag, ApiError> {
        self.gate().await?;
        let mut tags = self.tags.lock().unwrap();
        if let Some(tag) = tags.get(name) {
            return Ok(tag.clone());
        }
        self.tag_creates.fetch_add(1, Ordering::SeqCst);
        let tag = Tag {
            id: TagId::Remote(Uuid::new_v4()),
            name: name.to_string(),
            position: tags.len() as i64 + 1,
            is_system: false,
        };
        tags.insert(name.to_string(), tag.clone());
        Ok(tag)
    }

    async fn list_tags(&self) -> Result<Vec<Tag>, ApiError> {
        self.gate().await?;
        Ok(self.tags.lock().unwrap().values().cloned().collect())
    }
}

/// Coordinator over a temp-dir draft store, the mock gateway, and the given
/// fake remote, with fast retries so failure tests stay quick.
pub fn coordinator_with(dir: &TempDir, remote: Arc<FakeRemote>) -> EntryCoordinator {
    let store = Arc::new(DraftStore::open(dir.path().join("drafts.redb")).unwrap());
    let gateway = EnrichmentGateway::new(
        GatewayConfig::default(),
        RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        },
    );
    EntryCoordinator::new(store, gateway, remote, spawn_projection())
}

/// A real file on disk for media upload tests.
pub fn media_file(dir: &TempDir) -> MediaRef {
    let path = dir.path().join("photo.jpg");
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(b"jpeg-bytes").unwrap();
    MediaRef::photo(path.to_string_lossy().to_string())
}

/// Poll the draft store until the entry reaches a terminal state.
pub async fn wait_terminal(coordinator: &EntryCoordinator, id: Uuid) -> Entry {
    for _ in 0..400 {
        if let Some(entry) = coordinator.entry(id).unwrap() {
            if entry.processing_state.is_terminal() {
                return entry;
            }
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("entry {id} never reached a terminal state");
}
