//! The optimistic, user-visible entry list.
//!
//! Logically many background tasks want to mutate this list concurrently;
//! all updates funnel through one actor task via a channel, so partial
//! updates are never visible and ordering within a sender is preserved.

use tokio::sync::{mpsc, oneshot, watch};
use tracing::debug;
use uuid::Uuid;

use memoir_store::{Entry, ProcessingState, SyncStatus};

#[derive(Debug)]
pub enum ProjectionUpdate {
    /// Insert or replace the full entry.
    Upsert(Box<Entry>),
    /// Cheap status-only update for pipeline progress.
    SetStates {
        id: Uuid,
        processing: ProcessingState,
        sync: SyncStatus,
        error: Option<String>,
    },
    Remove(Uuid),
}

enum Command {
    Apply(ProjectionUpdate),
    Snapshot(oneshot::Sender<Vec<Entry>>),
}

/// Cloneable handle; the only way to read or mutate the projection.
#[derive(Clone)]
pub struct ProjectionHandle {
    tx: mpsc::UnboundedSender<Command>,
    version: watch::Receiver<u64>,
}

impl ProjectionHandle {
    pub fn upsert(&self, entry: Entry) {
        let _ = self.tx.send(Command::Apply(ProjectionUpdate::Upsert(Box::new(entry))));
    }

    pub fn set_states(
        &self,
        id: Uuid,
        processing: ProcessingState,
        sync: SyncStatus,
        error: Option<String>,
    ) {
        let _ = self.tx.send(Command::Apply(ProjectionUpdate::SetStates {
            id,
            processing,
            sync,
            error,
        }));
    }

    pub fn remove(&self, id: Uuid) {
        let _ = self.tx.send(Command::Apply(ProjectionUpdate::Remove(id)));
    }

    /// Current list, newest first.  Observes every update sent on this
    /// handle before the call.
    pub async fn snapshot(&self) -> Vec<Entry> {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(Command::Snapshot(tx)).is_err() {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }

    /// Version counter bumped on every applied update; embedding UIs watch
    /// this to know when to re-read the snapshot.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version.clone()
    }
}

/// Spawn the actor that owns the visible list.  It runs until every handle
/// is dropped.
pub fn spawn_projection() -> ProjectionHandle {
    let (tx, mut rx) = mpsc::unbounded_channel::<Command>();
    let (version_tx, version_rx) = watch::channel(0u64);

    tokio::spawn(async move {
        let mut entries: Vec<Entry> = Vec::new();
        while let Some(command) = rx.recv().await {
            match command {
                Command::Apply(update) => {
                    apply(&mut entries, update);
                    version_tx.send_modify(|v| *v += 1);
                }
                Command::Snapshot(reply) => {
                    let _ = reply.send(entries.clone());
                }
            }
        }
        debug!("projection actor stopped");
    });

    ProjectionHandle {
        tx,
        version: version_rx,
    }
}

fn apply(entries: &mut Vec<Entry>, update: ProjectionUpdate) {
    match update {
        ProjectionUpdate::Upsert(entry) => {
            match entries.iter_mut().find(|e| e.id == entry.id) {
                Some(existing) => *existing = *entry,
                None => entries.push(*entry),
            }
            entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        }
        ProjectionUpdate::SetStates {
            id,
            processing,
            sync,
            error,
        } => {
            if let Some(entry) = entries.iter_mut().find(|e| e.id == id) {
                entry.processing_state = processing;
                entry.sync_status = sync;
                entry.last_error = error;
            }
        }
        ProjectionUpdate::Remove(id) => {
            entries.retain(|e| e.id != id);
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
