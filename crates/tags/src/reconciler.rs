use async_trait::async_trait;
use tracing::{debug, warn};

use memoir_net::ApiError;
use memoir_store::{Tag, TagId};

use crate::vocabulary::TagVocabulary;

/// Remote tag vocabulary operations, scoped to the authenticated user.
///
/// `find_or_create` must be atomic from the caller's point of view: the
/// remote guarantees that concurrent calls for the same name return the same
/// tag rather than creating duplicates.
#[async_trait]
pub trait TagDirectory: Send + Sync {
    async fn find_or_create(&self, name: &str) -> Result<Tag, ApiError>;
    async fn list(&self) -> Result<Vec<Tag>, ApiError>;
}

/// Resolves generated tag names against the known vocabulary and the remote
/// directory, preferring reuse over duplication.
#[derive(Debug, Clone, Copy, Default)]
pub struct TagReconciler;

impl TagReconciler {
    pub fn new() -> Self {
        Self
    }

    /// Turn `names` into identifiers, order-preserving and deduplicated.
    ///
    /// Per name: case-sensitive match in `vocabulary` reuses its id;
    /// otherwise the remote find-or-create supplies one; if the remote is
    /// unreachable a locally-scoped id is synthesized so the caller is not
    /// blocked — it is promoted on the next successful sync.
    pub async fn reconcile(
        &self,
        names: &[String],
        vocabulary: &mut TagVocabulary,
        directory: &dyn TagDirectory,
    ) -> Vec<TagId> {
        let mut ids = Vec::new();

        for raw in names {
            let name = raw.trim();
            if name.is_empty() {
                continue;
            }

            if let Some(tag) = vocabulary.get(name) {
                if !ids.contains(&tag.id) {
                    ids.push(tag.id);
                }
                continue;
            }

            let tag = match directory.find_or_create(name).await {
                Ok(tag) => {
                    debug!(tag = %tag.name, "tag resolved remotely");
                    tag
                }
                Err(err) => {
                    warn!(tag = name, error = %err, "tag directory unreachable; scoping id locally");
                    Tag {
                        id: TagId::local(),
                        name: name.to_string(),
                        position: vocabulary.next_position(),
                        is_system: false,
                    }
                }
            };

            let id = tag.id;
            vocabulary.insert(tag);
            if !ids.contains(&id) {
                ids.push(id);
            }
        }

        ids
    }

    /// Promote locally-scoped ids now that the directory is reachable again.
    ///
    /// Returns the `(local, remote)` id pairs that were promoted so stored
    /// entries referencing the local ids can be rewritten.  Stops at the
    /// first failure; the remaining pending tags are retried next sweep.
    pub async fn reconcile_pending(
        &self,
        vocabulary: &mut TagVocabulary,
        directory: &dyn TagDirectory,
    ) -> Result<Vec<(TagId, TagId)>, ApiError> {
        let mut promoted = Vec::new();

        for pending in vocabulary.pending_local() {
            let remote = directory.find_or_create(&pending.name).await?;
            debug!(tag = %pending.name, "pending tag promoted");
            let remote_id = remote.id;
            vocabulary.promote(pending.id, remote);
            promoted.push((pending.id, remote_id));
        }

        Ok(promoted)
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
