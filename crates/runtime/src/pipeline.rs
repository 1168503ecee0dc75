//! Phase 2 of the two-phase save: the detached background task.
//!
//! Every intermediate step writes through the draft store, so a process
//! death at any point leaves a recoverable entry rather than lost work.
//! Enrichment failures are individually non-fatal; sync proceeds with
//! whatever enrichment succeeded.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use memoir_gateway::{AnalysisContext, ChatTurn, EnrichmentGateway};
use memoir_store::{DraftStore, Entry, ProcessingState, SyncStatus};
use memoir_sync::{RemoteTagDirectory, SyncEngine};
use memoir_tags::{TagDirectory, TagReconciler, TagVocabulary};

use crate::projection::ProjectionHandle;

pub(crate) struct PipelineContext {
    pub store: Arc<DraftStore>,
    pub gateway: EnrichmentGateway,
    pub sync: Arc<SyncEngine>,
    pub projection: ProjectionHandle,
    pub reconciler: TagReconciler,
    pub vocabulary: Arc<tokio::sync::Mutex<TagVocabulary>>,
}

#[instrument(skip_all, fields(entry = %entry.id_short()))]
pub(crate) async fn run(ctx: PipelineContext, mut entry: Entry, enrich: bool) {
    if enrich && !entry.conversation.is_empty() {
        entry = enrich_entry(&ctx, entry).await;
    }

    entry = mark_uploading(&ctx, entry).await;
    entry = promote_pending_tags(&ctx, entry).await;

    let outcome = ctx.sync.upload(&entry).await;
    finish(&ctx, entry, outcome).await;
}

/// Enrichment stage: summary and tags, each independently fault-tolerant.
/// Results are persisted and projected incrementally as they land, so the
/// visible entry fills in without waiting for the whole pipeline.
async fn enrich_entry(ctx: &PipelineContext, mut entry: Entry) -> Entry {
    let history: Vec<ChatTurn> = entry.conversation.iter().map(ChatTurn::from).collect();
    let analysis = entry.analysis.as_ref().map(AnalysisContext::from);
    let environment = entry.environment.clone();

    // Refresh the vocabulary from the remote when reachable so extraction
    // can prefer reuse; otherwise the cached copy serves.
    let directory = RemoteTagDirectory(ctx.sync.remote());
    let existing = {
        let mut vocabulary = ctx.vocabulary.lock().await;
        match directory.list().await {
            Ok(tags) => {
                for tag in tags {
                    vocabulary.insert(tag);
                }
            }
            Err(err) => debug!(error = %err, "vocabulary refresh skipped"),
        }
        vocabulary.suggestion_names()
    };

    let (summary, tags) = tokio::join!(
        ctx.gateway
            .summarize(&history, analysis.clone(), environment.clone()),
        ctx.gateway.extract_tags(&history, analysis.clone(), &existing),
    );

    match summary {
        Ok(summary) => {
            match ctx.store.update(entry.id, |e| {
                e.title = Some(summary.title.clone());
                e.summary = Some(summary.narrative.clone());
            }) {
                Ok(Some(updated)) => {
                    debug!(title = %summary.title, "summary attached");
                    ctx.projection.upsert(updated.clone());
                    entry = updated;
                }
                Ok(None) => warn!("entry disappeared while attaching summary"),
                Err(err) => warn!(error = %err, "persisting summary failed"),
            }
        }
        Err(err) => warn!(error = %err, "summary generation failed; continuing"),
    }

    match tags {
        Ok(names) if !names.is_empty() => {
            let ids = {
                let mut vocabulary = ctx.vocabulary.lock().await;
                ctx.reconciler
                    .reconcile(&names, &mut vocabulary, &directory)
                    .await
            };
            match ctx.store.update(entry.id, |e| e.tag_ids = ids.clone()) {
                Ok(Some(updated)) => {
                    debug!(tags = ids.len(), "tags attached");
                    ctx.projection.upsert(updated.clone());
                    entry = updated;
                }
                Ok(None) => warn!("entry disappeared while attaching tags"),
                Err(err) => warn!(error = %err, "persisting tags failed"),
            }
        }
        Ok(_) => {}
        Err(err) => warn!(error = %err, "tag extraction failed; continuing"),
    }

    entry
}

async fn mark_uploading(ctx: &PipelineContext, entry: Entry) -> Entry {
    match ctx.store.update(entry.id, |e| {
        e.processing_state = ProcessingState::Uploading;
        e.sync_status = SyncStatus::Syncing;
        e.last_error = None;
    }) {
        Ok(Some(updated)) => {
            ctx.projection.set_states(
                updated.id,
                ProcessingState::Uploading,
                SyncStatus::Syncing,
                None,
            );
            updated
        }
        Ok(None) | Err(_) => {
            warn!("could not persist uploading state");
            entry
        }
    }
}

/// Swap locally-scoped tag ids for remote ones now that the remote is about
/// to be touched anyway.  Failure leaves them pending for a later sync.
async fn promote_pending_tags(ctx: &PipelineContext, mut entry: Entry) -> Entry {
    let directory = RemoteTagDirectory(ctx.sync.remote());
    let promoted = {
        let mut vocabulary = ctx.vocabulary.lock().await;
        match ctx
            .reconciler
            .reconcile_pending(&mut vocabulary, &directory)
            .await
        {
            Ok(promoted) => promoted,
            Err(err) => {
                debug!(error = %err, "pending tag promotion skipped");
                return entry;
            }
        }
    };

    if promoted.is_empty() {
        return entry;
    }

    match ctx.store.update(entry.id, |e| {
        for tag_id in &mut e.tag_ids {
            if let Some((_, remote)) = promoted.iter().find(|(local, _)| *local == *tag_id) {
                *tag_id = *remote;
            }
        }
    }) {
        Ok(Some(updated)) => entry = updated,
        Ok(None) => warn!("entry disappeared while promoting tags"),
        Err(err) => warn!(error = %err, "persisting promoted tags failed"),
    }
    entry
}

/// Terminal write: `Completed`/`Synced` on success, `Failed` + error message
/// otherwise — through the store first, then the projection.
async fn finish(ctx: &PipelineContext, entry: Entry, outcome: memoir_sync::SyncOutcome) {
    let result = match &outcome.first_error {
        None => ctx.store.update(entry.id, |e| {
            if let Some(media) = &mut e.media {
                if outcome.media_remote_path.is_some() {
                    media.remote_path = outcome.media_remote_path.clone();
                }
                if outcome.media_remote_url.is_some() {
                    media.remote_url = outcome.media_remote_url.clone();
                }
                if outcome.thumbnail_remote_path.is_some() {
                    media.thumbnail_remote_path = outcome.thumbnail_remote_path.clone();
                }
            }
            e.processing_state = ProcessingState::Completed;
            e.sync_status = SyncStatus::Synced;
            e.last_error = None;
        }),
        Some(err) => ctx.store.update(entry.id, |e| {
            e.processing_state = ProcessingState::Failed;
            e.sync_status = SyncStatus::Failed;
            e.last_error = Some(err.to_string());
        }),
    };

    match result {
        Ok(Some(final_entry)) => {
            match &outcome.first_error {
                None => info!("pipeline completed"),
                Some(err) => warn!(error = %err, "pipeline failed; entry is retryable"),
            }
            ctx.projection.upsert(final_entry);
        }
        Ok(None) => warn!("entry disappeared before terminal write"),
        Err(err) => warn!(error = %err, "terminal write failed"),
    }
}
