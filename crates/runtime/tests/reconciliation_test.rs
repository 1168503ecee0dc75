//! Tag reconciliation through the full pipeline: reuse of the remote
//! vocabulary, offline local scoping, and promotion on the next sync.

mod helpers;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use helpers::{coordinator_with, wait_terminal, FakeRemote};
use memoir_runtime::CaptureSession;
use memoir_store::{ProcessingState, Tag, TagId};
use tempfile::TempDir;
use uuid::Uuid;

#[tokio::test]
async fn offline_tags_are_locally_scoped_then_promoted_on_retry() {
    let dir = TempDir::new().unwrap();
    let remote = Arc::new(FakeRemote::failing());
    let coordinator = coordinator_with(&dir, remote.clone());

    let mut session = CaptureSession::new();
    session.begin_capture(None, None);
    session.append_user_message("a trip to the coast with friends");
    let id = coordinator.save(&mut session).unwrap();

    let failed = wait_terminal(&coordinator, id).await;
    assert_eq!(failed.processing_state, ProcessingState::Failed);
    // The remote was unreachable, but tagging was not blocked: the entry
    // carries locally-scoped ids pending reconciliation.
    assert!(!failed.tag_ids.is_empty());
    assert!(failed.tag_ids.iter().all(|tag_id| tag_id.is_local()));

    remote.set_failing(false);
    coordinator.retry(id).unwrap();
    let done = wait_terminal(&coordinator, id).await;

    assert_eq!(done.processing_state, ProcessingState::Completed);
    // Promotion swapped every local id for its remote counterpart.
    assert!(done.tag_ids.iter().all(|tag_id| !tag_id.is_local()));
    assert_eq!(done.tag_ids.len(), failed.tag_ids.len());

    // The uploaded tag links are the promoted remote ids.
    let links = remote.tag_links.lock().unwrap();
    let uploaded = links.get(&id).unwrap();
    assert_eq!(uploaded.len(), done.tag_ids.len());
}

#[tokio::test]
async fn known_vocabulary_names_are_reused_not_duplicated() {
    let dir = TempDir::new().unwrap();
    let remote = Arc::new(FakeRemote::default());

    // The user's vocabulary already holds "travel".
    let travel = Tag {
        id: TagId::Remote(Uuid::new_v4()),
        name: "travel".to_string(),
        position: 1,
        is_system: false,
    };
    remote
        .tags
        .lock()
        .unwrap()
        .insert("travel".to_string(), travel.clone());

    let coordinator = coordinator_with(&dir, remote.clone());

    let mut session = CaptureSession::new();
    session.begin_capture(None, None);
    // Travel keywords steer the mock's tag extraction to ["travel", ...].
    session.append_user_message("our trip through the mountain city");
    let id = coordinator.save(&mut session).unwrap();

    let done = wait_terminal(&coordinator, id).await;
    assert_eq!(done.processing_state, ProcessingState::Completed);

    // "travel" was reused; only genuinely new names were created remotely.
    assert!(done.tag_ids.contains(&travel.id));
    let created = remote.tag_creates.load(Ordering::SeqCst);
    assert_eq!(created + 1, done.tag_ids.len());

    // No duplicate name appeared in the remote vocabulary.
    let names: Vec<String> = remote.tags.lock().unwrap().keys().cloned().collect();
    let mut deduped = names.clone();
    deduped.sort();
    deduped.dedup();
    assert_eq!(names.len(), deduped.len());
}
