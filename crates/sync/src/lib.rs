//! Idempotent upload of entries to the remote store.
//!
//! Every step is keyed by entry identifier (blob keys, merge-on-conflict
//! metadata upserts, fully-replacing child writes), so a retry after partial
//! failure re-runs the whole stage safely instead of resuming from a
//! checkpoint.

pub mod engine;
pub mod remote;

pub use engine::{SyncEngine, SyncOutcome};
pub use remote::{EntryRecord, HttpRemoteStore, MessageRecord, RemoteStore, RemoteTagDirectory};
