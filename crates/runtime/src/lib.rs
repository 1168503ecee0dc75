//! Entry lifecycle orchestration.
//!
//! The coordinator owns the two-phase save: a synchronous local commit that
//! returns before any network call, and a detached background task chaining
//! enrichment → tag reconciliation → sync.  Background tasks communicate
//! only through the draft store and the serialized projection actor; each
//! works from its own immutable snapshot.

pub mod coordinator;
pub mod pipeline;
pub mod projection;
pub mod session;
pub mod telemetry;

pub use coordinator::{EntryCoordinator, SaveError};
pub use projection::{spawn_projection, ProjectionHandle, ProjectionUpdate};
pub use session::{CaptureSession, EntrySnapshot, SessionState};
