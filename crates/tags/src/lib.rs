//! Tag vocabulary and reconciliation.
//!
//! The reconciler turns free-text tag names produced by the enrichment
//! gateway into stable identifiers, preferring reuse over duplication, and
//! never blocks a save on the remote being reachable.

pub mod reconciler;
pub mod vocabulary;

pub use reconciler::{TagDirectory, TagReconciler};
pub use vocabulary::TagVocabulary;
