pub mod draft_store;
pub mod schema;

pub use draft_store::{DraftStore, StoreError};
pub use schema::{
    AnalysisResult, ConversationMessage, Entry, EnvironmentContext, MediaKind, MediaRef,
    MessageRole, ProcessingState, SyncStatus, Tag, TagId, SENTINEL_TAG_NAME,
};
