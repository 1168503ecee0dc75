//! AI enrichment gateway: one interface, three interchangeable providers.
//!
//! Provider selection is a static priority chain evaluated on **every** call:
//! proxy backend if configured, direct provider if its credential is present,
//! deterministic mock otherwise.  Each network-bound call is wrapped in
//! bounded retry-with-backoff; responses are decoded defensively so a
//! provider that ignores the requested schema degrades to a plain-text reply
//! instead of an error.

pub mod direct;
pub mod gateway;
pub mod mock;
pub mod provider;
pub mod proxy;
pub mod types;

pub use direct::DirectProvider;
pub use gateway::EnrichmentGateway;
pub use mock::MockProvider;
pub use provider::EnrichmentProvider;
pub use proxy::ProxyProvider;
pub use types::{
    AnalysisContext, ChatReply, ChatTurn, EnrichmentContext, MediaPayload, SummaryResult,
    MAX_FOLLOW_UPS, MAX_SUGGESTED_TOPICS, MAX_TAGS,
};
