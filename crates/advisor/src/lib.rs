//! The SENTINEL advisor pipeline
//!
//! One inbound message flows classify -> select -> context -> escalate or
//! generate -> log, and always produces a reply: classification cannot fail,
//! a tripped escalation rule answers with its canned safety response, and a
//! failed model call answers with the persona's fallback message. Exactly
//! one conversation-log row is written per handled message, whichever path
//! produced the reply.
//!
//! The crate also carries the multi-persona collaboration flow, the persona
//! registry with its refresh-on-demand cache, and the usage analytics the
//! dashboard reads.

pub mod advisor;
pub mod analytics;
pub mod collaborate;
pub mod context;
pub mod escalation;
pub mod registry;
pub mod semantic;

pub use advisor::{Advisor, ChatInput, ChatOutcome};
pub use analytics::{TopicCount, UsageReport};
pub use collaborate::{CollaborationOutcome, Contribution, NO_CONTRIBUTIONS_MESSAGE};
pub use context::{ContextBuilder, ContextBundle};
pub use escalation::{
    EscalationMatch, EscalationNotifier, EscalationPolicy, TracingNotifier,
};
pub use registry::{
    AgentRegistry, CatalogFileSource, PersonaSource, StaticCatalogSource, StoreBackedSource,
};
pub use semantic::SemanticIntentIndex;

use thiserror::Error;

/// Advisor errors
#[derive(Error, Debug)]
pub enum AdvisorError {
    /// Persona catalog could not be loaded or failed validation
    #[error("Persona error: {0}")]
    Persona(String),

    /// A store operation failed on a path that cannot degrade
    #[error("Store error: {0}")]
    Store(#[from] sentinel_persistence::PersistenceError),

    /// A model call failed on a path with no fallback message
    #[error("Model error: {0}")]
    Model(#[from] sentinel_llm::LlmError),

    /// The caller sent something the pipeline cannot work with
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}
