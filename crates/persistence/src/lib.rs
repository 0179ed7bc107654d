//! ScyllaDB persistence layer for sentinel-advisor
//!
//! Provides persistent storage for:
//! - Conversation log (one row per handled message, plus a day projection)
//! - Escalation events
//! - Feedback
//! - Care directory (family members, patients, care events, invoices)
//! - Operator-managed persona definitions
//!
//! Every store is a trait with a ScyllaDB implementation and an in-memory
//! one, so the service degrades to memory-only when the cluster is down.

pub mod care_events;
pub mod client;
pub mod directory;
pub mod error;
pub mod escalations;
pub mod feedback;
pub mod invoices;
pub mod log;
pub mod personas;
pub mod schema;

pub use care_events::{
    CareEvent, CareEventKind, CareEventStore, InMemoryCareEventStore, ScyllaCareEventStore,
};
pub use client::{ScyllaClient, ScyllaConfig};
pub use directory::{
    DirectoryStore, FamilyMember, InMemoryDirectoryStore, Patient, ScyllaDirectoryStore,
};
pub use error::PersistenceError;
pub use escalations::{EscalationEvent, EscalationStore, InMemoryEscalationStore, ScyllaEscalationStore};
pub use feedback::{FeedbackRecord, FeedbackStore, InMemoryFeedbackStore, ScyllaFeedbackStore};
pub use invoices::{InMemoryInvoiceStore, Invoice, InvoiceStatus, InvoiceStore, ScyllaInvoiceStore};
pub use log::{
    ConversationDigest, ConversationLogEntry, ConversationLogStore, EmbeddedMessage,
    InMemoryConversationLog, ScyllaConversationLog,
};
pub use personas::{InMemoryPersonaStore, PersonaStore, ScyllaPersonaStore};

use std::sync::Arc;

/// Initialize the persistence layer against ScyllaDB
pub async fn init(config: ScyllaConfig) -> Result<PersistenceLayer, PersistenceError> {
    let client = ScyllaClient::connect(config).await?;
    client.ensure_schema().await?;

    Ok(PersistenceLayer {
        conversations: Arc::new(ScyllaConversationLog::new(client.clone())),
        escalations: Arc::new(ScyllaEscalationStore::new(client.clone())),
        feedback: Arc::new(ScyllaFeedbackStore::new(client.clone())),
        directory: Arc::new(ScyllaDirectoryStore::new(client.clone())),
        care_events: Arc::new(ScyllaCareEventStore::new(client.clone())),
        invoices: Arc::new(ScyllaInvoiceStore::new(client.clone())),
        personas: Arc::new(ScyllaPersonaStore::new(client)),
    })
}

/// Memory-only layer, used in tests and when ScyllaDB is unreachable
pub fn init_in_memory() -> PersistenceLayer {
    PersistenceLayer {
        conversations: Arc::new(InMemoryConversationLog::new()),
        escalations: Arc::new(InMemoryEscalationStore::new()),
        feedback: Arc::new(InMemoryFeedbackStore::new()),
        directory: Arc::new(InMemoryDirectoryStore::new()),
        care_events: Arc::new(InMemoryCareEventStore::new()),
        invoices: Arc::new(InMemoryInvoiceStore::new()),
        personas: Arc::new(InMemoryPersonaStore::new()),
    }
}

/// Combined persistence layer with all stores
#[derive(Clone)]
pub struct PersistenceLayer {
    pub conversations: Arc<dyn ConversationLogStore>,
    pub escalations: Arc<dyn EscalationStore>,
    pub feedback: Arc<dyn FeedbackStore>,
    pub directory: Arc<dyn DirectoryStore>,
    pub care_events: Arc<dyn CareEventStore>,
    pub invoices: Arc<dyn InvoiceStore>,
    pub personas: Arc<dyn PersonaStore>,
}
