//! Prompt context assembly
//!
//! Gathers the history window and any persona-scoped facility records for
//! one request. Context is best-effort: a store failure empties the
//! affected section, logs a warning, and the request proceeds without it.
//! Care events and invoices are only fetched when the persona holds the
//! matching data scope and the caller's user id resolves to a patient
//! through the directory.

use chrono::{Duration, Utc};
use std::sync::Arc;

use sentinel_config::AdvisorConfig;
use sentinel_core::{AgentPersona, Turn};
use sentinel_persistence::{
    CareEvent, CareEventStore, ConversationLogStore, DirectoryStore, FamilyMember, Invoice,
    InvoiceStore, Patient,
};

/// Everything attached to one model call beyond the message itself
#[derive(Debug, Default)]
pub struct ContextBundle {
    /// Prior turns, oldest first; each log row expands to a user turn and
    /// an assistant turn
    pub history: Vec<Turn>,
    pub member: Option<FamilyMember>,
    pub patient: Option<Patient>,
    /// Recent care events, newest first
    pub care_events: Vec<CareEvent>,
    /// Recent invoices, newest first
    pub invoices: Vec<Invoice>,
}

impl ContextBundle {
    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
            && self.member.is_none()
            && self.care_events.is_empty()
            && self.invoices.is_empty()
    }

    /// Facility records rendered as lines appended to the system prompt.
    /// History is not rendered here; it travels as chat turns.
    pub fn render_notes(&self) -> Option<String> {
        if self.member.is_none() && self.care_events.is_empty() && self.invoices.is_empty() {
            return None;
        }

        let mut notes = String::from("Facility records for this conversation:");

        if let Some(member) = &self.member {
            notes.push_str(&format!(
                "\n- Speaking with {} ({})",
                member.name, member.relationship
            ));
        }

        if let Some(patient) = &self.patient {
            match &patient.room {
                Some(room) => notes.push_str(&format!(
                    "\n- Resident: {} (room {})",
                    patient.name, room
                )),
                None => notes.push_str(&format!("\n- Resident: {}", patient.name)),
            }
        }

        for event in &self.care_events {
            notes.push_str(&format!(
                "\n- [{}] {} {}",
                event.kind.as_str(),
                event.created_at.format("%b %e %H:%M"),
                event.description
            ));
        }

        for invoice in &self.invoices {
            notes.push_str(&format!(
                "\n- [invoice] {} {} ${:.2} due {}",
                invoice.invoice_id,
                invoice.status.as_str(),
                invoice.amount_cents as f64 / 100.0,
                invoice.due_date
            ));
        }

        Some(notes)
    }
}

/// Builds a [`ContextBundle`] for one request
pub struct ContextBuilder {
    conversations: Arc<dyn ConversationLogStore>,
    directory: Arc<dyn DirectoryStore>,
    care_events: Arc<dyn CareEventStore>,
    invoices: Arc<dyn InvoiceStore>,
    history_turns: usize,
    care_events_limit: usize,
    care_events_window: Duration,
    invoices_limit: usize,
}

impl ContextBuilder {
    pub fn new(
        conversations: Arc<dyn ConversationLogStore>,
        directory: Arc<dyn DirectoryStore>,
        care_events: Arc<dyn CareEventStore>,
        invoices: Arc<dyn InvoiceStore>,
        config: &AdvisorConfig,
    ) -> Self {
        Self {
            conversations,
            directory,
            care_events,
            invoices,
            history_turns: config.history_turns,
            care_events_limit: config.care_events_limit,
            care_events_window: Duration::hours(config.care_events_window_hours),
            invoices_limit: config.invoices_limit,
        }
    }

    pub async fn build(
        &self,
        session_id: &str,
        user_id: Option<&str>,
        persona: &AgentPersona,
    ) -> ContextBundle {
        let mut bundle = ContextBundle {
            history: self.load_history(session_id).await,
            ..Default::default()
        };

        let Some(user_id) = user_id else {
            return bundle;
        };

        bundle.member = match self.directory.family_member(user_id).await {
            Ok(member) => member,
            Err(e) => {
                tracing::warn!(error = %e, user_id = %user_id, "Directory lookup failed");
                None
            }
        };

        let Some(patient_id) = bundle.member.as_ref().map(|m| m.patient_id.clone()) else {
            return bundle;
        };

        bundle.patient = match self.directory.patient(&patient_id).await {
            Ok(patient) => patient,
            Err(e) => {
                tracing::warn!(error = %e, patient_id = %patient_id, "Patient lookup failed");
                None
            }
        };

        if persona.scopes.patient_data {
            let since = Utc::now() - self.care_events_window;
            bundle.care_events = match self
                .care_events
                .recent_for_patient(&patient_id, since, self.care_events_limit as i32)
                .await
            {
                Ok(events) => events,
                Err(e) => {
                    tracing::warn!(error = %e, patient_id = %patient_id, "Care event lookup failed");
                    Vec::new()
                }
            };
        }

        if persona.scopes.financial_data {
            bundle.invoices = match self
                .invoices
                .recent_for_patient(&patient_id, self.invoices_limit as i32)
                .await
            {
                Ok(invoices) => invoices,
                Err(e) => {
                    tracing::warn!(error = %e, patient_id = %patient_id, "Invoice lookup failed");
                    Vec::new()
                }
            };
        }

        bundle
    }

    async fn load_history(&self, session_id: &str) -> Vec<Turn> {
        let entries = match self
            .conversations
            .history(session_id, self.history_turns as i32)
            .await
        {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(error = %e, session_id = %session_id, "History lookup failed");
                return Vec::new();
            }
        };

        entries
            .into_iter()
            .flat_map(|entry| {
                [
                    Turn::user(entry.message),
                    Turn::assistant(entry.response),
                ]
            })
            .collect()
    }
}
