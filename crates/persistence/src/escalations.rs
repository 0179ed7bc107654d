//! Escalation event persistence

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{PersistenceError, ScyllaClient};

/// A recorded escalation. `log_id` references the conversation log row
/// written for the triggering message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationEvent {
    pub id: Uuid,
    pub session_id: String,
    pub log_id: Uuid,
    /// Name of the rule that fired
    pub rule: String,
    pub escalation_type: String,
    /// Keyword or signal that matched, when one did
    pub matched: Option<String>,
    /// Notification targets, e.g. on_call_nurse
    pub targets: Vec<String>,
    /// The triggering message text
    pub message: String,
    pub acknowledged: bool,
    pub created_at: DateTime<Utc>,
}

impl EscalationEvent {
    pub fn new(
        session_id: &str,
        log_id: Uuid,
        rule: &str,
        escalation_type: &str,
        message: &str,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id: session_id.to_string(),
            log_id,
            rule: rule.to_string(),
            escalation_type: escalation_type.to_string(),
            matched: None,
            targets: Vec::new(),
            message: message.to_string(),
            acknowledged: false,
            created_at: Utc::now(),
        }
    }
}

/// Escalation store trait
#[async_trait]
pub trait EscalationStore: Send + Sync {
    async fn record(&self, event: &EscalationEvent) -> Result<(), PersistenceError>;

    async fn list_for_session(
        &self,
        session_id: &str,
        limit: i32,
    ) -> Result<Vec<EscalationEvent>, PersistenceError>;
}

/// ScyllaDB implementation of the escalation store
#[derive(Clone)]
pub struct ScyllaEscalationStore {
    client: ScyllaClient,
}

impl ScyllaEscalationStore {
    pub fn new(client: ScyllaClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl EscalationStore for ScyllaEscalationStore {
    async fn record(&self, event: &EscalationEvent) -> Result<(), PersistenceError> {
        let query = format!(
            "INSERT INTO {}.escalation_events (
                session_id, timestamp, id, log_id, rule,
                escalation_type, matched, targets, message, acknowledged
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            self.client.keyspace()
        );

        self.client
            .session()
            .query_unpaged(
                query,
                (
                    &event.session_id,
                    event.created_at.timestamp_millis(),
                    event.id,
                    event.log_id,
                    &event.rule,
                    &event.escalation_type,
                    &event.matched,
                    &event.targets,
                    &event.message,
                    event.acknowledged,
                ),
            )
            .await?;

        tracing::info!(
            session_id = %event.session_id,
            rule = %event.rule,
            escalation_type = %event.escalation_type,
            "Escalation recorded"
        );

        Ok(())
    }

    async fn list_for_session(
        &self,
        session_id: &str,
        limit: i32,
    ) -> Result<Vec<EscalationEvent>, PersistenceError> {
        let query = format!(
            "SELECT session_id, timestamp, id, log_id, rule,
                    escalation_type, matched, targets, message, acknowledged
             FROM {}.escalation_events WHERE session_id = ? LIMIT ?",
            self.client.keyspace()
        );

        let result = self
            .client
            .session()
            .query_unpaged(query, (session_id, limit))
            .await?;

        let mut events = Vec::new();
        if let Some(rows) = result.rows {
            for row in rows {
                let (
                    session_id,
                    timestamp,
                    id,
                    log_id,
                    rule,
                    escalation_type,
                    matched,
                    targets,
                    message,
                    acknowledged,
                ): (
                    String,
                    i64,
                    Uuid,
                    Uuid,
                    String,
                    String,
                    Option<String>,
                    Option<Vec<String>>,
                    String,
                    bool,
                ) = row
                    .into_typed()
                    .map_err(|e| PersistenceError::InvalidData(e.to_string()))?;

                events.push(EscalationEvent {
                    id,
                    session_id,
                    log_id,
                    rule,
                    escalation_type,
                    matched,
                    targets: targets.unwrap_or_default(),
                    message,
                    acknowledged,
                    created_at: DateTime::from_timestamp_millis(timestamp)
                        .unwrap_or_else(Utc::now),
                });
            }
        }

        Ok(events)
    }
}

/// In-memory escalation store for tests
#[derive(Default)]
pub struct InMemoryEscalationStore {
    events: RwLock<Vec<EscalationEvent>>,
}

impl InMemoryEscalationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }
}

#[async_trait]
impl EscalationStore for InMemoryEscalationStore {
    async fn record(&self, event: &EscalationEvent) -> Result<(), PersistenceError> {
        self.events.write().push(event.clone());
        Ok(())
    }

    async fn list_for_session(
        &self,
        session_id: &str,
        limit: i32,
    ) -> Result<Vec<EscalationEvent>, PersistenceError> {
        let events = self.events.read();
        let mut rows: Vec<EscalationEvent> = events
            .iter()
            .filter(|e| e.session_id == session_id)
            .cloned()
            .collect();
        rows.sort_by_key(|e| std::cmp::Reverse(e.created_at));
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_record_and_list() {
        let store = InMemoryEscalationStore::new();
        let log_id = Uuid::new_v4();
        let mut event =
            EscalationEvent::new("s1", log_id, "medical_emergency", "medical", "mom fell");
        event.targets = vec!["on_call_nurse".to_string()];
        store.record(&event).await.unwrap();

        let listed = store.list_for_session("s1", 10).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].log_id, log_id);
        assert_eq!(listed[0].targets, vec!["on_call_nurse"]);
        assert!(!listed[0].acknowledged);
    }
}
