//! Care event persistence

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{PersistenceError, ScyllaClient};

/// Kind of care event staff record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CareEventKind {
    Medication,
    Meal,
    Activity,
    Vitals,
    Visit,
    Incident,
    Note,
}

impl CareEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Medication => "medication",
            Self::Meal => "meal",
            Self::Activity => "activity",
            Self::Vitals => "vitals",
            Self::Visit => "visit",
            Self::Incident => "incident",
            Self::Note => "note",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "medication" => Self::Medication,
            "meal" => Self::Meal,
            "activity" => Self::Activity,
            "vitals" => Self::Vitals,
            "visit" => Self::Visit,
            "incident" => Self::Incident,
            _ => Self::Note,
        }
    }
}

/// One recorded care event for a patient
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CareEvent {
    pub id: Uuid,
    pub patient_id: String,
    pub kind: CareEventKind,
    pub description: String,
    pub staff: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl CareEvent {
    pub fn new(patient_id: &str, kind: CareEventKind, description: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            patient_id: patient_id.to_string(),
            kind,
            description: description.to_string(),
            staff: None,
            created_at: Utc::now(),
        }
    }
}

/// Care event store trait
#[async_trait]
pub trait CareEventStore: Send + Sync {
    async fn record(&self, event: &CareEvent) -> Result<(), PersistenceError>;

    /// Events newer than `since` for one patient, newest first
    async fn recent_for_patient(
        &self,
        patient_id: &str,
        since: DateTime<Utc>,
        limit: i32,
    ) -> Result<Vec<CareEvent>, PersistenceError>;
}

/// ScyllaDB implementation of the care event store
#[derive(Clone)]
pub struct ScyllaCareEventStore {
    client: ScyllaClient,
}

impl ScyllaCareEventStore {
    pub fn new(client: ScyllaClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CareEventStore for ScyllaCareEventStore {
    async fn record(&self, event: &CareEvent) -> Result<(), PersistenceError> {
        let query = format!(
            "INSERT INTO {}.care_events (
                patient_id, timestamp, id, event_type, description, staff
            ) VALUES (?, ?, ?, ?, ?, ?)",
            self.client.keyspace()
        );

        self.client
            .session()
            .query_unpaged(
                query,
                (
                    &event.patient_id,
                    event.created_at.timestamp_millis(),
                    event.id,
                    event.kind.as_str(),
                    &event.description,
                    &event.staff,
                ),
            )
            .await?;

        Ok(())
    }

    async fn recent_for_patient(
        &self,
        patient_id: &str,
        since: DateTime<Utc>,
        limit: i32,
    ) -> Result<Vec<CareEvent>, PersistenceError> {
        let query = format!(
            "SELECT patient_id, timestamp, id, event_type, description, staff
             FROM {}.care_events WHERE patient_id = ? AND timestamp >= ? LIMIT ?",
            self.client.keyspace()
        );

        let result = self
            .client
            .session()
            .query_unpaged(query, (patient_id, since.timestamp_millis(), limit))
            .await?;

        let mut events = Vec::new();
        if let Some(rows) = result.rows {
            for row in rows {
                let (patient_id, timestamp, id, event_type, description, staff): (
                    String,
                    i64,
                    Uuid,
                    String,
                    String,
                    Option<String>,
                ) = row
                    .into_typed()
                    .map_err(|e| PersistenceError::InvalidData(e.to_string()))?;

                events.push(CareEvent {
                    id,
                    patient_id,
                    kind: CareEventKind::parse(&event_type),
                    description,
                    staff,
                    created_at: DateTime::from_timestamp_millis(timestamp)
                        .unwrap_or_else(Utc::now),
                });
            }
        }

        Ok(events)
    }
}

/// In-memory care event store for tests
#[derive(Default)]
pub struct InMemoryCareEventStore {
    events: RwLock<Vec<CareEvent>>,
}

impl InMemoryCareEventStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CareEventStore for InMemoryCareEventStore {
    async fn record(&self, event: &CareEvent) -> Result<(), PersistenceError> {
        self.events.write().push(event.clone());
        Ok(())
    }

    async fn recent_for_patient(
        &self,
        patient_id: &str,
        since: DateTime<Utc>,
        limit: i32,
    ) -> Result<Vec<CareEvent>, PersistenceError> {
        let events = self.events.read();
        let mut rows: Vec<CareEvent> = events
            .iter()
            .filter(|e| e.patient_id == patient_id && e.created_at >= since)
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
    use chrono::Duration;

    #[tokio::test]
    async fn test_recent_window_and_limit() {
        let store = InMemoryCareEventStore::new();
        let now = Utc::now();

        let mut old = CareEvent::new("p-100", CareEventKind::Meal, "breakfast 80%");
        old.created_at = now - Duration::hours(48);
        store.record(&old).await.unwrap();

        for i in 0..3 {
            let mut event =
                CareEvent::new("p-100", CareEventKind::Medication, "metoprolol given");
            event.created_at = now - Duration::hours(i);
            store.record(&event).await.unwrap();
        }

        let recent = store
            .recent_for_patient("p-100", now - Duration::hours(24), 2)
            .await
            .unwrap();
        assert_eq!(recent.len(), 2);
        assert!(recent[0].created_at >= recent[1].created_at);
    }

    #[test]
    fn test_kind_round_trip() {
        assert_eq!(CareEventKind::parse("vitals"), CareEventKind::Vitals);
        assert_eq!(CareEventKind::parse("mystery"), CareEventKind::Note);
        assert_eq!(CareEventKind::Incident.as_str(), "incident");
    }
}
