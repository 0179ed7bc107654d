//! Conversation feedback persistence

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{PersistenceError, ScyllaClient};

/// Family or resident feedback on a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub id: Uuid,
    pub session_id: String,
    pub user_id: Option<String>,
    /// 1 to 5
    pub rating: i32,
    pub helpful: Option<bool>,
    pub comment: Option<String>,
    pub agent_type: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Feedback store trait
#[async_trait]
pub trait FeedbackStore: Send + Sync {
    async fn submit(&self, record: &FeedbackRecord) -> Result<(), PersistenceError>;

    async fn list_for_session(
        &self,
        session_id: &str,
        limit: i32,
    ) -> Result<Vec<FeedbackRecord>, PersistenceError>;
}

/// ScyllaDB implementation of the feedback store
#[derive(Clone)]
pub struct ScyllaFeedbackStore {
    client: ScyllaClient,
}

impl ScyllaFeedbackStore {
    pub fn new(client: ScyllaClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FeedbackStore for ScyllaFeedbackStore {
    async fn submit(&self, record: &FeedbackRecord) -> Result<(), PersistenceError> {
        let query = format!(
            "INSERT INTO {}.feedback (
                session_id, timestamp, id, user_id, rating,
                helpful, comment, agent_type
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            self.client.keyspace()
        );

        self.client
            .session()
            .query_unpaged(
                query,
                (
                    &record.session_id,
                    record.created_at.timestamp_millis(),
                    record.id,
                    &record.user_id,
                    record.rating,
                    record.helpful,
                    &record.comment,
                    &record.agent_type,
                ),
            )
            .await?;

        tracing::info!(
            session_id = %record.session_id,
            rating = record.rating,
            "Feedback recorded"
        );

        Ok(())
    }

    async fn list_for_session(
        &self,
        session_id: &str,
        limit: i32,
    ) -> Result<Vec<FeedbackRecord>, PersistenceError> {
        let query = format!(
            "SELECT session_id, timestamp, id, user_id, rating,
                    helpful, comment, agent_type
             FROM {}.feedback WHERE session_id = ? LIMIT ?",
            self.client.keyspace()
        );

        let result = self
            .client
            .session()
            .query_unpaged(query, (session_id, limit))
            .await?;

        let mut records = Vec::new();
        if let Some(rows) = result.rows {
            for row in rows {
                let (session_id, timestamp, id, user_id, rating, helpful, comment, agent_type): (
                    String,
                    i64,
                    Uuid,
                    Option<String>,
                    i32,
                    Option<bool>,
                    Option<String>,
                    Option<String>,
                ) = row
                    .into_typed()
                    .map_err(|e| PersistenceError::InvalidData(e.to_string()))?;

                records.push(FeedbackRecord {
                    id,
                    session_id,
                    user_id,
                    rating,
                    helpful,
                    comment,
                    agent_type,
                    created_at: DateTime::from_timestamp_millis(timestamp)
                        .unwrap_or_else(Utc::now),
                });
            }
        }

        Ok(records)
    }
}

/// In-memory feedback store for tests
#[derive(Default)]
pub struct InMemoryFeedbackStore {
    records: RwLock<Vec<FeedbackRecord>>,
}

impl InMemoryFeedbackStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FeedbackStore for InMemoryFeedbackStore {
    async fn submit(&self, record: &FeedbackRecord) -> Result<(), PersistenceError> {
        self.records.write().push(record.clone());
        Ok(())
    }

    async fn list_for_session(
        &self,
        session_id: &str,
        limit: i32,
    ) -> Result<Vec<FeedbackRecord>, PersistenceError> {
        let records = self.records.read();
        Ok(records
            .iter()
            .filter(|r| r.session_id == session_id)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_submit_and_list() {
        let store = InMemoryFeedbackStore::new();
        let record = FeedbackRecord {
            id: Uuid::new_v4(),
            session_id: "s1".to_string(),
            user_id: Some("fm-1".to_string()),
            rating: 5,
            helpful: Some(true),
            comment: Some("quick and clear".to_string()),
            agent_type: Some("billing_specialist".to_string()),
            created_at: Utc::now(),
        };
        store.submit(&record).await.unwrap();

        let listed = store.list_for_session("s1", 10).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].rating, 5);
    }
}
