//! Conversation log persistence
//!
//! One row per handled message, partitioned by session. A day-bucketed
//! projection feeds metrics windows without scanning session partitions;
//! it is written best effort, the session row is the source of truth.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use sentinel_core::{Channel, ClassificationSource, IntentCategory, Sentiment};

use crate::{PersistenceError, ScyllaClient};

/// One handled message: request, response and routing annotations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationLogEntry {
    pub id: Uuid,
    pub session_id: String,
    pub user_id: Option<String>,
    pub channel: Channel,
    pub message: String,
    pub response: String,
    pub agent_type: String,
    pub intent: IntentCategory,
    pub confidence: f32,
    pub source: ClassificationSource,
    pub sentiment: Sentiment,
    pub topics: Vec<String>,
    pub escalated: bool,
    pub fallback: bool,
    pub latency_ms: u64,
    pub created_at: DateTime<Utc>,
    /// Message embedding for semantic lookups, when one was computed
    pub embedding: Option<Vec<f32>>,
}

/// Slim metrics row from the day projection
#[derive(Debug, Clone)]
pub struct ConversationDigest {
    pub created_at: DateTime<Utc>,
    pub session_id: String,
    pub agent_type: String,
    pub intent: IntentCategory,
    pub confidence: f32,
    pub sentiment: Sentiment,
    pub topics: Vec<String>,
    pub escalated: bool,
    pub fallback: bool,
    pub latency_ms: u64,
}

/// A logged message with its embedding, for nearest-neighbor votes
#[derive(Debug, Clone)]
pub struct EmbeddedMessage {
    pub message: String,
    pub intent: IntentCategory,
    pub embedding: Vec<f32>,
}

/// Conversation log store trait
#[async_trait]
pub trait ConversationLogStore: Send + Sync {
    /// Append one entry. Exactly one call per handled message.
    async fn append(&self, entry: &ConversationLogEntry) -> Result<(), PersistenceError>;

    /// Most recent `limit` entries for a session, oldest first
    async fn history(
        &self,
        session_id: &str,
        limit: i32,
    ) -> Result<Vec<ConversationLogEntry>, PersistenceError>;

    /// Digest rows newer than `since`, for metrics windows
    async fn digests_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<ConversationDigest>, PersistenceError>;

    /// Recent rows that carry an embedding
    async fn embedded_messages(&self, limit: i32)
        -> Result<Vec<EmbeddedMessage>, PersistenceError>;
}

fn day_key(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d").to_string()
}

/// ScyllaDB implementation of the conversation log
#[derive(Clone)]
pub struct ScyllaConversationLog {
    client: ScyllaClient,
}

impl ScyllaConversationLog {
    pub fn new(client: ScyllaClient) -> Self {
        Self { client }
    }

    fn row_to_entry(
        &self,
        row: scylla::frame::response::result::Row,
    ) -> Result<ConversationLogEntry, PersistenceError> {
        let (
            session_id,
            timestamp,
            id,
            user_id,
            channel,
            message,
            response,
            agent_type,
            intent,
            confidence,
            source,
            sentiment,
            topics,
            escalated,
            fallback,
            latency_ms,
        ): (
            String,
            i64,
            Uuid,
            Option<String>,
            String,
            String,
            String,
            String,
            String,
            f32,
            String,
            String,
            Option<Vec<String>>,
            bool,
            bool,
            i64,
        ) = row
            .into_typed()
            .map_err(|e| PersistenceError::InvalidData(e.to_string()))?;

        Ok(ConversationLogEntry {
            id,
            session_id,
            user_id,
            channel: Channel::parse(&channel).unwrap_or_default(),
            message,
            response,
            agent_type,
            intent: IntentCategory::parse(&intent).unwrap_or_default(),
            confidence,
            source: ClassificationSource::parse(&source).unwrap_or(ClassificationSource::Default),
            sentiment: Sentiment::parse(&sentiment).unwrap_or_default(),
            topics: topics.unwrap_or_default(),
            escalated,
            fallback,
            latency_ms: latency_ms.max(0) as u64,
            created_at: DateTime::from_timestamp_millis(timestamp).unwrap_or_else(Utc::now),
            embedding: None,
        })
    }
}

#[async_trait]
impl ConversationLogStore for ScyllaConversationLog {
    async fn append(&self, entry: &ConversationLogEntry) -> Result<(), PersistenceError> {
        let query = format!(
            "INSERT INTO {}.conversation_log (
                session_id, timestamp, id, user_id, channel,
                message, response, agent_type, intent, confidence,
                source, sentiment, topics, escalated, fallback,
                latency_ms
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            self.client.keyspace()
        );

        let timestamp = entry.created_at.timestamp_millis();

        self.client
            .session()
            .query_unpaged(
                query,
                (
                    &entry.session_id,
                    timestamp,
                    entry.id,
                    &entry.user_id,
                    entry.channel.as_str(),
                    &entry.message,
                    &entry.response,
                    &entry.agent_type,
                    entry.intent.as_str(),
                    entry.confidence,
                    entry.source.as_str(),
                    entry.sentiment.as_str(),
                    &entry.topics,
                    entry.escalated,
                    entry.fallback,
                    entry.latency_ms as i64,
                ),
            )
            .await?;

        if let Some(embedding) = &entry.embedding {
            let embedding_query = format!(
                "UPDATE {}.conversation_log SET embedding = ?
                 WHERE session_id = ? AND timestamp = ? AND id = ?",
                self.client.keyspace()
            );
            self.client
                .session()
                .query_unpaged(embedding_query, (embedding, &entry.session_id, timestamp, entry.id))
                .await?;
        }

        let day_query = format!(
            "INSERT INTO {}.conversation_log_by_day (
                day, timestamp, id, session_id, agent_type,
                intent, confidence, sentiment, topics, escalated,
                fallback, latency_ms
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            self.client.keyspace()
        );

        if let Err(e) = self
            .client
            .session()
            .query_unpaged(
                day_query,
                (
                    day_key(entry.created_at),
                    timestamp,
                    entry.id,
                    &entry.session_id,
                    &entry.agent_type,
                    entry.intent.as_str(),
                    entry.confidence,
                    entry.sentiment.as_str(),
                    &entry.topics,
                    entry.escalated,
                    entry.fallback,
                    entry.latency_ms as i64,
                ),
            )
            .await
        {
            tracing::warn!(id = %entry.id, error = %e, "Day projection write failed");
        }

        tracing::debug!(
            session_id = %entry.session_id,
            id = %entry.id,
            intent = %entry.intent,
            agent = %entry.agent_type,
            "Conversation entry logged"
        );

        Ok(())
    }

    async fn history(
        &self,
        session_id: &str,
        limit: i32,
    ) -> Result<Vec<ConversationLogEntry>, PersistenceError> {
        let query = format!(
            "SELECT session_id, timestamp, id, user_id, channel,
                    message, response, agent_type, intent, confidence,
                    source, sentiment, topics, escalated, fallback, latency_ms
             FROM {}.conversation_log WHERE session_id = ? LIMIT ?",
            self.client.keyspace()
        );

        let result = self
            .client
            .session()
            .query_unpaged(query, (session_id, limit))
            .await?;

        let mut entries = Vec::new();
        if let Some(rows) = result.rows {
            for row in rows {
                entries.push(self.row_to_entry(row)?);
            }
        }

        // Clustering order is newest first; callers want chronological
        entries.reverse();
        Ok(entries)
    }

    async fn digests_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<ConversationDigest>, PersistenceError> {
        let query = format!(
            "SELECT timestamp, session_id, agent_type, intent, confidence,
                    sentiment, topics, escalated, fallback, latency_ms
             FROM {}.conversation_log_by_day WHERE day = ? AND timestamp >= ?",
            self.client.keyspace()
        );

        let cutoff = since.timestamp_millis();
        let mut digests = Vec::new();
        let mut day = since.date_naive();
        let today = Utc::now().date_naive();

        while day <= today {
            let result = self
                .client
                .session()
                .query_unpaged(query.clone(), (day.format("%Y-%m-%d").to_string(), cutoff))
                .await?;

            if let Some(rows) = result.rows {
                for row in rows {
                    let (
                        timestamp,
                        session_id,
                        agent_type,
                        intent,
                        confidence,
                        sentiment,
                        topics,
                        escalated,
                        fallback,
                        latency_ms,
                    ): (
                        i64,
                        String,
                        String,
                        String,
                        f32,
                        String,
                        Option<Vec<String>>,
                        bool,
                        bool,
                        i64,
                    ) = row
                        .into_typed()
                        .map_err(|e| PersistenceError::InvalidData(e.to_string()))?;

                    digests.push(ConversationDigest {
                        created_at: DateTime::from_timestamp_millis(timestamp)
                            .unwrap_or_else(Utc::now),
                        session_id,
                        agent_type,
                        intent: IntentCategory::parse(&intent).unwrap_or_default(),
                        confidence,
                        sentiment: Sentiment::parse(&sentiment).unwrap_or_default(),
                        topics: topics.unwrap_or_default(),
                        escalated,
                        fallback,
                        latency_ms: latency_ms.max(0) as u64,
                    });
                }
            }

            match day.succ_opt() {
                Some(next) => day = next,
                None => break,
            }
        }

        Ok(digests)
    }

    async fn embedded_messages(
        &self,
        limit: i32,
    ) -> Result<Vec<EmbeddedMessage>, PersistenceError> {
        // Cross-partition scan, bounded by LIMIT. Acceptable for the small
        // corpus a facility produces; revisit if the table grows hot.
        let query = format!(
            "SELECT message, intent, embedding FROM {}.conversation_log LIMIT ?",
            self.client.keyspace()
        );

        let result = self.client.session().query_unpaged(query, (limit,)).await?;

        let mut messages = Vec::new();
        if let Some(rows) = result.rows {
            for row in rows {
                let (message, intent, embedding): (String, String, Option<Vec<f32>>) = row
                    .into_typed()
                    .map_err(|e| PersistenceError::InvalidData(e.to_string()))?;

                if let Some(embedding) = embedding {
                    messages.push(EmbeddedMessage {
                        message,
                        intent: IntentCategory::parse(&intent).unwrap_or_default(),
                        embedding,
                    });
                }
            }
        }

        Ok(messages)
    }
}

/// In-memory conversation log for tests and store-less deployments
#[derive(Default)]
pub struct InMemoryConversationLog {
    entries: RwLock<Vec<ConversationLogEntry>>,
}

impl InMemoryConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl ConversationLogStore for InMemoryConversationLog {
    async fn append(&self, entry: &ConversationLogEntry) -> Result<(), PersistenceError> {
        self.entries.write().push(entry.clone());
        Ok(())
    }

    async fn history(
        &self,
        session_id: &str,
        limit: i32,
    ) -> Result<Vec<ConversationLogEntry>, PersistenceError> {
        let entries = self.entries.read();
        let mut rows: Vec<ConversationLogEntry> = entries
            .iter()
            .filter(|e| e.session_id == session_id)
            .cloned()
            .collect();
        rows.sort_by_key(|e| e.created_at);
        let skip = rows.len().saturating_sub(limit.max(0) as usize);
        Ok(rows.split_off(skip))
    }

    async fn digests_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<ConversationDigest>, PersistenceError> {
        let entries = self.entries.read();
        Ok(entries
            .iter()
            .filter(|e| e.created_at >= since)
            .map(|e| ConversationDigest {
                created_at: e.created_at,
                session_id: e.session_id.clone(),
                agent_type: e.agent_type.clone(),
                intent: e.intent,
                confidence: e.confidence,
                sentiment: e.sentiment,
                topics: e.topics.clone(),
                escalated: e.escalated,
                fallback: e.fallback,
                latency_ms: e.latency_ms,
            })
            .collect())
    }

    async fn embedded_messages(
        &self,
        limit: i32,
    ) -> Result<Vec<EmbeddedMessage>, PersistenceError> {
        let entries = self.entries.read();
        Ok(entries
            .iter()
            .filter_map(|e| {
                e.embedding.as_ref().map(|embedding| EmbeddedMessage {
                    message: e.message.clone(),
                    intent: e.intent,
                    embedding: embedding.clone(),
                })
            })
            .take(limit.max(0) as usize)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn entry(session: &str, message: &str, at: DateTime<Utc>) -> ConversationLogEntry {
        ConversationLogEntry {
            id: Uuid::new_v4(),
            session_id: session.to_string(),
            user_id: None,
            channel: Channel::Chat,
            message: message.to_string(),
            response: "ok".to_string(),
            agent_type: "care_coordinator".to_string(),
            intent: IntentCategory::General,
            confidence: 0.5,
            source: ClassificationSource::Default,
            sentiment: Sentiment::Neutral,
            topics: Vec::new(),
            escalated: false,
            fallback: false,
            latency_ms: 12,
            created_at: at,
            embedding: None,
        }
    }

    #[tokio::test]
    async fn test_history_is_chronological_and_bounded() {
        let log = InMemoryConversationLog::new();
        let base = Utc::now();
        for i in 0..5 {
            log.append(&entry("s1", &format!("m{}", i), base + Duration::seconds(i)))
                .await
                .unwrap();
        }
        log.append(&entry("s2", "other", base)).await.unwrap();

        let history = log.history("s1", 3).await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].message, "m2");
        assert_eq!(history[2].message, "m4");
    }

    #[tokio::test]
    async fn test_digests_window() {
        let log = InMemoryConversationLog::new();
        let now = Utc::now();
        log.append(&entry("s1", "old", now - Duration::hours(30)))
            .await
            .unwrap();
        log.append(&entry("s1", "recent", now - Duration::hours(1)))
            .await
            .unwrap();

        let digests = log.digests_since(now - Duration::hours(24)).await.unwrap();
        assert_eq!(digests.len(), 1);
    }

    #[tokio::test]
    async fn test_embedded_messages_skip_rows_without_embeddings() {
        let log = InMemoryConversationLog::new();
        let mut with = entry("s1", "embedded", Utc::now());
        with.embedding = Some(vec![0.1, 0.2]);
        log.append(&with).await.unwrap();
        log.append(&entry("s1", "plain", Utc::now())).await.unwrap();

        let rows = log.embedded_messages(10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].message, "embedded");
    }

    #[test]
    fn test_day_key() {
        let at = DateTime::from_timestamp_millis(1_700_000_000_000).unwrap();
        assert_eq!(day_key(at), "2023-11-14");
    }
}
