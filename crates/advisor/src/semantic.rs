//! Nearest-neighbor intent lookup over logged conversations
//!
//! Production wiring for the classifier's semantic seam: embed the message,
//! scan recent embedded log rows, and return the categories of the
//! neighbors above the similarity floor, best first. The corpus is the
//! conversation log itself, so the lookup gets better as real traffic
//! accumulates without any training step.

use async_trait::async_trait;
use std::cmp::Ordering;
use std::sync::Arc;

use sentinel_core::IntentCategory;
use sentinel_intent::{SemanticError, SemanticIndex};
use sentinel_llm::{cosine_similarity, EmbeddingProvider};
use sentinel_persistence::ConversationLogStore;

pub struct SemanticIntentIndex {
    embedder: Arc<dyn EmbeddingProvider>,
    log: Arc<dyn ConversationLogStore>,
    /// Cosine similarity floor for a neighbor to count
    threshold: f32,
    /// Recent rows scanned per lookup
    scan_limit: i32,
}

impl SemanticIntentIndex {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        log: Arc<dyn ConversationLogStore>,
        threshold: f32,
        scan_limit: usize,
    ) -> Self {
        Self {
            embedder,
            log,
            threshold,
            scan_limit: scan_limit as i32,
        }
    }
}

#[async_trait]
impl SemanticIndex for SemanticIntentIndex {
    async fn nearest_categories(
        &self,
        text: &str,
        limit: usize,
    ) -> Result<Vec<IntentCategory>, SemanticError> {
        let query = self
            .embedder
            .embed(text)
            .await
            .map_err(|e| SemanticError::Provider(e.to_string()))?;

        let rows = self
            .log
            .embedded_messages(self.scan_limit)
            .await
            .map_err(|e| SemanticError::Store(e.to_string()))?;

        let mut scored: Vec<(f32, IntentCategory)> = rows
            .iter()
            .filter_map(|row| {
                let similarity = cosine_similarity(&query, &row.embedding);
                (similarity >= self.threshold).then_some((similarity, row.intent))
            })
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));

        Ok(scored
            .into_iter()
            .take(limit)
            .map(|(_, category)| category)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_llm::LlmError;
    use sentinel_persistence::{
        ConversationLogEntry, InMemoryConversationLog,
    };

    struct AxisEmbedder;

    #[async_trait]
    impl EmbeddingProvider for AxisEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
            // Maps "money"-flavored text onto one axis, everything else
            // onto the other, so similarities are exact in the test.
            if text.contains("pay") || text.contains("invoice") {
                Ok(vec![1.0, 0.0])
            } else {
                Ok(vec![0.0, 1.0])
            }
        }

        fn model_name(&self) -> &str {
            "axis-test"
        }
    }

    fn embedded_entry(message: &str, intent: IntentCategory, embedding: Vec<f32>) -> ConversationLogEntry {
        ConversationLogEntry {
            id: uuid::Uuid::new_v4(),
            session_id: "s1".to_string(),
            user_id: None,
            channel: Default::default(),
            message: message.to_string(),
            response: "ok".to_string(),
            agent_type: "care_coordinator".to_string(),
            intent,
            confidence: 0.9,
            source: sentinel_core::ClassificationSource::Rule,
            sentiment: Default::default(),
            topics: Vec::new(),
            escalated: false,
            fallback: false,
            latency_ms: 5,
            created_at: chrono::Utc::now(),
            embedding: Some(embedding),
        }
    }

    #[tokio::test]
    async fn test_neighbors_above_threshold_win() {
        let log = Arc::new(InMemoryConversationLog::new());
        log.append(&embedded_entry(
            "how do I pay this",
            IntentCategory::Billing,
            vec![1.0, 0.0],
        ))
        .await
        .unwrap();
        log.append(&embedded_entry(
            "mom seems sad",
            IntentCategory::Wellness,
            vec![0.0, 1.0],
        ))
        .await
        .unwrap();

        let index = SemanticIntentIndex::new(Arc::new(AxisEmbedder), log, 0.7, 64);
        let neighbors = index.nearest_categories("where do I pay", 3).await.unwrap();
        assert_eq!(neighbors, vec![IntentCategory::Billing]);
    }

    #[tokio::test]
    async fn test_empty_corpus_returns_no_neighbors() {
        let log = Arc::new(InMemoryConversationLog::new());
        let index = SemanticIntentIndex::new(Arc::new(AxisEmbedder), log, 0.7, 64);
        let neighbors = index.nearest_categories("anything", 3).await.unwrap();
        assert!(neighbors.is_empty());
    }
}
