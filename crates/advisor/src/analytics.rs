//! Conversation analytics
//!
//! Rolls the day-bucketed digest rows into the numbers the dashboard
//! shows. Pure aggregation; the advisor fetches the digest window and
//! hands it here.

use serde::Serialize;
use std::collections::{HashMap, HashSet};

use sentinel_persistence::ConversationDigest;

/// One topic and how often it came up
#[derive(Debug, Clone, Serialize)]
pub struct TopicCount {
    pub topic: String,
    pub count: u64,
}

/// Aggregate usage over a time window
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageReport {
    pub window_hours: i64,
    pub total_messages: u64,
    pub unique_sessions: u64,
    pub escalations: u64,
    pub fallbacks: u64,
    pub avg_confidence: f32,
    pub avg_latency_ms: u64,
    pub by_intent: HashMap<String, u64>,
    pub by_agent: HashMap<String, u64>,
    pub by_sentiment: HashMap<String, u64>,
    pub top_topics: Vec<TopicCount>,
}

impl UsageReport {
    pub fn from_digests(window_hours: i64, digests: &[ConversationDigest]) -> Self {
        let mut report = UsageReport {
            window_hours,
            ..Default::default()
        };

        if digests.is_empty() {
            return report;
        }

        let mut sessions: HashSet<&str> = HashSet::new();
        let mut topic_counts: HashMap<&str, u64> = HashMap::new();
        let mut confidence_sum = 0.0f64;
        let mut latency_sum = 0u64;

        for digest in digests {
            report.total_messages += 1;
            sessions.insert(digest.session_id.as_str());

            if digest.escalated {
                report.escalations += 1;
            }
            if digest.fallback {
                report.fallbacks += 1;
            }

            confidence_sum += digest.confidence as f64;
            latency_sum += digest.latency_ms;

            *report
                .by_intent
                .entry(digest.intent.as_str().to_string())
                .or_insert(0) += 1;
            *report
                .by_agent
                .entry(digest.agent_type.clone())
                .or_insert(0) += 1;
            *report
                .by_sentiment
                .entry(digest.sentiment.as_str().to_string())
                .or_insert(0) += 1;

            for topic in &digest.topics {
                *topic_counts.entry(topic.as_str()).or_insert(0) += 1;
            }
        }

        report.unique_sessions = sessions.len() as u64;
        report.avg_confidence = (confidence_sum / report.total_messages as f64) as f32;
        report.avg_latency_ms = latency_sum / report.total_messages;

        let mut topics: Vec<TopicCount> = topic_counts
            .into_iter()
            .map(|(topic, count)| TopicCount {
                topic: topic.to_string(),
                count,
            })
            .collect();
        // Count descending, name ascending so equal counts order stably
        topics.sort_by(|a, b| b.count.cmp(&a.count).then(a.topic.cmp(&b.topic)));
        topics.truncate(5);
        report.top_topics = topics;

        report
    }
}
