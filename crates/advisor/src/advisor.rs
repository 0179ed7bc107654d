//! The advisor pipeline
//!
//! One message in, one reply out. The stages run classify -> select ->
//! escalate-or-generate -> log, and every stage degrades instead of
//! erroring: classification falls back to the general category, a tripped
//! escalation rule replies with its canned safety response, a failed model
//! call replies with the persona's fallback message, and a failed log
//! write is logged and absorbed. Exactly one conversation-log row is
//! written per handled message regardless of path.

use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use sentinel_config::AdvisorConfig;
use sentinel_core::{AgentPersona, Channel, Classification, TurnRole};
use sentinel_intent::IntentClassifier;
use sentinel_llm::{ChatMessage, ChatModel, CompletionRequest, EmbeddingProvider};
use sentinel_persistence::{
    ConversationLogEntry, EscalationEvent, FeedbackRecord, PersistenceLayer,
};

use crate::analytics::UsageReport;
use crate::collaborate::{
    self, CollaborationOutcome, Contribution, NO_CONTRIBUTIONS_MESSAGE,
};
use crate::context::{ContextBuilder, ContextBundle};
use crate::escalation::{EscalationMatch, EscalationNotifier, EscalationPolicy, TracingNotifier};
use crate::registry::AgentRegistry;
use crate::AdvisorError;

/// Agent type recorded on collaboration log rows
const COLLABORATION_AGENT: &str = "collaboration";

/// One inbound message
#[derive(Debug, Clone)]
pub struct ChatInput {
    pub message: String,
    /// Absent or blank means "start a new session"
    pub session_id: Option<String>,
    /// Family-member account, when the caller is signed in
    pub user_id: Option<String>,
    pub channel: Channel,
}

impl ChatInput {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            session_id: None,
            user_id: None,
            channel: Channel::Chat,
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_channel(mut self, channel: Channel) -> Self {
        self.channel = channel;
        self
    }
}

/// The reply plus everything a caller may surface
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    pub session_id: String,
    pub response: String,
    /// Display name of the persona that answered
    pub agent: String,
    pub agent_type: String,
    pub classification: Classification,
    pub escalated: bool,
    /// Which escalation rule category fired, when one did
    pub escalation_type: Option<String>,
    /// True when the reply is the persona's canned fallback message
    pub fallback: bool,
    pub latency_ms: u64,
    pub log_id: Uuid,
}

/// The routing pipeline and its collaborators
pub struct Advisor {
    registry: Arc<AgentRegistry>,
    classifier: IntentClassifier,
    context: ContextBuilder,
    policy: EscalationPolicy,
    notifier: Arc<dyn EscalationNotifier>,
    model: Arc<dyn ChatModel>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    stores: PersistenceLayer,
    config: AdvisorConfig,
}

impl Advisor {
    pub fn new(
        registry: Arc<AgentRegistry>,
        model: Arc<dyn ChatModel>,
        stores: PersistenceLayer,
        policy: EscalationPolicy,
        config: AdvisorConfig,
    ) -> Self {
        let context = ContextBuilder::new(
            stores.conversations.clone(),
            stores.directory.clone(),
            stores.care_events.clone(),
            stores.invoices.clone(),
            &config,
        );

        Self {
            registry,
            classifier: IntentClassifier::new(),
            context,
            policy,
            notifier: Arc::new(TracingNotifier),
            model,
            embedder: None,
            stores,
            config,
        }
    }

    /// Swap in a classifier, e.g. one with the semantic fallback attached
    pub fn with_classifier(mut self, classifier: IntentClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn EscalationNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Embedder used to annotate log rows, growing the semantic corpus
    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Handle one message end to end. Never errors: every failure path
    /// degrades to a reply the family can act on.
    pub async fn handle_chat(&self, input: ChatInput) -> ChatOutcome {
        let started = Instant::now();
        let session_id = input
            .session_id
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(new_session_id);

        let classification = self.classifier.classify(&input.message).await;
        let persona = self.registry.select(classification.category).await;

        tracing::info!(
            session_id = %session_id,
            intent = %classification.category,
            confidence = classification.confidence,
            source = %classification.source.as_str(),
            agent = %persona.agent_type,
            "Message routed"
        );

        let escalation = self.policy.check(&input.message, &classification);

        let (response, fallback) = match &escalation {
            Some(hit) => (hit.auto_response.clone(), false),
            None => {
                let bundle = self
                    .context
                    .build(&session_id, input.user_id.as_deref(), &persona)
                    .await;
                self.generate(&input.message, &persona, &bundle).await
            }
        };

        // Soft-fail annotation; only worth computing on organic replies
        let embedding = match (&escalation, &self.embedder) {
            (None, Some(embedder)) => match embedder.embed(&input.message).await {
                Ok(vector) => Some(vector),
                Err(e) => {
                    tracing::debug!(error = %e, "Embedding annotation skipped");
                    None
                }
            },
            _ => None,
        };

        let latency_ms = started.elapsed().as_millis() as u64;
        let entry = ConversationLogEntry {
            id: Uuid::new_v4(),
            session_id: session_id.clone(),
            user_id: input.user_id.clone(),
            channel: input.channel,
            message: input.message.clone(),
            response: response.clone(),
            agent_type: persona.agent_type.clone(),
            intent: classification.category,
            confidence: classification.confidence,
            source: classification.source,
            sentiment: classification.sentiment,
            topics: classification.topics.clone(),
            escalated: escalation.is_some(),
            fallback,
            latency_ms,
            created_at: Utc::now(),
            embedding,
        };

        if let Err(e) = self.stores.conversations.append(&entry).await {
            tracing::error!(
                error = %e,
                session_id = %session_id,
                "Conversation log write failed"
            );
        }

        if let Some(hit) = &escalation {
            self.record_escalation(&entry, hit).await;
        }

        ChatOutcome {
            session_id,
            response,
            agent: persona.name.clone(),
            agent_type: persona.agent_type,
            classification,
            escalated: escalation.is_some(),
            escalation_type: escalation.map(|hit| hit.escalation_type),
            fallback,
            latency_ms,
            log_id: entry.id,
        }
    }

    /// One model call; any failure maps to the persona's fallback message.
    /// Returns the reply text and whether it is the fallback.
    async fn generate(
        &self,
        message: &str,
        persona: &AgentPersona,
        bundle: &ContextBundle,
    ) -> (String, bool) {
        let mut system = persona.system_prompt.clone();
        if let Some(notes) = bundle.render_notes() {
            system.push_str("\n\n");
            system.push_str(&notes);
        }

        let mut messages: Vec<ChatMessage> = bundle
            .history
            .iter()
            .map(|turn| match turn.role {
                TurnRole::User => ChatMessage::user(turn.content.clone()),
                TurnRole::Assistant => ChatMessage::assistant(turn.content.clone()),
            })
            .collect();
        messages.push(ChatMessage::user(message));

        let request = CompletionRequest::new(messages)
            .with_system(system)
            .with_max_tokens(persona.max_tokens)
            .with_temperature(persona.temperature);

        match self.model.generate(&request).await {
            Ok(completion) => (completion.text, false),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    agent = %persona.agent_type,
                    "Model call failed; replying with fallback message"
                );
                (persona.fallback_message.clone(), true)
            }
        }
    }

    /// Write the escalation event and kick off the out-of-band notification.
    /// Both are best effort; the safety response is already on its way back.
    async fn record_escalation(&self, entry: &ConversationLogEntry, hit: &EscalationMatch) {
        let mut event = EscalationEvent::new(
            &entry.session_id,
            entry.id,
            &hit.rule,
            &hit.escalation_type,
            &entry.message,
        );
        event.matched = hit.matched.clone();
        event.targets = hit.targets.clone();

        if let Err(e) = self.stores.escalations.record(&event).await {
            tracing::error!(
                error = %e,
                session_id = %entry.session_id,
                "Escalation event write failed"
            );
        }

        let notifier = self.notifier.clone();
        tokio::spawn(async move {
            if let Err(e) = notifier.notify(&event).await {
                tracing::warn!(error = %e, "Escalation notification failed");
            }
        });
    }

    /// Fan a question out to the named personas and synthesize the answers.
    ///
    /// Unknown agent types and per-persona failures become failed
    /// contributions rather than errors; only a request that names no
    /// usable persona at all is rejected.
    pub async fn collaborate(
        &self,
        message: &str,
        agent_types: &[String],
        session_id: Option<String>,
    ) -> Result<CollaborationOutcome, AdvisorError> {
        let started = Instant::now();
        let session_id = session_id
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(new_session_id);

        let mut personas = Vec::new();
        let mut contributions = Vec::new();
        for agent_type in agent_types {
            match self.registry.by_type(agent_type).await {
                Some(persona) => personas.push(persona),
                None => contributions.push(Contribution::failed(
                    agent_type,
                    agent_type,
                    "unknown agent type".to_string(),
                )),
            }
        }

        if personas.is_empty() {
            return Err(AdvisorError::InvalidRequest(
                "no valid agents specified".to_string(),
            ));
        }

        tracing::info!(
            session_id = %session_id,
            agents = personas.len(),
            "Collaboration started"
        );

        let asks = personas
            .iter()
            .map(|persona| self.ask_persona(persona, message));
        contributions.extend(join_all(asks).await);

        let any_success = contributions.iter().any(|c| c.success);
        let (synthesis, degraded) = if !any_success {
            (NO_CONTRIBUTIONS_MESSAGE.to_string(), true)
        } else {
            let request = collaborate::synthesis_request(
                message,
                &contributions,
                self.config.synthesis_max_tokens,
                self.config.synthesis_temperature,
            );
            match self.model.generate(&request).await {
                Ok(completion) => (completion.text, false),
                Err(e) => {
                    tracing::warn!(error = %e, "Synthesis call failed; stitching contributions");
                    (collaborate::stitched_contributions(&contributions), true)
                }
            }
        };

        let classification = self.classifier.classify_rules(message);
        let latency_ms = started.elapsed().as_millis() as u64;
        let entry = ConversationLogEntry {
            id: Uuid::new_v4(),
            session_id: session_id.clone(),
            user_id: None,
            channel: Channel::Chat,
            message: message.to_string(),
            response: synthesis.clone(),
            agent_type: COLLABORATION_AGENT.to_string(),
            intent: classification.category,
            confidence: classification.confidence,
            source: classification.source,
            sentiment: classification.sentiment,
            topics: classification.topics,
            escalated: false,
            fallback: degraded,
            latency_ms,
            created_at: Utc::now(),
            embedding: None,
        };
        if let Err(e) = self.stores.conversations.append(&entry).await {
            tracing::error!(
                error = %e,
                session_id = %session_id,
                "Conversation log write failed"
            );
        }

        Ok(CollaborationOutcome {
            session_id,
            synthesis,
            contributions,
            degraded,
        })
    }

    async fn ask_persona(&self, persona: &AgentPersona, message: &str) -> Contribution {
        let request = CompletionRequest::new(vec![ChatMessage::user(message)])
            .with_system(persona.system_prompt.clone())
            .with_max_tokens(persona.max_tokens)
            .with_temperature(persona.temperature);

        match self.model.generate(&request).await {
            Ok(completion) => {
                Contribution::succeeded(&persona.name, &persona.agent_type, completion.text)
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    agent = %persona.agent_type,
                    "Contribution failed"
                );
                Contribution::failed(&persona.name, &persona.agent_type, e.to_string())
            }
        }
    }

    /// Classifier plus selector only: which persona would take this message
    pub async fn route_preview(&self, message: &str) -> (AgentPersona, Classification) {
        let classification = self.classifier.classify(message).await;
        let persona = self.registry.select(classification.category).await;
        (persona, classification)
    }

    /// Recent log rows for one session, oldest first
    pub async fn conversation(
        &self,
        session_id: &str,
        limit: i32,
    ) -> Result<Vec<ConversationLogEntry>, AdvisorError> {
        Ok(self.stores.conversations.history(session_id, limit).await?)
    }

    /// Escalation events for one session, newest first
    pub async fn escalations(
        &self,
        session_id: &str,
        limit: i32,
    ) -> Result<Vec<EscalationEvent>, AdvisorError> {
        Ok(self
            .stores
            .escalations
            .list_for_session(session_id, limit)
            .await?)
    }

    pub async fn submit_feedback(&self, record: &FeedbackRecord) -> Result<(), AdvisorError> {
        self.stores.feedback.submit(record).await?;
        tracing::info!(
            session_id = %record.session_id,
            rating = record.rating,
            "Feedback recorded"
        );
        Ok(())
    }

    /// Usage aggregates over the trailing window
    pub async fn usage_report(&self, hours: i64) -> Result<UsageReport, AdvisorError> {
        let since = Utc::now() - chrono::Duration::hours(hours);
        let digests = self.stores.conversations.digests_since(since).await?;
        Ok(UsageReport::from_digests(hours, &digests))
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    /// Whether the chat model answers its health probe
    pub async fn model_available(&self) -> bool {
        self.model.is_available().await
    }
}

/// Session ids look like `session_1714170000000_k3qzt7m`: the epoch millis
/// plus a short random suffix, sortable and unguessable enough for a chat
/// widget.
fn new_session_id() -> String {
    use rand::Rng;

    const CHARSET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut rng = rand::thread_rng();
    let suffix: String = (0..7)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect();
    format!("session_{}_{}", Utc::now().timestamp_millis(), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_shape() {
        let id = new_session_id();
        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "session");
        assert!(parts[1].parse::<i64>().unwrap() > 0);
        assert_eq!(parts[2].len(), 7);
        assert!(parts[2]
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }

    #[test]
    fn test_session_ids_are_unique() {
        let a = new_session_id();
        let b = new_session_id();
        assert_ne!(a, b);
    }

    #[test]
    fn test_chat_input_builder() {
        let input = ChatInput::new("hello")
            .with_session("s1")
            .with_user("fm-1")
            .with_channel(Channel::Voice);
        assert_eq!(input.message, "hello");
        assert_eq!(input.session_id.as_deref(), Some("s1"));
        assert_eq!(input.user_id.as_deref(), Some("fm-1"));
        assert_eq!(input.channel, Channel::Voice);
    }
}
