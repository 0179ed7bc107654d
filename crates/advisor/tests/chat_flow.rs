//! Integration tests for the chat pipeline (classify -> select -> respond -> log)
//!
//! These tests run the full advisor against in-memory stores and a scripted
//! chat model, and verify the degradation paths: escalation, model failure,
//! and collaboration with partial agent outages.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use sentinel_advisor::{
    Advisor, AdvisorError, AgentRegistry, ChatInput, EscalationPolicy, StaticCatalogSource,
    NO_CONTRIBUTIONS_MESSAGE,
};
use sentinel_config::{AdvisorConfig, EscalationConfig, PersonaCatalog};
use sentinel_core::IntentCategory;
use sentinel_llm::{ChatModel, Completion, CompletionRequest, FinishReason, LlmError, Role};
use sentinel_persistence::{
    CareEvent, CareEventKind, FamilyMember, Invoice, InvoiceStatus, Patient, PersistenceLayer,
};

/// Chat model that pops scripted outcomes and records every request it sees.
/// Once the script runs out it answers "Understood."
struct ScriptedModel {
    script: Mutex<VecDeque<Result<String, LlmError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedModel {
    fn new(script: Vec<Result<String, LlmError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn replying(text: &str) -> Arc<Self> {
        Self::new(vec![Ok(text.to_string())])
    }

    fn calls(&self) -> usize {
        self.requests.lock().len()
    }

    fn request(&self, index: usize) -> CompletionRequest {
        self.requests.lock()[index].clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn generate(&self, request: &CompletionRequest) -> Result<Completion, LlmError> {
        self.requests.lock().push(request.clone());
        let next = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok("Understood.".to_string()));
        next.map(|text| Completion {
            text,
            input_tokens: 40,
            output_tokens: 12,
            latency_ms: 5,
            finish_reason: FinishReason::Stop,
        })
    }

    async fn is_available(&self) -> bool {
        true
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// Advisor over in-memory stores, built-in personas, and default escalation
/// rules
async fn advisor_with(model: Arc<ScriptedModel>) -> (Advisor, PersistenceLayer) {
    let stores = sentinel_persistence::init_in_memory();
    let source = Arc::new(StaticCatalogSource::new(PersonaCatalog::default()));
    let registry = Arc::new(
        AgentRegistry::new(source, Duration::from_secs(300))
            .await
            .unwrap(),
    );
    let advisor = Advisor::new(
        registry,
        model,
        stores.clone(),
        EscalationPolicy::from_config(&EscalationConfig::default().rules),
        AdvisorConfig::default(),
    );
    (advisor, stores)
}

/// A fall report trips the escalation policy: canned safety response, no
/// model call, and an escalation event referencing the log row
#[tokio::test]
async fn test_emergency_message_escalates() {
    let model = ScriptedModel::replying("should never be used");
    let (advisor, stores) = advisor_with(model.clone()).await;

    let outcome = advisor
        .handle_chat(ChatInput::new("My mom fell and isn't responding"))
        .await;

    assert!(outcome.escalated);
    assert_eq!(outcome.escalation_type.as_deref(), Some("medical_emergency"));
    assert!(!outcome.fallback);
    assert!(outcome.response.contains("911"));
    assert!(outcome.response.contains("(215) 774-0743"));
    assert_eq!(model.calls(), 0);

    let events = advisor.escalations(&outcome.session_id, 10).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].log_id, outcome.log_id);
    assert_eq!(events[0].rule, "medical_emergency");
    assert_eq!(events[0].matched.as_deref(), Some("fell"));
    assert!(events[0].targets.iter().any(|t| t == "on_call_nurse"));

    let history = stores
        .conversations
        .history(&outcome.session_id, 10)
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert!(history[0].escalated);
    assert_eq!(history[0].response, outcome.response);
}

/// Billing vocabulary routes to the billing specialist at rule confidence
#[tokio::test]
async fn test_billing_question_routes_to_specialist() {
    let model = ScriptedModel::replying("Memory care starts at $5,200 per month.");
    let (advisor, _stores) = advisor_with(model.clone()).await;

    let outcome = advisor
        .handle_chat(ChatInput::new("How much does memory care cost per month?"))
        .await;

    assert_eq!(outcome.agent_type, "billing_specialist");
    assert_eq!(outcome.classification.category, IntentCategory::Billing);
    assert!((outcome.classification.confidence - 0.9).abs() < f32::EPSILON);
    assert!(!outcome.escalated);
    assert!(!outcome.fallback);
    assert_eq!(outcome.response, "Memory care starts at $5,200 per month.");
    assert_eq!(model.calls(), 1);
}

/// A plain greeting falls through to the default persona at low confidence
#[tokio::test]
async fn test_greeting_gets_default_persona() {
    let model = ScriptedModel::replying("Hello! How can I help your family today?");
    let (advisor, _stores) = advisor_with(model).await;

    let outcome = advisor.handle_chat(ChatInput::new("Hi")).await;

    assert_eq!(outcome.agent_type, "care_coordinator");
    assert_eq!(outcome.classification.category, IntentCategory::General);
    assert!((outcome.classification.confidence - 0.5).abs() < f32::EPSILON);
    assert!(!outcome.escalated);
}

/// A model failure degrades to the persona's canned fallback and the log
/// row is still written, flagged as a fallback
#[tokio::test]
async fn test_model_failure_returns_fallback() {
    let model = ScriptedModel::new(vec![Err(LlmError::Timeout)]);
    let (advisor, stores) = advisor_with(model.clone()).await;

    let outcome = advisor
        .handle_chat(ChatInput::new("What activities are planned this week?"))
        .await;

    assert!(outcome.fallback);
    assert!(!outcome.escalated);
    assert!(outcome.response.contains("(215) 774-0743"));
    assert_eq!(model.calls(), 1);

    let history = stores
        .conversations
        .history(&outcome.session_id, 10)
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert!(history[0].fallback);
}

/// Prior turns from the same session ride along in the model request
#[tokio::test]
async fn test_history_rides_along() {
    let model = ScriptedModel::new(vec![
        Ok("Welcome back.".to_string()),
        Ok("She had a quiet morning.".to_string()),
    ]);
    let (advisor, _stores) = advisor_with(model.clone()).await;

    advisor
        .handle_chat(ChatInput::new("Hello there").with_session("s-history"))
        .await;
    let second = advisor
        .handle_chat(ChatInput::new("Anything new today?").with_session("s-history"))
        .await;

    assert_eq!(second.session_id, "s-history");
    assert_eq!(model.calls(), 2);

    let first_request = model.request(0);
    assert_eq!(first_request.messages.len(), 1);

    // user + assistant from the first exchange, then the new message
    let second_request = model.request(1);
    assert_eq!(second_request.messages.len(), 3);
    assert_eq!(second_request.messages[0].content, "Hello there");
    assert_eq!(second_request.messages[0].role, Role::User);
    assert_eq!(second_request.messages[1].content, "Welcome back.");
    assert_eq!(second_request.messages[1].role, Role::Assistant);
    assert_eq!(second_request.messages[2].content, "Anything new today?");
}

/// Facility records ride along only for personas scoped to them
#[tokio::test]
async fn test_records_gated_by_persona_scope() {
    let model = ScriptedModel::new(vec![
        Ok("There is one open invoice.".to_string()),
        Ok("She joined the walking group this morning.".to_string()),
    ]);
    let (advisor, stores) = advisor_with(model.clone()).await;

    stores
        .directory
        .upsert_patient(&Patient {
            patient_id: "p-7".to_string(),
            name: "Eleanor Reyes".to_string(),
            room: Some("214".to_string()),
            care_level: Some("memory_care".to_string()),
            admitted_at: None,
        })
        .await
        .unwrap();
    stores
        .directory
        .upsert_family_member(&FamilyMember {
            user_id: "fm-7".to_string(),
            name: "Maria Reyes".to_string(),
            relationship: "daughter".to_string(),
            patient_id: "p-7".to_string(),
            phone: None,
            email: None,
        })
        .await
        .unwrap();
    stores
        .care_events
        .record(&CareEvent::new(
            "p-7",
            CareEventKind::Activity,
            "Joined the morning walking group",
        ))
        .await
        .unwrap();
    stores
        .invoices
        .upsert(&Invoice {
            invoice_id: "INV-2025-0141".to_string(),
            patient_id: "p-7".to_string(),
            amount_cents: 425_000,
            status: InvoiceStatus::Open,
            due_date: chrono::NaiveDate::from_ymd_opt(2025, 11, 1).unwrap(),
            issued_at: chrono::Utc::now(),
            description: Some("October room and board".to_string()),
        })
        .await
        .unwrap();

    // billing persona sees invoices but not care notes
    let outcome = advisor
        .handle_chat(ChatInput::new("Is there an open invoice on the account?").with_user("fm-7"))
        .await;
    assert_eq!(outcome.agent_type, "billing_specialist");
    let system = model.request(0).system.unwrap();
    assert!(system.contains("INV-2025-0141"));
    assert!(system.contains("Maria Reyes"));
    assert!(!system.contains("walking group"));

    // the default persona sees care notes but not invoices
    let outcome = advisor
        .handle_chat(ChatInput::new("How is she doing today?").with_user("fm-7"))
        .await;
    assert_eq!(outcome.agent_type, "care_coordinator");
    let system = model.request(1).system.unwrap();
    assert!(system.contains("walking group"));
    assert!(system.contains("Eleanor Reyes"));
    assert!(!system.contains("INV-2025-0141"));
}

/// Session ids are minted when absent or blank, preserved when present
#[tokio::test]
async fn test_session_id_handling() {
    let model = ScriptedModel::new(vec![]);
    let (advisor, _stores) = advisor_with(model).await;

    let minted = advisor.handle_chat(ChatInput::new("Hello")).await;
    assert!(minted.session_id.starts_with("session_"));

    let blank = advisor
        .handle_chat(ChatInput::new("Hello").with_session("   "))
        .await;
    assert!(blank.session_id.starts_with("session_"));
    assert_ne!(blank.session_id, minted.session_id);

    let kept = advisor
        .handle_chat(ChatInput::new("Hello").with_session("widget-42"))
        .await;
    assert_eq!(kept.session_id, "widget-42");
}

/// Collaboration swallows a failed contributor and synthesizes the rest
#[tokio::test]
async fn test_collaborate_synthesizes_partial_results() {
    let model = ScriptedModel::new(vec![
        Err(LlmError::Api("overloaded".to_string())),
        Ok("Monthly memory care runs $5,200.".to_string()),
        Ok("Combined answer".to_string()),
    ]);
    let (advisor, stores) = advisor_with(model.clone()).await;

    let outcome = advisor
        .collaborate(
            "What does memory care cost and what does it include?",
            &[
                "medical_assistant".to_string(),
                "billing_specialist".to_string(),
            ],
            None,
        )
        .await
        .unwrap();

    assert_eq!(outcome.synthesis, "Combined answer");
    assert!(!outcome.degraded);
    assert_eq!(outcome.contributions.len(), 2);
    assert!(!outcome.contributions[0].success);
    assert!(outcome.contributions[1].success);

    // the synthesis prompt carries only the successful contribution
    let synthesis_request = model.request(2);
    let prompt = &synthesis_request.messages[0].content;
    assert!(prompt.contains("Monthly memory care runs $5,200."));
    assert!(!prompt.contains("overloaded"));

    let history = stores
        .conversations
        .history(&outcome.session_id, 10)
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].agent_type, "collaboration");
}

/// Unknown agent types become failed contributions; a request naming none
/// that resolve is rejected outright
#[tokio::test]
async fn test_collaborate_unknown_agents() {
    let model = ScriptedModel::new(vec![
        Ok("Wellness take".to_string()),
        Ok("Synthesis".to_string()),
    ]);
    let (advisor, _stores) = advisor_with(model).await;

    let err = advisor
        .collaborate("hello", &["made_up".to_string()], None)
        .await;
    assert!(matches!(err, Err(AdvisorError::InvalidRequest(_))));

    let outcome = advisor
        .collaborate(
            "hello",
            &["made_up".to_string(), "wellness_companion".to_string()],
            None,
        )
        .await
        .unwrap();
    assert_eq!(outcome.contributions.len(), 2);
    assert!(outcome
        .contributions
        .iter()
        .any(|c| !c.success && c.error.as_deref() == Some("unknown agent type")));
    assert_eq!(outcome.synthesis, "Synthesis");
}

/// Every contributor failing yields the canned no-contributions notice
/// without a synthesis call
#[tokio::test]
async fn test_collaborate_all_agents_down() {
    let model = ScriptedModel::new(vec![Err(LlmError::Timeout), Err(LlmError::Timeout)]);
    let (advisor, _stores) = advisor_with(model.clone()).await;

    let outcome = advisor
        .collaborate(
            "anyone there?",
            &[
                "medical_assistant".to_string(),
                "billing_specialist".to_string(),
            ],
            None,
        )
        .await
        .unwrap();

    assert_eq!(outcome.synthesis, NO_CONTRIBUTIONS_MESSAGE);
    assert!(outcome.degraded);
    assert_eq!(model.calls(), 2);
}

/// A failed synthesis degrades to stitched contributions
#[tokio::test]
async fn test_collaborate_synthesis_failure_stitches() {
    let model = ScriptedModel::new(vec![
        Ok("First opinion".to_string()),
        Ok("Second opinion".to_string()),
        Err(LlmError::Timeout),
    ]);
    let (advisor, _stores) = advisor_with(model).await;

    let outcome = advisor
        .collaborate(
            "what do you both think?",
            &[
                "medical_assistant".to_string(),
                "billing_specialist".to_string(),
            ],
            None,
        )
        .await
        .unwrap();

    assert!(outcome.degraded);
    assert!(outcome.synthesis.contains("First opinion"));
    assert!(outcome.synthesis.contains("Second opinion"));
}

/// The usage report aggregates the trailing window from log digests
#[tokio::test]
async fn test_usage_report_counts_outcomes() {
    let model = ScriptedModel::new(vec![Ok("Happy to help.".to_string())]);
    let (advisor, _stores) = advisor_with(model).await;

    advisor
        .handle_chat(ChatInput::new("How much does assisted living cost?"))
        .await;
    advisor
        .handle_chat(ChatInput::new("My mom fell and isn't responding"))
        .await;

    let report = advisor.usage_report(24).await.unwrap();
    assert_eq!(report.window_hours, 24);
    assert_eq!(report.total_messages, 2);
    assert_eq!(report.unique_sessions, 2);
    assert_eq!(report.escalations, 1);
    assert_eq!(*report.by_intent.get("billing").unwrap(), 1);
    assert_eq!(*report.by_intent.get("emergency").unwrap(), 1);
}

/// route_preview reports the persona without generating or logging
#[tokio::test]
async fn test_route_preview_is_side_effect_free() {
    let model = ScriptedModel::new(vec![]);
    let (advisor, stores) = advisor_with(model.clone()).await;

    let (persona, classification) = advisor
        .route_preview("Can someone check on her medication?")
        .await;

    assert_eq!(persona.agent_type, "medical_assistant");
    assert_eq!(classification.category, IntentCategory::Medical);
    assert_eq!(model.calls(), 0);

    let digests = stores
        .conversations
        .digests_since(chrono::Utc::now() - chrono::Duration::hours(1))
        .await
        .unwrap();
    assert!(digests.is_empty());
}

/// Voice-channel messages keep their channel on the log row
#[tokio::test]
async fn test_channel_recorded() {
    let model = ScriptedModel::replying("Of course.");
    let (advisor, stores) = advisor_with(model).await;

    let outcome = advisor
        .handle_chat(
            ChatInput::new("Could you connect me to the front desk?")
                .with_channel(sentinel_core::Channel::Voice),
        )
        .await;

    let history = stores
        .conversations
        .history(&outcome.session_id, 10)
        .await
        .unwrap();
    assert_eq!(history[0].channel, sentinel_core::Channel::Voice);
}
