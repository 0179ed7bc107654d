//! Multi-persona collaboration primitives
//!
//! The advisor fans a question out to several personas at once and
//! synthesizes whatever comes back into one answer. These are the shared
//! pieces: the contribution record, the quality heuristic scored on each
//! contribution, and the synthesis prompt assembly. Orchestration lives on
//! [`crate::Advisor::collaborate`].

use serde::Serialize;

use sentinel_llm::{ChatMessage, CompletionRequest};

/// Returned as the synthesis when every persona failed
pub const NO_CONTRIBUTIONS_MESSAGE: &str =
    "Unable to process request with available agents.";

const SYNTHESIS_SYSTEM_PROMPT: &str =
    "You are a synthesis agent combining multiple expert opinions into a coherent response.";

/// What one persona contributed
#[derive(Debug, Clone, Serialize)]
pub struct Contribution {
    pub agent: String,
    pub agent_type: String,
    pub success: bool,
    pub response: Option<String>,
    pub error: Option<String>,
    /// Heuristic quality score in [0, 1], not a model probability
    pub confidence: f32,
}

impl Contribution {
    pub fn succeeded(agent: &str, agent_type: &str, response: String) -> Self {
        let confidence = response_confidence(&response);
        Self {
            agent: agent.to_string(),
            agent_type: agent_type.to_string(),
            success: true,
            response: Some(response),
            error: None,
            confidence,
        }
    }

    pub fn failed(agent: &str, agent_type: &str, error: String) -> Self {
        Self {
            agent: agent.to_string(),
            agent_type: agent_type.to_string(),
            success: false,
            response: None,
            error: Some(error),
            confidence: 0.0,
        }
    }
}

/// The synthesized answer plus the raw contributions
#[derive(Debug, Clone, Serialize)]
pub struct CollaborationOutcome {
    pub session_id: String,
    pub synthesis: String,
    pub contributions: Vec<Contribution>,
    /// True when synthesis fell back to stitched contributions or the
    /// no-contributions notice
    pub degraded: bool,
}

/// Quality heuristic for one contribution: starts at 0.5 and earns credit
/// for substance (mid-length answers, no hedging, concrete wording)
pub fn response_confidence(response: &str) -> f32 {
    let mut confidence: f32 = 0.5;

    if response.len() > 100 && response.len() < 500 {
        confidence += 0.1;
    }
    if !response.contains("I don't know") && !response.contains("I'm not sure") {
        confidence += 0.2;
    }
    if response.contains("specifically") || response.contains("exactly") {
        confidence += 0.1;
    }

    confidence.min(1.0)
}

/// One model call that merges the successful contributions
pub fn synthesis_request(
    question: &str,
    contributions: &[Contribution],
    max_tokens: u32,
    temperature: f32,
) -> CompletionRequest {
    let answers = contributions
        .iter()
        .filter(|c| c.success)
        .filter_map(|c| {
            c.response
                .as_deref()
                .map(|text| format!("{}: {}", c.agent, text))
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    let prompt = format!(
        "Task: {}\n\nAgent Responses:\n{}\n\nPlease synthesize these responses \
         into a single, coherent answer.",
        question, answers
    );

    CompletionRequest::new(vec![ChatMessage::user(prompt)])
        .with_system(SYNTHESIS_SYSTEM_PROMPT)
        .with_max_tokens(max_tokens)
        .with_temperature(temperature)
}

/// Degraded synthesis when the synthesis call itself fails: the
/// contributions stitched together under their agent names
pub fn stitched_contributions(contributions: &[Contribution]) -> String {
    contributions
        .iter()
        .filter(|c| c.success)
        .filter_map(|c| {
            c.response
                .as_deref()
                .map(|text| format!("{}: {}", c.agent, text))
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
