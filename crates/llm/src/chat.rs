//! Chat model trait and request/response types
//!
//! Sampling parameters travel with the request because each agent persona
//! carries its own temperature and token ceiling.

use async_trait::async_trait;

use crate::prompt::ChatMessage;
use crate::LlmError;

/// One completion request
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// System prompt, usually the persona's
    pub system: Option<String>,
    /// Conversation so far, oldest first
    pub messages: Vec<ChatMessage>,
    /// Maximum tokens to generate
    pub max_tokens: u32,
    /// Temperature (0.0 - 1.0)
    pub temperature: f32,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            system: None,
            messages,
            max_tokens: 500,
            temperature: 0.7,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature.clamp(0.0, 1.0);
        self
    }
}

/// Completion result
#[derive(Debug, Clone)]
pub struct Completion {
    /// Generated text
    pub text: String,
    /// Input tokens used
    pub input_tokens: usize,
    /// Output tokens generated
    pub output_tokens: usize,
    /// Total generation time (ms)
    pub latency_ms: u64,
    /// Why the model stopped
    pub finish_reason: FinishReason,
}

/// Finish reason
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
}

/// Chat model trait
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Generate a single completion
    async fn generate(&self, request: &CompletionRequest) -> Result<Completion, LlmError>;

    /// Check if the backend is usable
    async fn is_available(&self) -> bool;

    /// Get model name
    fn model_name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::ChatMessage;

    #[test]
    fn test_request_builder() {
        let request = CompletionRequest::new(vec![ChatMessage::user("hi")])
            .with_system("Be brief.")
            .with_max_tokens(400)
            .with_temperature(0.3);

        assert_eq!(request.system.as_deref(), Some("Be brief."));
        assert_eq!(request.max_tokens, 400);
        assert_eq!(request.temperature, 0.3);
    }

    #[test]
    fn test_temperature_clamped() {
        let request = CompletionRequest::new(vec![]).with_temperature(3.0);
        assert_eq!(request.temperature, 1.0);
    }
}
