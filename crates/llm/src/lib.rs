//! LLM Integration
//!
//! Features:
//! - Anthropic Messages API backend
//! - Chat model trait for dependency injection
//! - Embeddings provider for semantic lookups

pub mod anthropic;
pub mod chat;
pub mod embeddings;
pub mod prompt;

pub use anthropic::{AnthropicBackend, AnthropicConfig};
pub use chat::{ChatModel, Completion, CompletionRequest, FinishReason};
pub use embeddings::{cosine_similarity, EmbeddingProvider, OpenAiEmbedder, OpenAiEmbedderConfig};
pub use prompt::{ChatMessage, Role};

use thiserror::Error;

/// LLM errors
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timeout")]
    Timeout,

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Network(err.to_string())
        }
    }
}
