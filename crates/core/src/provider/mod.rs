//! # Completion Providers
//!
//! The only capability the swarm needs from an LLM backend: turn a system
//! prompt plus user context into text, either all at once or as a stream of
//! fragments.
//!
//! ## Implementations
//!
//! - `OpenAiCompatibleProvider` - OpenAI, Groq and Heurist chat-completion APIs
//! - `ScriptedProvider` - deterministic in-memory double for tests and demos

pub mod openai;
pub mod scripted;

pub use openai::OpenAiCompatibleProvider;
pub use scripted::{ProviderCall, Script, ScriptedProvider};

use async_trait::async_trait;
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

use crate::error::ProviderResult;

/// Lazy sequence of text fragments produced by a streaming completion.
pub type FragmentStream = Pin<Box<dyn Stream<Item = ProviderResult<String>> + Send>>;

/// Role tag of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single role-tagged message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// One completion request: the stage's effective system prompt and the
/// stage input built from upstream output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub user_context: String,
}

impl CompletionRequest {
    pub fn new(system_prompt: impl Into<String>, user_context: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            user_context: user_context.into(),
        }
    }

    /// Messages in the order chat APIs expect them
    pub fn messages(&self) -> Vec<ChatMessage> {
        vec![
            ChatMessage {
                role: Role::System,
                content: self.system_prompt.clone(),
            },
            ChatMessage {
                role: Role::User,
                content: self.user_context.clone(),
            },
        ]
    }
}

/// A completion backend.
///
/// Selected once at startup (see [`ModelConfig::create_provider`](crate::models::ModelConfig::create_provider))
/// and shared by every pipeline run behind an `Arc<dyn CompletionProvider>`.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Short identifier used in logs
    fn name(&self) -> &str;

    /// Request a full completion.
    async fn complete(&self, request: &CompletionRequest) -> ProviderResult<String>;

    /// Request a streamed completion. Failing here means the stream could not
    /// be opened; failures after that surface as `Err` items.
    async fn stream(&self, request: &CompletionRequest) -> ProviderResult<FragmentStream>;
}
