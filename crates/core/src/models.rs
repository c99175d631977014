//! # Hivemind Models
//!
//! Centralized LLM provider configuration. The backend is picked once at
//! startup from explicit configuration and handed to the coordinator as an
//! `Arc<dyn CompletionProvider>`; nothing downstream inspects which one it got.

use anyhow::bail;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::provider::{CompletionProvider, OpenAiCompatibleProvider};

/// Supported LLM providers
///
/// All three speak the OpenAI chat-completions protocol:
/// - OpenAI - `OPENAI_API_KEY`
/// - Groq - `GROQ_API_KEY`
/// - Heurist (gateway) - `HEURIST_API_KEY`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    #[default]
    #[serde(rename = "openai")]
    OpenAI,
    Groq,
    Heurist,
}

impl LlmProvider {
    /// All providers, in startup selection priority
    pub fn all() -> Vec<LlmProvider> {
        vec![LlmProvider::OpenAI, LlmProvider::Groq, LlmProvider::Heurist]
    }

    /// Display name for logs and UI
    pub fn display_name(&self) -> &'static str {
        match self {
            LlmProvider::OpenAI => "OpenAI",
            LlmProvider::Groq => "Groq",
            LlmProvider::Heurist => "Heurist",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            LlmProvider::OpenAI => "gpt-4-turbo-preview",
            LlmProvider::Groq => "llama3-8b-8192",
            LlmProvider::Heurist => "mistralai/mixtral-8x7b-instruct",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            LlmProvider::OpenAI => "https://api.openai.com/v1",
            LlmProvider::Groq => "https://api.groq.com/openai/v1",
            LlmProvider::Heurist => "https://llm-gateway.heurist.xyz",
        }
    }

    /// Environment variable holding the API key
    pub fn api_key_env(&self) -> &'static str {
        match self {
            LlmProvider::OpenAI => "OPENAI_API_KEY",
            LlmProvider::Groq => "GROQ_API_KEY",
            LlmProvider::Heurist => "HEURIST_API_KEY",
        }
    }

    pub fn model_env(&self) -> &'static str {
        match self {
            LlmProvider::OpenAI => "OPENAI_MODEL",
            LlmProvider::Groq => "GROQ_MODEL",
            LlmProvider::Heurist => "HEURIST_MODEL",
        }
    }

    pub fn base_url_env(&self) -> &'static str {
        match self {
            LlmProvider::OpenAI => "OPENAI_BASE_URL",
            LlmProvider::Groq => "GROQ_BASE_URL",
            LlmProvider::Heurist => "HEURIST_BASE_URL",
        }
    }

    /// Sampling temperature sent with every request, if any
    pub fn temperature(&self) -> Option<f32> {
        match self {
            LlmProvider::OpenAI | LlmProvider::Heurist => Some(0.7),
            LlmProvider::Groq => None,
        }
    }

    /// Output token cap sent with every request, if any
    pub fn max_tokens(&self) -> Option<u32> {
        match self {
            LlmProvider::Heurist => Some(64),
            _ => None,
        }
    }

    /// The gateway only serves streamed completions; full completions are
    /// collected from the stream.
    pub fn stream_only(&self) -> bool {
        matches!(self, LlmProvider::Heurist)
    }
}

/// Configuration for the completion backend
#[derive(Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// LLM provider to use
    #[serde(default)]
    pub provider: LlmProvider,
    /// Model name (e.g., "gpt-4-turbo-preview")
    pub model: String,
    /// Optional base URL override
    #[serde(default)]
    pub base_url: Option<String>,
    /// Never serialized back out
    #[serde(default, skip_serializing)]
    pub api_key: String,
}

impl fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl ModelConfig {
    /// Config for a provider with its default model
    pub fn with_provider(provider: LlmProvider, api_key: impl Into<String>) -> Self {
        Self {
            provider,
            model: provider.default_model().to_string(),
            base_url: None,
            api_key: api_key.into(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Effective base URL without a trailing slash
    pub fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.provider.default_base_url())
            .trim_end_matches('/')
    }

    /// Pick the first provider with a configured key (OpenAI, then Groq,
    /// then Heurist) from the process environment.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable lookup
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        for provider in LlmProvider::all() {
            if let Some(api_key) = non_empty(provider.api_key_env()) {
                let mut config = ModelConfig::with_provider(provider, api_key);
                if let Some(model) = non_empty(provider.model_env()) {
                    config.model = model;
                }
                config.base_url = non_empty(provider.base_url_env());
                tracing::info!(
                    provider = provider.display_name(),
                    model = %config.model,
                    "Selected completion provider"
                );
                return Ok(config);
            }
        }

        let keys: Vec<&str> = LlmProvider::all().iter().map(|p| p.api_key_env()).collect();
        bail!("No API key configured. Set one of: {}", keys.join(", "))
    }

    /// Create the completion provider for this configuration
    pub fn create_provider(&self) -> Arc<dyn CompletionProvider> {
        Arc::new(OpenAiCompatibleProvider::new(self.clone()))
    }
}
