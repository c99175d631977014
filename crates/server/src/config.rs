//! # Settings
//!
//! Layered configuration: built-in defaults, then `.hivemind/config.json`,
//! then `HIVEMIND_*` environment variables. Provider API keys are read from
//! the environment only (see `ModelConfig::from_env`).

use anyhow::{Context, Result};
use hivemind_core::memory::MemoryConfig;
use hivemind_core::swarm::CoordinatorConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

/// HTTP transport settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    pub host: String,
    pub port: u16,
    /// Return every stage's output from non-streaming queries
    pub send_full_response: bool,
    /// Answer `/query` with Server-Sent Events
    pub use_streaming: bool,
    /// CORS origins allowed to call the API
    pub allowed_origins: Vec<String>,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            send_full_response: true,
            use_streaming: true,
            allowed_origins: vec!["https://quarm.io".to_string()],
        }
    }
}

/// Everything the binary needs besides provider credentials
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Keep per-user conversation history between queries
    pub use_memory: bool,
    pub memory: MemoryConfig,
    pub swarm: CoordinatorConfig,
    pub api: ApiSettings,
}

impl Settings {
    pub const DEFAULT_PATH: &'static str = ".hivemind/config.json";

    /// Defaults, overlaid with the file at `path` (if present) and then the
    /// process environment.
    pub async fn load(path: &Path) -> Result<Self> {
        let mut settings = if path.exists() {
            let content = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Invalid settings in {}", path.display()))?
        } else {
            Self::default()
        };

        settings.apply_env(|key| std::env::var(key).ok());
        Ok(settings)
    }

    /// Apply `HIVEMIND_*` overrides from any key lookup
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(enabled) = parse_var(&var, "HIVEMIND_USE_MEMORY") {
            self.use_memory = enabled;
        }
        if let Some(items) = parse_var(&var, "HIVEMIND_MAX_MEMORY_ITEMS") {
            self.memory.max_history = items;
            self.swarm.context_items = items;
        }
        if let Some(hours) = parse_var(&var, "HIVEMIND_MEMORY_MAX_AGE_HOURS") {
            self.memory.max_age_hours = hours;
        }
        if let Some(retries) = parse_var(&var, "HIVEMIND_MAX_RETRIES") {
            self.swarm.max_retries = retries;
        }
        if let Some(delay) = parse_var(&var, "HIVEMIND_RETRY_DELAY_MS") {
            self.swarm.retry_delay_ms = delay;
        }
        if let Some(secs) = parse_var(&var, "HIVEMIND_STAGE_TIMEOUT_SECS") {
            self.swarm.stage_timeout_secs = Some(secs);
        }
        if let Some(host) = var("HIVEMIND_API_HOST") {
            self.api.host = host;
        }
        if let Some(port) = parse_var(&var, "HIVEMIND_API_PORT") {
            self.api.port = port;
        }
        if let Some(full) = parse_var(&var, "HIVEMIND_SEND_FULL_RESPONSE") {
            self.api.send_full_response = full;
        }
        if let Some(streaming) = parse_var(&var, "HIVEMIND_USE_STREAMING") {
            self.api.use_streaming = streaming;
        }
        if let Some(origins) = var("HIVEMIND_ALLOWED_ORIGINS") {
            self.api.allowed_origins = origins
                .split(',')
                .map(|origin| origin.trim().to_string())
                .filter(|origin| !origin.is_empty())
                .collect();
        }
    }
}

fn parse_var<T, F>(var: &F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = var(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Ignoring unparsable setting");
            None
        }
    }
}
