//! # Errors
//!
//! Failure taxonomy for the swarm. `ProviderError` covers anything a
//! completion backend can throw at us; `SwarmError` is what callers of the
//! [`Coordinator`](crate::swarm::Coordinator) see.

use std::time::Duration;
use thiserror::Error;

/// Failure reported by a completion provider.
///
/// Every variant is treated as transient by the coordinator and retried up to
/// the configured budget.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("rate limited: {message}")]
    RateLimited { message: String },

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("stream interrupted: {0}")]
    Stream(String),

    #[error("provider returned an empty completion")]
    EmptyResponse,

    #[error("malformed provider payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Failure of a pipeline run.
#[derive(Debug, Error)]
pub enum SwarmError {
    /// A stage id was not found in the registry. Indicates a registry/pipeline
    /// mismatch, never a user error.
    #[error("unknown stage '{0}'")]
    UnknownStage(String),

    /// A stage definition violates `min <= default <= max` or reuses an id.
    #[error("invalid stage definition '{stage}': {reason}")]
    InvalidDefinition { stage: String, reason: String },

    /// An override for a known stage parameter is outside its bounds.
    #[error("parameter '{parameter}' of stage '{stage}' must be within [{min}, {max}], got {value}")]
    InvalidParameter {
        stage: String,
        parameter: String,
        value: i64,
        min: i64,
        max: i64,
    },

    /// A stage exhausted its retry budget.
    #[error("stage '{stage}' failed after {attempts} attempt(s): {source}")]
    Provider {
        stage: String,
        attempts: u32,
        #[source]
        source: ProviderError,
    },
}

impl SwarmError {
    /// Whether the caller supplied bad input (as opposed to a backend failure).
    pub fn is_client_error(&self) -> bool {
        matches!(self, SwarmError::InvalidParameter { .. })
    }
}

pub type SwarmResult<T> = Result<T, SwarmError>;
