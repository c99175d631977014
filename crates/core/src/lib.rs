//! # Hivemind Core
//!
//! The "Brain" of Hivemind - routes a query through triage and a chain of
//! reasoning stages, each one a call to an LLM completion provider.
//!
//! ## Architecture
//!
//! - `swarm/` - Stage registry, pipeline state machine and the coordinator
//! - `memory/` - Per-user short-term conversation memory
//! - `provider/` - Completion provider trait and implementations
//! - `models/` - Provider selection and model configuration
//!
//! ## Usage
//!
//! ```rust,ignore
//! use hivemind_core::models::ModelConfig;
//! use hivemind_core::swarm::{Coordinator, CoordinatorConfig, ParameterOverrides};
//!
//! let provider = ModelConfig::from_env()?.create_provider();
//! let coordinator = Coordinator::new(CoordinatorConfig::default(), provider);
//! let answer = coordinator.ask("Why is the sky blue?", "default", &ParameterOverrides::new()).await?;
//! ```

pub mod error;
pub mod memory;
pub mod models;
pub mod provider;
pub mod swarm;

pub use error::{ProviderError, SwarmError, SwarmResult};
