//! # Swarm Orchestration
//!
//! Coordinates the stage pipeline for Hivemind.
//!
//! ## Pipeline Flow
//!
//! ```text
//! Query → Triage ─(SIMPLE:)─────────────────────────────────────────▶ Answer
//!           └─▶ Interpreter → Researcher → Critic → Creative → Synthesizer ─▶ Answer
//! ```

pub mod coordinator;
pub mod events;
pub mod params;
pub mod pipeline;
pub mod prompts;
pub mod registry;
pub mod triage;

pub use coordinator::{Coordinator, CoordinatorConfig, EventStream, PipelineResult};
pub use events::{StreamEvent, FINAL_STAGE_ID, FINAL_STAGE_NAME};
pub use params::{ParameterOverrides, ResolvedParameters};
pub use pipeline::{PipelineRun, PipelineStage, StageOutput};
pub use registry::{ParameterCatalog, ParameterSpec, StageDefinition, StageRegistry};
pub use triage::{TriageOutcome, SIMPLE_MARKER};
