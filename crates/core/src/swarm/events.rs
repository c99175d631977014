//! # Stream Events
//!
//! Units emitted by a streaming run: one per text fragment, tagged with the
//! stage that produced it.

use serde::{Deserialize, Serialize};

/// Id of the pseudo-stage carrying a triage short-circuit answer
pub const FINAL_STAGE_ID: &str = "final";

/// Display name of the pseudo-stage
pub const FINAL_STAGE_NAME: &str = "Simple Response";

/// One fragment of a stage's output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamEvent {
    pub stage_id: String,
    pub stage_name: String,
    pub fragment: String,
}

impl StreamEvent {
    pub fn new(stage_id: &str, stage_name: &str, fragment: impl Into<String>) -> Self {
        Self {
            stage_id: stage_id.to_string(),
            stage_name: stage_name.to_string(),
            fragment: fragment.into(),
        }
    }

    /// The single event emitted when triage answers directly
    pub fn simple_response(text: impl Into<String>) -> Self {
        Self::new(FINAL_STAGE_ID, FINAL_STAGE_NAME, text)
    }

    pub fn is_final(&self) -> bool {
        self.stage_id == FINAL_STAGE_ID
    }
}
