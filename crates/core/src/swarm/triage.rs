//! Triage verdict parsing.
//!
//! The triage stage answers trivial queries itself by prefixing its output
//! with [`SIMPLE_MARKER`]; anything else sends the query down the full
//! pipeline.

/// Prefix that marks a query as answered by triage
pub const SIMPLE_MARKER: &str = "SIMPLE:";

/// Parsed triage output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriageOutcome {
    pub is_simple: bool,
    /// The direct answer when simple, the raw triage output otherwise
    pub text: String,
}

impl TriageOutcome {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().strip_prefix(SIMPLE_MARKER) {
            Some(answer) => Self {
                is_simple: true,
                text: answer.trim().to_string(),
            },
            None => Self {
                is_simple: false,
                text: raw.to_string(),
            },
        }
    }
}
