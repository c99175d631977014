//! # Pipeline Stages
//!
//! The per-run state machine. A run starts at triage and either
//! short-circuits to `Complete` or walks the full chain:
//!
//! ```text
//! Triage ─┬─(SIMPLE:)──────────────────────────────────────────────┐
//!         └─> Interpreting -> Researching -> Critiquing -> Exploring │
//!                                                     │             │
//!                                              Synthesizing ─> Complete
//! ```
//!
//! Each stage's input is built from the outputs recorded so far, so a run
//! can never reach a stage without its upstream text.

use serde::{Deserialize, Serialize};

use super::params::ResolvedParameters;
use super::prompts;
use super::registry::{CREATIVE, CRITIC, INTERPRETER, RESEARCHER, SYNTHESIZER, TRIAGE};

/// Stage of the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    /// Deciding whether the query needs the full pipeline
    Triage,
    /// Breaking the query into objectives
    Interpreting,
    /// Listing what needs investigating
    Researching,
    /// Reviewing the research for gaps and bias
    Critiquing,
    /// Looking for alternative perspectives
    Exploring,
    /// Merging everything into the answer
    Synthesizing,
    /// Complete
    Complete,
}

impl PipelineStage {
    /// Registry id of the stage run in this state
    pub fn stage_id(self) -> Option<&'static str> {
        match self {
            PipelineStage::Triage => Some(TRIAGE),
            PipelineStage::Interpreting => Some(INTERPRETER),
            PipelineStage::Researching => Some(RESEARCHER),
            PipelineStage::Critiquing => Some(CRITIC),
            PipelineStage::Exploring => Some(CREATIVE),
            PipelineStage::Synthesizing => Some(SYNTHESIZER),
            PipelineStage::Complete => None,
        }
    }

    fn next(self) -> Self {
        match self {
            PipelineStage::Triage => PipelineStage::Interpreting,
            PipelineStage::Interpreting => PipelineStage::Researching,
            PipelineStage::Researching => PipelineStage::Critiquing,
            PipelineStage::Critiquing => PipelineStage::Exploring,
            PipelineStage::Exploring => PipelineStage::Synthesizing,
            PipelineStage::Synthesizing => PipelineStage::Complete,
            PipelineStage::Complete => PipelineStage::Complete,
        }
    }
}

/// Full text produced by one stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageOutput {
    pub stage_id: String,
    pub stage_name: String,
    pub text: String,
}

/// State of a single pipeline invocation
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub query: String,
    pub user_id: String,
    /// `"\nPrevious conversation:\n..."` or empty
    pub context_info: String,
    /// Current stage
    pub stage: PipelineStage,
    /// Validated overrides applied to every stage's system prompt
    pub params: ResolvedParameters,
    outputs: Vec<StageOutput>,
}

impl PipelineRun {
    pub fn new(query: &str, user_id: &str, history: &str) -> Self {
        Self {
            query: query.to_string(),
            user_id: user_id.to_string(),
            context_info: prompts::conversation_context(history),
            stage: PipelineStage::Triage,
            params: ResolvedParameters::default(),
            outputs: Vec::new(),
        }
    }

    pub fn with_parameters(mut self, params: ResolvedParameters) -> Self {
        self.params = params;
        self
    }

    /// Input for the current stage, `None` once the run is over
    pub fn stage_input(&self) -> Option<String> {
        let input = match self.stage {
            PipelineStage::Triage => prompts::triage_input(&self.query, &self.context_info),
            PipelineStage::Interpreting => {
                prompts::interpreter_input(&self.query, &self.context_info)
            }
            PipelineStage::Researching => prompts::researcher_input(self.output(INTERPRETER)),
            PipelineStage::Critiquing => prompts::critic_input(self.output(RESEARCHER)),
            PipelineStage::Exploring => prompts::creative_input(self.output(CRITIC)),
            PipelineStage::Synthesizing => prompts::synthesis_input(
                &self.query,
                self.output(INTERPRETER),
                self.output(RESEARCHER),
                self.output(CRITIC),
                self.output(CREATIVE),
            ),
            PipelineStage::Complete => return None,
        };
        Some(input)
    }

    /// Record the current stage's output and advance
    pub fn record(&mut self, stage_name: &str, text: String) {
        if let Some(stage_id) = self.stage.stage_id() {
            self.outputs.push(StageOutput {
                stage_id: stage_id.to_string(),
                stage_name: stage_name.to_string(),
                text,
            });
        }
        self.advance();
    }

    /// Advance to the next stage
    pub fn advance(&mut self) {
        self.stage = self.stage.next();
    }

    /// Triage answered directly; skip the remaining stages
    pub fn short_circuit(&mut self) {
        self.stage = PipelineStage::Complete;
    }

    /// Recorded text of a stage, empty if it has not run
    pub fn output(&self, stage_id: &str) -> &str {
        self.outputs
            .iter()
            .find(|o| o.stage_id == stage_id)
            .map(|o| o.text.as_str())
            .unwrap_or_default()
    }

    pub fn into_outputs(self) -> Vec<StageOutput> {
        self.outputs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swarm::params::ParameterOverrides;
    use crate::swarm::registry::StageRegistry;

    #[test]
    fn test_pipeline_advance() {
        let mut run = PipelineRun::new("q", "u", "");
        assert_eq!(run.stage, PipelineStage::Triage);

        run.advance();
        assert_eq!(run.stage, PipelineStage::Interpreting);

        run.advance();
        assert_eq!(run.stage, PipelineStage::Researching);
    }

    #[test]
    fn test_short_circuit_completes() {
        let mut run = PipelineRun::new("q", "u", "");
        run.record("Query Triage", "SIMPLE: hi".to_string());
        run.short_circuit();

        assert_eq!(run.stage, PipelineStage::Complete);
        assert_eq!(run.stage_input(), None);
        assert_eq!(run.into_outputs().len(), 1);
    }

    #[test]
    fn test_inputs_chain_previous_outputs() {
        let mut run = PipelineRun::new("why?", "u", "User: a\nAssistant: b\n");
        assert!(run
            .stage_input()
            .unwrap()
            .starts_with("Evaluate this query: 'why?'\nPrevious conversation:\nUser: a"));

        run.record("Query Triage", "COMPLEX".to_string());
        run.record("Query Interpreter", "interp".to_string());
        assert_eq!(
            run.stage_input().unwrap(),
            "Based on this interpretation:\ninterp\nWhat specific aspects need investigation?"
        );

        run.record("Research Specialist", "research".to_string());
        assert_eq!(
            run.stage_input().unwrap(),
            "Critically analyze these research points:\nresearch"
        );

        run.record("Critical Analyzer", "critique".to_string());
        run.record("Creative Explorer", "ideas".to_string());
        let synthesis = run.stage_input().unwrap();
        assert!(synthesis.starts_with("Original Query: why?"));
        assert!(synthesis.contains("Creative Perspectives: ideas"));

        run.record("Information Synthesizer", "answer".to_string());
        assert_eq!(run.stage, PipelineStage::Complete);
        assert_eq!(run.output(SYNTHESIZER), "answer");
        assert_eq!(run.into_outputs().len(), 6);
    }

    #[test]
    fn test_run_carries_parameters() {
        let registry = StageRegistry::default();
        let params = ParameterOverrides::new()
            .with(CRITIC, "rigor_level", 90)
            .resolve(&registry)
            .unwrap();
        let run = PipelineRun::new("q", "u", "").with_parameters(params);

        let critic = registry.lookup(CRITIC).unwrap();
        assert!(run
            .params
            .system_prompt(critic)
            .ends_with("Parameters:\n- rigor_level: 90%\n"));
        assert!(run.params.for_stage(TRIAGE).is_empty());
    }

    #[test]
    fn test_complete_does_not_advance() {
        let mut run = PipelineRun::new("q", "u", "");
        run.short_circuit();
        run.advance();
        assert_eq!(run.stage, PipelineStage::Complete);
        assert_eq!(run.stage_input(), None);
    }
}
