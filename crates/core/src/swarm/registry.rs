//! # Stage Registry
//!
//! Fixed, ordered catalog of pipeline stages. Built once at startup and
//! shared read-only by every run.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::HashSet;

use super::prompts;
use crate::error::{SwarmError, SwarmResult};

pub const TRIAGE: &str = "triage";
pub const INTERPRETER: &str = "interpreter";
pub const RESEARCHER: &str = "researcher";
pub const CRITIC: &str = "critic";
pub const CREATIVE: &str = "creative";
pub const SYNTHESIZER: &str = "synthesizer";

/// Canonical pipeline order
pub const PIPELINE_ORDER: [&str; 6] = [
    TRIAGE,
    INTERPRETER,
    RESEARCHER,
    CRITIC,
    CREATIVE,
    SYNTHESIZER,
];

/// A tunable numeric knob of a stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    pub default: i64,
    pub min: i64,
    pub max: i64,
    #[serde(default)]
    pub description: String,
}

impl ParameterSpec {
    pub fn new(name: &str, default: i64, description: &str) -> Self {
        Self {
            name: name.to_string(),
            default,
            min: 0,
            max: 100,
            description: description.to_string(),
        }
    }

    pub fn contains(&self, value: i64) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

/// One pipeline stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDefinition {
    pub id: String,
    pub name: String,
    pub prompt_template: String,
    #[serde(default)]
    pub parameters: Vec<ParameterSpec>,
}

impl StageDefinition {
    pub fn new(id: &str, name: &str, prompt_template: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            prompt_template: prompt_template.trim_end().to_string(),
            parameters: Vec::new(),
        }
    }

    pub fn with_parameter(mut self, spec: ParameterSpec) -> Self {
        self.parameters.push(spec);
        self
    }

    pub fn parameter(&self, name: &str) -> Option<&ParameterSpec> {
        self.parameters.iter().find(|p| p.name == name)
    }

    fn validate(&self) -> SwarmResult<()> {
        for spec in &self.parameters {
            if !(spec.min <= spec.default && spec.default <= spec.max) {
                return Err(SwarmError::InvalidDefinition {
                    stage: self.id.clone(),
                    reason: format!(
                        "parameter '{}' violates min <= default <= max ({} <= {} <= {})",
                        spec.name, spec.min, spec.default, spec.max
                    ),
                });
            }
        }
        Ok(())
    }
}

/// Stage id -> parameter specs, serialized as a JSON object in pipeline order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterCatalog(Vec<(String, Vec<ParameterSpec>)>);

impl ParameterCatalog {
    pub fn get(&self, stage_id: &str) -> Option<&[ParameterSpec]> {
        self.0
            .iter()
            .find(|(id, _)| id == stage_id)
            .map(|(_, specs)| specs.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[ParameterSpec])> {
        self.0.iter().map(|(id, specs)| (id.as_str(), specs.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for ParameterCatalog {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (id, specs) in &self.0 {
            map.serialize_entry(id, specs)?;
        }
        map.end()
    }
}

/// The stage catalog
#[derive(Debug, Clone)]
pub struct StageRegistry {
    stages: Vec<StageDefinition>,
}

impl Default for StageRegistry {
    fn default() -> Self {
        Self {
            stages: default_stages(),
        }
    }
}

impl StageRegistry {
    /// Build a registry from custom definitions, in the order given.
    ///
    /// Every canonical stage id must be present exactly once.
    pub fn new(stages: Vec<StageDefinition>) -> SwarmResult<Self> {
        let mut seen = HashSet::new();
        for stage in &stages {
            stage.validate()?;
            if !seen.insert(stage.id.as_str()) {
                return Err(SwarmError::InvalidDefinition {
                    stage: stage.id.clone(),
                    reason: "duplicate stage id".to_string(),
                });
            }
        }
        if let Some(missing) = PIPELINE_ORDER.iter().find(|id| !seen.contains(**id)) {
            return Err(SwarmError::UnknownStage(missing.to_string()));
        }
        Ok(Self { stages })
    }

    pub fn lookup(&self, stage_id: &str) -> SwarmResult<&StageDefinition> {
        self.stages
            .iter()
            .find(|s| s.id == stage_id)
            .ok_or_else(|| SwarmError::UnknownStage(stage_id.to_string()))
    }

    pub fn all_stages(&self) -> &[StageDefinition] {
        &self.stages
    }

    /// Tunable parameters per stage; stages without any are left out
    pub fn parameter_catalog(&self) -> ParameterCatalog {
        ParameterCatalog(
            self.stages
                .iter()
                .filter(|s| !s.parameters.is_empty())
                .map(|s| (s.id.clone(), s.parameters.clone()))
                .collect(),
        )
    }
}

fn default_stages() -> Vec<StageDefinition> {
    vec![
        StageDefinition::new(TRIAGE, "Query Triage", prompts::TRIAGE),
        StageDefinition::new(INTERPRETER, "Query Interpreter", prompts::INTERPRETER)
            .with_parameter(ParameterSpec::new(
                "depth_of_analysis",
                70,
                "How deeply to analyze the query",
            ))
            .with_parameter(ParameterSpec::new(
                "context_awareness",
                80,
                "How much to consider contextual information",
            )),
        StageDefinition::new(RESEARCHER, "Research Specialist", prompts::RESEARCHER)
            .with_parameter(ParameterSpec::new(
                "research_breadth",
                75,
                "How broad the research scope should be",
            ))
            .with_parameter(ParameterSpec::new(
                "technical_depth",
                65,
                "Level of technical detail in research",
            ))
            .with_parameter(ParameterSpec::new(
                "source_diversity",
                80,
                "Diversity of perspectives to consider",
            )),
        StageDefinition::new(CRITIC, "Critical Analyzer", prompts::CRITIC)
            .with_parameter(ParameterSpec::new(
                "skepticism_level",
                70,
                "How skeptical to be of information",
            ))
            .with_parameter(ParameterSpec::new(
                "bias_detection",
                85,
                "Focus on detecting biases",
            ))
            .with_parameter(ParameterSpec::new(
                "rigor_level",
                75,
                "Thoroughness of critical analysis",
            )),
        StageDefinition::new(CREATIVE, "Creative Explorer", prompts::CREATIVE)
            .with_parameter(ParameterSpec::new(
                "creativity_level",
                85,
                "Level of creative thinking",
            ))
            .with_parameter(ParameterSpec::new(
                "unconventional_thinking",
                75,
                "Willingness to explore unconventional ideas",
            ))
            .with_parameter(ParameterSpec::new(
                "practicality_balance",
                60,
                "Balance between creativity and practicality",
            )),
        StageDefinition::new(SYNTHESIZER, "Information Synthesizer", prompts::SYNTHESIZER)
            .with_parameter(ParameterSpec::new(
                "conciseness",
                70,
                "How concise the final response should be",
            ))
            .with_parameter(ParameterSpec::new(
                "integration_level",
                85,
                "How thoroughly to integrate different viewpoints",
            ))
            .with_parameter(ParameterSpec::new(
                "clarity_focus",
                80,
                "Focus on clarity vs complexity",
            )),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry_is_valid_and_ordered() {
        let registry = StageRegistry::new(default_stages()).unwrap();
        let ids: Vec<&str> = registry.all_stages().iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, PIPELINE_ORDER);
    }

    #[test]
    fn test_lookup_unknown_stage() {
        let registry = StageRegistry::default();
        assert_eq!(registry.lookup(CRITIC).unwrap().name, "Critical Analyzer");
        assert!(matches!(
            registry.lookup("oracle"),
            Err(SwarmError::UnknownStage(id)) if id == "oracle"
        ));
    }

    #[test]
    fn test_catalog_skips_parameterless_stages() {
        let catalog = StageRegistry::default().parameter_catalog();
        assert!(catalog.get(TRIAGE).is_none());
        assert_eq!(catalog.len(), 5);
        assert_eq!(catalog.get(RESEARCHER).unwrap().len(), 3);

        let json = serde_json::to_string(&catalog).unwrap();
        assert!(json.starts_with("{\"interpreter\":[{\"name\":\"depth_of_analysis\""));
    }

    #[test]
    fn test_rejects_default_outside_bounds() {
        let mut stages = default_stages();
        stages[1].parameters[0].default = 150;
        let err = StageRegistry::new(stages).unwrap_err();
        assert!(matches!(
            err,
            SwarmError::InvalidDefinition { ref stage, .. } if stage == INTERPRETER
        ));
    }

    #[test]
    fn test_rejects_missing_and_duplicate_stages() {
        let mut stages = default_stages();
        stages.pop();
        assert!(matches!(
            StageRegistry::new(stages),
            Err(SwarmError::UnknownStage(id)) if id == SYNTHESIZER
        ));

        let mut stages = default_stages();
        stages.push(stages[0].clone());
        assert!(matches!(
            StageRegistry::new(stages),
            Err(SwarmError::InvalidDefinition { .. })
        ));
    }
}
