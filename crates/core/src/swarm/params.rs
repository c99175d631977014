//! # Parameter Overrides
//!
//! Per-request tuning of stage parameters. Overrides are merged permissively:
//! unknown stages and unknown parameter names are dropped, but a value out of
//! bounds for a known parameter fails the whole request before any stage runs.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::registry::{StageDefinition, StageRegistry};
use crate::error::{SwarmError, SwarmResult};

/// Raw overrides as supplied by a caller: stage id -> parameter -> value
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterOverrides(HashMap<String, HashMap<String, i64>>);

impl ParameterOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, stage_id: &str, parameter: &str, value: i64) -> Self {
        self.set(stage_id, parameter, value);
        self
    }

    pub fn set(&mut self, stage_id: &str, parameter: &str, value: i64) {
        self.0
            .entry(stage_id.to_string())
            .or_default()
            .insert(parameter.to_string(), value);
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(HashMap::is_empty)
    }

    /// Validate against the registry and keep only known (stage, parameter)
    /// pairs.
    pub fn resolve(&self, registry: &StageRegistry) -> SwarmResult<ResolvedParameters> {
        let mut resolved = HashMap::new();

        for (stage_id, values) in &self.0 {
            let Ok(stage) = registry.lookup(stage_id) else {
                tracing::debug!(stage = %stage_id, "Ignoring overrides for unknown stage");
                continue;
            };

            let mut accepted = Vec::new();
            // spec order keeps the rendered prompt deterministic
            for spec in &stage.parameters {
                let Some(&value) = values.get(&spec.name) else {
                    continue;
                };
                if !spec.contains(value) {
                    return Err(SwarmError::InvalidParameter {
                        stage: stage.id.clone(),
                        parameter: spec.name.clone(),
                        value,
                        min: spec.min,
                        max: spec.max,
                    });
                }
                accepted.push((spec.name.clone(), value));
            }

            for name in values.keys().filter(|name| stage.parameter(name).is_none()) {
                tracing::debug!(stage = %stage_id, parameter = %name, "Ignoring unknown parameter");
            }

            if !accepted.is_empty() {
                resolved.insert(stage.id.clone(), accepted);
            }
        }

        Ok(ResolvedParameters(resolved))
    }
}

/// Validated overrides, ordered per stage as declared in the registry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedParameters(HashMap<String, Vec<(String, i64)>>);

impl ResolvedParameters {
    pub fn for_stage(&self, stage_id: &str) -> &[(String, i64)] {
        self.0.get(stage_id).map(Vec::as_slice).unwrap_or_default()
    }

    /// The stage template, with a `Parameters:` section appended when the
    /// stage has overrides.
    pub fn system_prompt(&self, stage: &StageDefinition) -> String {
        let overrides = self.for_stage(&stage.id);
        if overrides.is_empty() {
            return stage.prompt_template.clone();
        }

        let mut prompt = format!("{}\n\nParameters:\n", stage.prompt_template);
        for (name, value) in overrides {
            prompt.push_str(&format!("- {}: {}%\n", name, value));
        }
        prompt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swarm::registry::{CRITIC, INTERPRETER, TRIAGE};

    #[test]
    fn test_out_of_range_is_rejected() {
        let registry = StageRegistry::default();
        let overrides = ParameterOverrides::new().with(CRITIC, "rigor_level", 101);

        let err = overrides.resolve(&registry).unwrap_err();
        assert!(matches!(
            err,
            SwarmError::InvalidParameter { ref parameter, value: 101, min: 0, max: 100, .. }
                if parameter == "rigor_level"
        ));
    }

    #[test]
    fn test_bounds_are_inclusive() {
        let registry = StageRegistry::default();
        let overrides = ParameterOverrides::new()
            .with(CRITIC, "rigor_level", 0)
            .with(CRITIC, "bias_detection", 100);
        assert!(overrides.resolve(&registry).is_ok());
    }

    #[test]
    fn test_unknown_stage_and_parameter_are_ignored() {
        let registry = StageRegistry::default();
        let overrides = ParameterOverrides::new()
            .with("oracle", "clairvoyance", 9000)
            .with(INTERPRETER, "made_up", -5)
            .with(INTERPRETER, "depth_of_analysis", 40);

        let resolved = overrides.resolve(&registry).unwrap();
        assert!(resolved.for_stage("oracle").is_empty());
        assert_eq!(
            resolved.for_stage(INTERPRETER),
            &[("depth_of_analysis".to_string(), 40)]
        );
    }

    #[test]
    fn test_system_prompt_lists_overrides_in_spec_order() {
        let registry = StageRegistry::default();
        let interpreter = registry.lookup(INTERPRETER).unwrap();
        let resolved = ParameterOverrides::new()
            .with(INTERPRETER, "context_awareness", 10)
            .with(INTERPRETER, "depth_of_analysis", 90)
            .resolve(&registry)
            .unwrap();

        let prompt = resolved.system_prompt(interpreter);
        assert!(prompt.starts_with(&interpreter.prompt_template));
        assert!(prompt.ends_with(
            "\n\nParameters:\n- depth_of_analysis: 90%\n- context_awareness: 10%\n"
        ));
    }

    #[test]
    fn test_system_prompt_untouched_without_overrides() {
        let registry = StageRegistry::default();
        let triage = registry.lookup(TRIAGE).unwrap();
        let resolved = ResolvedParameters::default();
        assert_eq!(resolved.system_prompt(triage), triage.prompt_template);
    }

    #[test]
    fn test_deserializes_from_request_shape() {
        let overrides: ParameterOverrides =
            serde_json::from_str(r#"{"critic": {"skepticism_level": 20}}"#).unwrap();
        assert!(!overrides.is_empty());
        assert!(ParameterOverrides::new().is_empty());
    }
}
