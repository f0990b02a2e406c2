//! Pipeline domain model

use crate::core::{
    config::PipelineConfig,
    context::RunContext,
    state::{PipelineState, StepState},
    step::{Step, StepDefaults},
};
use crate::cloud::status::PollPolicy;
use std::collections::HashMap;

/// A loaded pipeline, ready to run
#[derive(Debug, Clone)]
pub struct Pipeline {
    /// Pipeline name
    pub name: String,

    /// Environment bindings (`${env.NAME}`)
    pub env: HashMap<String, String>,

    /// Resolved trigger inputs (`${inputs.NAME}`)
    pub inputs: HashMap<String, String>,

    /// Steps in declaration order, which is also execution order
    pub steps: Vec<Step>,

    /// Bounds for stability waits
    pub stability_policy: PollPolicy,

    /// Bounds for endpoint discovery
    pub endpoint_policy: PollPolicy,

    /// Execution state
    pub state: PipelineState,
}

impl Pipeline {
    /// Create a pipeline from configuration
    pub fn from_config(config: &PipelineConfig) -> Self {
        let defaults = StepDefaults {
            timeout_secs: config
                .default_timeout_secs
                .unwrap_or(StepDefaults::default().timeout_secs),
        };

        let steps = config
            .steps
            .iter()
            .map(|step_config| Step::from_config(step_config, &defaults))
            .collect();

        Pipeline {
            name: config.name.clone(),
            env: config.env.clone().into_iter().collect(),
            inputs: HashMap::new(),
            steps,
            stability_policy: config.polling.stability_policy(),
            endpoint_policy: config.polling.endpoint_policy(),
            state: PipelineState::new(),
        }
    }

    /// Get a step by ID
    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Fresh context for a run of this pipeline
    pub fn create_run_context(&self) -> RunContext {
        RunContext::new(self.env.clone(), self.inputs.clone())
    }

    /// Outputs of every completed step, keyed `step.key`
    pub fn collected_outputs(&self) -> HashMap<String, String> {
        self.steps
            .iter()
            .filter_map(|step| match &step.state {
                StepState::Completed { outputs, .. } => Some((step.id.as_str(), outputs)),
                _ => None,
            })
            .flat_map(|(id, outputs)| {
                outputs
                    .iter()
                    .map(move |(key, value)| (format!("{}.{}", id, key), value.clone()))
            })
            .collect()
    }

    /// Reset every step so the pipeline can run again under a new execution ID
    pub fn reset(&mut self) {
        for step in &mut self.steps {
            step.state = StepState::Pending;
        }
        self.state = PipelineState::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
name: "Order"
env:
  AWS_REGION: "eu-west-1"
default_timeout_secs: 60
steps:
  - id: "zeta"
    action: authenticate
    with: { region: "${env.AWS_REGION}" }
  - id: "alpha"
    action: service_status
    with: { cluster: "c", service: "s" }
    timeout_secs: 5
  - id: "mid"
    action: service_status
    with: { cluster: "c", service: "s" }
"#;

    #[test]
    fn test_declaration_order_is_execution_order() {
        let pipeline = PipelineConfig::from_yaml(YAML).unwrap().to_pipeline();
        let order: Vec<&str> = pipeline.steps.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(order, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_step_timeouts() {
        let pipeline = PipelineConfig::from_yaml(YAML).unwrap().to_pipeline();
        assert_eq!(pipeline.step("zeta").unwrap().timeout_secs, 60);
        assert_eq!(pipeline.step("alpha").unwrap().timeout_secs, 5);
    }

    #[test]
    fn test_run_context_and_reset() {
        let mut pipeline = PipelineConfig::from_yaml(YAML).unwrap().to_pipeline();
        pipeline.inputs.insert("environment".to_string(), "staging".to_string());

        let ctx = pipeline.create_run_context();
        assert_eq!(ctx.env.get("AWS_REGION"), Some(&"eu-west-1".to_string()));
        assert_eq!(ctx.inputs.get("environment"), Some(&"staging".to_string()));

        let first_id = pipeline.state.execution_id;
        pipeline.steps[0].state = StepState::Running {
            started_at: chrono::Utc::now(),
        };
        pipeline.reset();
        assert!(matches!(pipeline.step("zeta").unwrap().state, StepState::Pending));
        assert_ne!(pipeline.state.execution_id, first_id);
        assert!(pipeline.steps.iter().all(|s| !s.state.is_terminal()));
    }
}
