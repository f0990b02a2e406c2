//! Run context - the values a pipeline run accumulates

use crate::core::reference::{self, Reference};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Execution context for a pipeline run
///
/// Passed explicitly to every step; steps never see each other except through it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunContext {
    /// Environment bindings (`${env.NAME}`)
    pub env: HashMap<String, String>,

    /// Resolved trigger inputs (`${inputs.NAME}`)
    pub inputs: HashMap<String, String>,

    /// Outputs of finished steps (step_id -> key -> value)
    pub step_outputs: HashMap<String, HashMap<String, String>>,
}

impl RunContext {
    /// Create a context seeded with env bindings and trigger inputs
    pub fn new(env: HashMap<String, String>, inputs: HashMap<String, String>) -> Self {
        Self {
            env,
            inputs,
            ..Self::default()
        }
    }

    /// Record the outputs of a step
    pub fn set_step_outputs(&mut self, step_id: &str, outputs: HashMap<String, String>) {
        self.step_outputs.insert(step_id.to_string(), outputs);
    }

    /// Get one output of a step
    pub fn get_step_output(&self, step_id: &str, key: &str) -> Option<&String> {
        self.step_outputs.get(step_id).and_then(|o| o.get(key))
    }

    fn lookup(&self, r: &Reference) -> Option<String> {
        match r {
            Reference::Env(name) => self.env.get(name).cloned(),
            Reference::Input(name) => self.inputs.get(name).cloned(),
            Reference::StepOutput { step, key } => self.get_step_output(step, key).cloned(),
        }
    }

    /// Substitute every reference in a template
    pub fn resolve(&self, template: &str) -> Result<String, Reference> {
        reference::substitute(template, |r| self.lookup(r))
    }

    /// Like [`RunContext::resolve`], with `own` visible as the current step's outputs
    pub fn resolve_with_own(
        &self,
        template: &str,
        step_id: &str,
        own: &HashMap<String, String>,
    ) -> Result<String, Reference> {
        reference::substitute(template, |r| match r {
            Reference::StepOutput { step, key } if step == step_id => own.get(key).cloned(),
            _ => self.lookup(r),
        })
    }

    /// Every output as a flat `step.key -> value` map, for reporting
    pub fn flattened_outputs(&self) -> HashMap<String, String> {
        self.step_outputs
            .iter()
            .flat_map(|(step, outputs)| {
                outputs
                    .iter()
                    .map(move |(key, value)| (format!("{}.{}", step, key), value.clone()))
            })
            .collect()
    }
}
