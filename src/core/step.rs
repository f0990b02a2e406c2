//! Step domain model

use crate::core::{config::StepConfig, state::StepState};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// The closed set of things a step can do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepAction {
    /// Log in to the image registry of a region
    Authenticate,
    /// Build a local container image
    BuildImage,
    /// Tag and push a local image to a registry repository
    PushImage,
    /// Substitute a container image into a task definition template
    RenderTaskDefinition,
    /// Register a task definition revision and roll the service onto it
    Deploy,
    /// Report the status of a service's primary deployment
    ServiceStatus,
    /// Find the public address of a running task
    ResolveEndpoint,
}

impl StepAction {
    /// Parameters that must be present in `with`
    pub fn required_parameters(&self) -> &'static [&'static str] {
        match self {
            StepAction::Authenticate => &["region"],
            StepAction::BuildImage => &["local_image"],
            StepAction::PushImage => &["registry", "repository", "tag", "local_image"],
            StepAction::RenderTaskDefinition => &["template", "container_name", "image"],
            StepAction::Deploy => &["task_definition", "service", "cluster"],
            StepAction::ServiceStatus => &["cluster", "service"],
            StepAction::ResolveEndpoint => &["cluster", "service", "port"],
        }
    }

    /// Parameters that may be present, with their defaults
    pub fn optional_parameters(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            StepAction::BuildImage => &[("context", "."), ("dockerfile", "Dockerfile")],
            StepAction::RenderTaskDefinition => &[("environment", "")],
            StepAction::Deploy => &[("wait_for_stable", "false")],
            StepAction::ResolveEndpoint => &[("scheme", "http")],
            _ => &[],
        }
    }

    /// Outputs every successful run of this action produces
    pub fn builtin_outputs(&self) -> &'static [&'static str] {
        match self {
            StepAction::Authenticate => &["registry", "account_id", "region"],
            StepAction::BuildImage => &["local_image"],
            StepAction::PushImage => &["image", "tag"],
            StepAction::RenderTaskDefinition => &["task_definition"],
            StepAction::Deploy => &["task_definition_arn", "revision", "deployment_id", "status"],
            StepAction::ServiceStatus => &["status", "running_count", "desired_count"],
            StepAction::ResolveEndpoint => &["url", "public_ip"],
        }
    }

    /// Whether `name` is a parameter this action understands
    pub fn accepts_parameter(&self, name: &str) -> bool {
        self.required_parameters().contains(&name)
            || self.optional_parameters().iter().any(|(p, _)| *p == name)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StepAction::Authenticate => "authenticate",
            StepAction::BuildImage => "build_image",
            StepAction::PushImage => "push_image",
            StepAction::RenderTaskDefinition => "render_task_definition",
            StepAction::Deploy => "deploy",
            StepAction::ServiceStatus => "service_status",
            StepAction::ResolveEndpoint => "resolve_endpoint",
        }
    }
}

impl fmt::Display for StepAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single step in a pipeline
#[derive(Debug, Clone)]
pub struct Step {
    /// Unique step identifier, also the namespace of its outputs
    pub id: String,

    /// Human-readable name
    pub name: String,

    /// What the step does
    pub action: StepAction,

    /// Parameter templates, with optional parameters filled from their defaults
    pub parameters: HashMap<String, String>,

    /// Extra output templates, evaluated after the action succeeds
    pub outputs: HashMap<String, String>,

    /// Timeout in seconds
    pub timeout_secs: u64,

    /// Runtime state
    pub state: StepState,
}

impl Step {
    /// Create a step from a validated step config
    pub fn from_config(config: &StepConfig, defaults: &StepDefaults) -> Self {
        let mut parameters = config.parameters_as_string_map();
        for (name, default) in config.action.optional_parameters() {
            parameters
                .entry(name.to_string())
                .or_insert_with(|| default.to_string());
        }

        Step {
            id: config.id.clone(),
            name: config.name.clone().unwrap_or_else(|| config.id.clone()),
            action: config.action,
            parameters,
            outputs: config.outputs.clone(),
            timeout_secs: config.timeout_secs.unwrap_or(defaults.timeout_secs),
            state: StepState::Pending,
        }
    }

    /// Raw (unresolved) parameter template
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).map(String::as_str)
    }

    /// Every output key later steps may reference
    pub fn declared_outputs(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .action
            .builtin_outputs()
            .iter()
            .map(|k| k.to_string())
            .chain(self.outputs.keys().cloned())
            .collect();
        keys.sort();
        keys.dedup();
        keys
    }
}

#[derive(Debug, Clone)]
pub struct StepDefaults {
    pub timeout_secs: u64,
}

impl Default for StepDefaults {
    fn default() -> Self {
        Self {
            timeout_secs: 900, // 15 minutes, long enough for a rollout
        }
    }
}
