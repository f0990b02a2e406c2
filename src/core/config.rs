//! Pipeline configuration from YAML

use crate::cloud::status::PollPolicy;
use crate::core::{
    reference::{self, Reference, ENV_NAMESPACE, INPUTS_NAMESPACE},
    step::{StepAction, StepDefaults},
    Pipeline,
};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors raised while loading or validating a pipeline
///
/// All of these are detected before any external call is made.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid pipeline YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Pipeline '{0}' has no steps")]
    NoSteps(String),

    #[error("Invalid step ID '{0}' (use letters, digits, '_' or '-', and not 'env' or 'inputs')")]
    InvalidStepId(String),

    #[error("Duplicate step ID: {0}")]
    DuplicateStep(String),

    #[error("Step '{step}' ({action}) is missing required parameter '{parameter}'")]
    MissingParameter {
        step: String,
        action: StepAction,
        parameter: String,
    },

    #[error("Step '{step}' ({action}) does not accept parameter '{parameter}'")]
    UnknownParameter {
        step: String,
        action: StepAction,
        parameter: String,
    },

    #[error("Step '{step}' parameter '{parameter}' is invalid: {message}")]
    InvalidParameter {
        step: String,
        parameter: String,
        message: String,
    },

    #[error("Step '{step}' has invalid output name '{output}'")]
    InvalidOutputName { step: String, output: String },

    #[error("Step '{step}' contains malformed reference {expression}")]
    MalformedReference { step: String, expression: String },

    #[error("Step '{step}' references {reference}, but no step with that ID exists")]
    UnknownStep { step: String, reference: Reference },

    #[error("Step '{step}' references {reference}, which is not produced by an earlier step")]
    ForwardReference { step: String, reference: Reference },

    #[error("Step '{step}' references {reference}, which that step does not declare")]
    UndeclaredOutput { step: String, reference: Reference },

    #[error("Step '{step}' references {reference}, which is not declared under 'env'")]
    UndeclaredEnv { step: String, reference: Reference },

    #[error("Step '{step}' references {reference}, which is not a declared manual input")]
    UndeclaredInput { step: String, reference: Reference },

    #[error("Invalid trigger configuration: {0}")]
    InvalidTrigger(String),

    #[error("Invalid polling configuration: {0}")]
    InvalidPolling(String),

    #[error("Step '{step}' times out after {timeout_secs}s, before its {stable_timeout_secs}s stability wait can finish")]
    TimeoutBelowStabilityWait {
        step: String,
        timeout_secs: u64,
        stable_timeout_secs: u64,
    },

    #[error("Trigger rejected: {0}")]
    TriggerRejected(String),
}

/// Top-level pipeline configuration loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pipeline name
    pub name: String,

    /// Optional description
    #[serde(default)]
    pub description: Option<String>,

    /// Events allowed to start the pipeline
    #[serde(rename = "on", default)]
    pub triggers: Option<TriggerConfig>,

    /// Environment bindings, referenced as `${env.NAME}`
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Polling bounds for stability waits and endpoint discovery
    #[serde(default)]
    pub polling: PollingConfig,

    /// Default timeout for steps (in seconds)
    #[serde(default)]
    pub default_timeout_secs: Option<u64>,

    /// Pipeline steps, executed in this order
    pub steps: Vec<StepConfig>,
}

/// Step configuration as defined in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepConfig {
    /// Unique step identifier
    pub id: String,

    /// Human-readable step name
    #[serde(default)]
    pub name: Option<String>,

    /// What the step does
    pub action: StepAction,

    /// Action parameters; scalar values of any YAML type
    #[serde(default, rename = "with")]
    parameters: BTreeMap<String, Value>,

    /// Extra named outputs, as templates
    #[serde(default)]
    pub outputs: HashMap<String, String>,

    /// Timeout for this step (overrides the pipeline default)
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Trigger section (`on:`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriggerConfig {
    /// Run on pushes to these branches
    #[serde(default)]
    pub push: Option<PushTrigger>,

    /// Run on manual invocation
    #[serde(default)]
    pub manual: Option<ManualTrigger>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushTrigger {
    pub branches: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManualTrigger {
    #[serde(default)]
    pub inputs: BTreeMap<String, InputDefinition>,
}

/// A manual-trigger input constrained to an enumerated set of values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputDefinition {
    #[serde(default)]
    pub description: Option<String>,

    pub options: Vec<String>,

    #[serde(default)]
    pub default: Option<String>,

    #[serde(default)]
    pub required: bool,
}

/// How the run was started
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    Push { branch: String },
    Manual { inputs: HashMap<String, String> },
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trigger::Push { branch } => write!(f, "push:{}", branch),
            Trigger::Manual { .. } => write!(f, "manual"),
        }
    }
}

/// Polling bounds
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    #[serde(default = "default_stable_timeout_secs")]
    pub stable_timeout_secs: u64,

    #[serde(default = "default_endpoint_attempts")]
    pub endpoint_attempts: u32,

    #[serde(default = "default_endpoint_interval_secs")]
    pub endpoint_interval_secs: u64,
}

fn default_interval_secs() -> u64 {
    15
}

fn default_stable_timeout_secs() -> u64 {
    600
}

fn default_endpoint_attempts() -> u32 {
    10
}

fn default_endpoint_interval_secs() -> u64 {
    6
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            stable_timeout_secs: default_stable_timeout_secs(),
            endpoint_attempts: default_endpoint_attempts(),
            endpoint_interval_secs: default_endpoint_interval_secs(),
        }
    }
}

impl PollingConfig {
    /// Policy for waiting on service stability
    pub fn stability_policy(&self) -> PollPolicy {
        PollPolicy::until_timeout(
            Duration::from_secs(self.interval_secs),
            Duration::from_secs(self.stable_timeout_secs),
        )
    }

    /// Policy for endpoint discovery
    pub fn endpoint_policy(&self) -> PollPolicy {
        PollPolicy::attempts(
            self.endpoint_attempts,
            Duration::from_secs(self.endpoint_interval_secs),
        )
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_secs == 0 {
            return Err(ConfigError::InvalidPolling("interval_secs must be positive".to_string()));
        }
        if self.stable_timeout_secs < self.interval_secs {
            return Err(ConfigError::InvalidPolling(
                "stable_timeout_secs must be at least interval_secs".to_string(),
            ));
        }
        if self.endpoint_attempts == 0 {
            return Err(ConfigError::InvalidPolling("endpoint_attempts must be positive".to_string()));
        }
        Ok(())
    }
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl StepConfig {
    /// Parameters with every scalar rendered as a string
    pub fn parameters_as_string_map(&self) -> HashMap<String, String> {
        self.parameters
            .iter()
            .filter_map(|(k, v)| value_to_string(v).map(|s| (k.clone(), s)))
            .collect()
    }

    fn validate_parameters(&self) -> Result<(), ConfigError> {
        for (name, value) in &self.parameters {
            if !self.action.accepts_parameter(name) {
                return Err(ConfigError::UnknownParameter {
                    step: self.id.clone(),
                    action: self.action,
                    parameter: name.clone(),
                });
            }
            if value_to_string(value).is_none() {
                return Err(ConfigError::InvalidParameter {
                    step: self.id.clone(),
                    parameter: name.clone(),
                    message: "expected a string, number or boolean".to_string(),
                });
            }
        }

        for required in self.action.required_parameters() {
            if !self.parameters.contains_key(*required) {
                return Err(ConfigError::MissingParameter {
                    step: self.id.clone(),
                    action: self.action,
                    parameter: required.to_string(),
                });
            }
        }

        // Literal values can be checked now; templated ones are checked when resolved
        let params = self.parameters_as_string_map();
        if let Some(wait) = params.get("wait_for_stable") {
            if !wait.contains("${") && wait.parse::<bool>().is_err() {
                return Err(ConfigError::InvalidParameter {
                    step: self.id.clone(),
                    parameter: "wait_for_stable".to_string(),
                    message: format!("expected true or false, got '{}'", wait),
                });
            }
        }
        if let Some(port) = params.get("port") {
            if !port.contains("${") && port.parse::<u16>().is_err() {
                return Err(ConfigError::InvalidParameter {
                    step: self.id.clone(),
                    parameter: "port".to_string(),
                    message: format!("expected a port number, got '{}'", port),
                });
            }
        }

        for output in self.outputs.keys() {
            if !reference::is_valid_segment(output) {
                return Err(ConfigError::InvalidOutputName {
                    step: self.id.clone(),
                    output: output.clone(),
                });
            }
        }

        Ok(())
    }

    fn declared_outputs(&self) -> HashSet<String> {
        self.action
            .builtin_outputs()
            .iter()
            .map(|k| k.to_string())
            .chain(self.outputs.keys().cloned())
            .collect()
    }
}

impl PipelineConfig {
    /// Load pipeline configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    /// Parse pipeline configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the pipeline configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.steps.is_empty() {
            return Err(ConfigError::NoSteps(self.name.clone()));
        }

        self.polling.validate()?;
        self.validate_triggers()?;

        // Step IDs: well-formed, unique, not shadowing a reserved namespace
        let mut seen_ids = HashSet::new();
        for step in &self.steps {
            if !reference::is_valid_segment(&step.id)
                || step.id == ENV_NAMESPACE
                || step.id == INPUTS_NAMESPACE
            {
                return Err(ConfigError::InvalidStepId(step.id.clone()));
            }
            if !seen_ids.insert(step.id.as_str()) {
                return Err(ConfigError::DuplicateStep(step.id.clone()));
            }
            step.validate_parameters()?;
            self.validate_step_timeout(step)?;
        }

        self.validate_references()
    }

    /// A deploy that may wait must be allowed to outlast the stability wait
    fn validate_step_timeout(&self, step: &StepConfig) -> Result<(), ConfigError> {
        if step.action != StepAction::Deploy {
            return Ok(());
        }
        let wait = step.parameters_as_string_map().get("wait_for_stable").cloned();
        if wait.as_deref().map_or(true, |w| w.trim() == "false") {
            return Ok(());
        }

        let timeout_secs = step
            .timeout_secs
            .or(self.default_timeout_secs)
            .unwrap_or(StepDefaults::default().timeout_secs);
        if timeout_secs <= self.polling.stable_timeout_secs {
            return Err(ConfigError::TimeoutBelowStabilityWait {
                step: step.id.clone(),
                timeout_secs,
                stable_timeout_secs: self.polling.stable_timeout_secs,
            });
        }
        Ok(())
    }

    fn validate_triggers(&self) -> Result<(), ConfigError> {
        let Some(triggers) = &self.triggers else {
            return Ok(());
        };

        if triggers.push.is_none() && triggers.manual.is_none() {
            return Err(ConfigError::InvalidTrigger(
                "'on' must declare push, manual, or both".to_string(),
            ));
        }

        if let Some(push) = &triggers.push {
            if push.branches.is_empty() {
                return Err(ConfigError::InvalidTrigger("push trigger lists no branches".to_string()));
            }
        }

        if let Some(manual) = &triggers.manual {
            for (name, input) in &manual.inputs {
                if input.options.is_empty() {
                    return Err(ConfigError::InvalidTrigger(format!(
                        "input '{}' has no options",
                        name
                    )));
                }
                if let Some(default) = &input.default {
                    if !input.options.contains(default) {
                        return Err(ConfigError::InvalidTrigger(format!(
                            "input '{}' default '{}' is not one of {:?}",
                            name, default, input.options
                        )));
                    }
                }
            }
        }

        Ok(())
    }

    fn declared_inputs(&self) -> HashSet<&str> {
        self.triggers
            .as_ref()
            .and_then(|t| t.manual.as_ref())
            .map(|m| m.inputs.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Every reference must point at something that exists before the step runs
    fn validate_references(&self) -> Result<(), ConfigError> {
        let inputs = self.declared_inputs();
        let all_ids: HashSet<&str> = self.steps.iter().map(|s| s.id.as_str()).collect();
        let mut earlier: HashMap<&str, HashSet<String>> = HashMap::new();

        for step in &self.steps {
            let check = |template: &str, in_outputs: bool| -> Result<(), ConfigError> {
                let refs = reference::parse_references(template).map_err(|expression| {
                    ConfigError::MalformedReference {
                        step: step.id.clone(),
                        expression,
                    }
                })?;

                for r in refs {
                    match &r {
                        Reference::Env(name) => {
                            if !self.env.contains_key(name) {
                                return Err(ConfigError::UndeclaredEnv {
                                    step: step.id.clone(),
                                    reference: r,
                                });
                            }
                        }
                        Reference::Input(name) => {
                            if !inputs.contains(name.as_str()) {
                                return Err(ConfigError::UndeclaredInput {
                                    step: step.id.clone(),
                                    reference: r,
                                });
                            }
                        }
                        Reference::StepOutput { step: target, key } => {
                            // A step's own outputs may read its built-in results
                            if in_outputs && *target == step.id {
                                if !step.action.builtin_outputs().contains(&key.as_str()) {
                                    return Err(ConfigError::UndeclaredOutput {
                                        step: step.id.clone(),
                                        reference: r,
                                    });
                                }
                                continue;
                            }

                            match earlier.get(target.as_str()) {
                                Some(declared) if declared.contains(key) => {}
                                Some(_) => {
                                    return Err(ConfigError::UndeclaredOutput {
                                        step: step.id.clone(),
                                        reference: r,
                                    })
                                }
                                None if all_ids.contains(target.as_str()) => {
                                    return Err(ConfigError::ForwardReference {
                                        step: step.id.clone(),
                                        reference: r,
                                    })
                                }
                                None => {
                                    return Err(ConfigError::UnknownStep {
                                        step: step.id.clone(),
                                        reference: r,
                                    })
                                }
                            }
                        }
                    }
                }
                Ok(())
            };

            for template in step.parameters_as_string_map().values() {
                check(template, false)?;
            }
            for template in step.outputs.values() {
                check(template, true)?;
            }

            earlier.insert(step.id.as_str(), step.declared_outputs());
        }

        Ok(())
    }

    /// Check a trigger against the `on:` section and resolve manual inputs
    ///
    /// Omitted inputs take their declared default.
    pub fn resolve_trigger(&self, trigger: &Trigger) -> Result<HashMap<String, String>, ConfigError> {
        let triggers = self.triggers.clone().unwrap_or_default();
        let defaults = || -> HashMap<String, String> {
            triggers
                .manual
                .iter()
                .flat_map(|m| m.inputs.iter())
                .filter_map(|(name, input)| input.default.clone().map(|d| (name.clone(), d)))
                .collect()
        };

        match trigger {
            Trigger::Push { branch } => {
                if self.triggers.is_some() {
                    let push = triggers.push.as_ref().ok_or_else(|| {
                        ConfigError::TriggerRejected(format!(
                            "pipeline '{}' does not run on push",
                            self.name
                        ))
                    })?;
                    if !push.branches.iter().any(|b| b == branch) {
                        return Err(ConfigError::TriggerRejected(format!(
                            "branch '{}' is not one of {:?}",
                            branch, push.branches
                        )));
                    }
                }
                Ok(defaults())
            }
            Trigger::Manual { inputs } => {
                let declared = match (&self.triggers, &triggers.manual) {
                    (None, _) => BTreeMap::new(),
                    (Some(_), Some(manual)) => manual.inputs.clone(),
                    (Some(_), None) => {
                        return Err(ConfigError::TriggerRejected(format!(
                            "pipeline '{}' does not allow manual runs",
                            self.name
                        )))
                    }
                };

                let mut resolved = defaults();
                for (name, value) in inputs {
                    let definition = declared.get(name).ok_or_else(|| {
                        ConfigError::TriggerRejected(format!("unknown input '{}'", name))
                    })?;
                    if !definition.options.contains(value) {
                        return Err(ConfigError::TriggerRejected(format!(
                            "input '{}' must be one of {:?}, got '{}'",
                            name, definition.options, value
                        )));
                    }
                    resolved.insert(name.clone(), value.clone());
                }

                for (name, definition) in &declared {
                    if definition.required && !resolved.contains_key(name) {
                        return Err(ConfigError::TriggerRejected(format!(
                            "input '{}' is required",
                            name
                        )));
                    }
                }

                Ok(resolved)
            }
        }
    }

    /// Convert config to a Pipeline domain model
    pub fn to_pipeline(&self) -> Pipeline {
        Pipeline::from_config(self)
    }

    /// A pipeline ready to run under `trigger`, with its inputs resolved
    pub fn pipeline_for(&self, trigger: &Trigger) -> Result<Pipeline, ConfigError> {
        let mut pipeline = self.to_pipeline();
        pipeline.inputs = self.resolve_trigger(trigger)?;
        Ok(pipeline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEMPLATE: &str = r#"{"family":"web","containerDefinitions":[{"name":"c","image":"placeholder"}]}"#;

    fn deploy_yaml() -> String {
        format!(
            r#"
name: "Deploy"
on:
  push:
    branches: [main]
  manual:
    inputs:
      environment:
        options: [staging, production]
        default: staging
env:
  AWS_REGION: "eu-west-1"
steps:
  - id: login
    action: authenticate
    with:
      region: "${{env.AWS_REGION}}"
  - id: push
    action: push_image
    with:
      registry: "${{login.registry}}"
      repository: "myrepo"
      tag: "abc123"
      local_image: "myrepo:latest"
  - id: render
    action: render_task_definition
    with:
      template: '{}'
      container_name: "c"
      image: "${{push.image}}"
  - id: deploy
    action: deploy
    with:
      task_definition: "${{render.task_definition}}"
      cluster: "${{inputs.environment}}"
      service: "web"
      wait_for_stable: true
"#,
            TEMPLATE
        )
    }

    #[test]
    fn test_parse_deploy_pipeline() {
        let config = PipelineConfig::from_yaml(&deploy_yaml()).unwrap();
        assert_eq!(config.name, "Deploy");
        assert_eq!(config.steps.len(), 4);
        assert_eq!(config.steps[3].action, StepAction::Deploy);
        assert_eq!(
            config.steps[3].parameters_as_string_map().get("wait_for_stable"),
            Some(&"true".to_string())
        );
        assert_eq!(config.polling.interval_secs, 15);
    }

    #[test]
    fn test_forward_reference_fails_at_load() {
        let yaml = r#"
name: "Forward"
steps:
  - id: render
    action: render_task_definition
    with:
      template: "td.json"
      container_name: "c"
      image: "${push.image}"
  - id: push
    action: push_image
    with:
      registry: "r"
      repository: "myrepo"
      tag: "t"
      local_image: "l"
"#;
        let err = PipelineConfig::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::ForwardReference { .. }), "{err}");
    }

    #[test]
    fn test_undeclared_output_fails_at_load() {
        let yaml = r#"
name: "Undeclared"
steps:
  - id: login
    action: authenticate
    with:
      region: "eu-west-1"
  - id: push
    action: push_image
    with:
      registry: "${login.password}"
      repository: "myrepo"
      tag: "t"
      local_image: "l"
"#;
        let err = PipelineConfig::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::UndeclaredOutput { .. }), "{err}");
        assert!(err.to_string().contains("${login.password}"));
    }

    #[test]
    fn test_unknown_step_reference() {
        let yaml = r#"
name: "Unknown"
steps:
  - id: status
    action: service_status
    with:
      cluster: "${nowhere.cluster}"
      service: "web"
"#;
        let err = PipelineConfig::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownStep { .. }));
    }

    #[test]
    fn test_self_reference_in_parameters_fails() {
        let yaml = r#"
name: "Self"
steps:
  - id: status
    action: service_status
    with:
      cluster: "${status.status}"
      service: "web"
"#;
        let err = PipelineConfig::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::ForwardReference { .. }));
    }

    #[test]
    fn test_outputs_can_read_own_builtins() {
        let yaml = r#"
name: "Outputs"
steps:
  - id: push
    action: push_image
    with:
      registry: "r"
      repository: "myrepo"
      tag: "t"
      local_image: "l"
    outputs:
      pushed: "${push.image}"
  - id: status
    action: service_status
    with:
      cluster: "${push.pushed}"
      service: "web"
"#;
        PipelineConfig::from_yaml(yaml).expect("custom outputs are referenceable");
    }

    #[test]
    fn test_undeclared_env_and_input() {
        let yaml = r#"
name: "Env"
steps:
  - id: login
    action: authenticate
    with:
      region: "${env.AWS_REGION}"
"#;
        assert!(matches!(
            PipelineConfig::from_yaml(yaml).unwrap_err(),
            ConfigError::UndeclaredEnv { .. }
        ));

        let yaml = r#"
name: "Input"
steps:
  - id: login
    action: authenticate
    with:
      region: "${inputs.region}"
"#;
        assert!(matches!(
            PipelineConfig::from_yaml(yaml).unwrap_err(),
            ConfigError::UndeclaredInput { .. }
        ));
    }

    #[test]
    fn test_missing_and_unknown_parameters() {
        let yaml = r#"
name: "Missing"
steps:
  - id: deploy
    action: deploy
    with:
      task_definition: "td.json"
      service: "web"
"#;
        let err = PipelineConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("cluster"));

        let yaml = r#"
name: "Unknown"
steps:
  - id: login
    action: authenticate
    with:
      region: "eu-west-1"
      password: "hunter2"
"#;
        assert!(matches!(
            PipelineConfig::from_yaml(yaml).unwrap_err(),
            ConfigError::UnknownParameter { .. }
        ));
    }

    #[test]
    fn test_unknown_action_fails() {
        let yaml = r#"
name: "Bad action"
steps:
  - id: x
    action: teleport
"#;
        assert!(matches!(
            PipelineConfig::from_yaml(yaml).unwrap_err(),
            ConfigError::Parse(_)
        ));
    }

    #[test]
    fn test_literal_parameter_checks() {
        let yaml = r#"
name: "Port"
steps:
  - id: endpoint
    action: resolve_endpoint
    with:
      cluster: "c"
      service: "s"
      port: "eighty"
"#;
        assert!(matches!(
            PipelineConfig::from_yaml(yaml).unwrap_err(),
            ConfigError::InvalidParameter { .. }
        ));
    }

    #[test]
    fn test_duplicate_and_reserved_step_ids() {
        let yaml = r#"
name: "Dup"
steps:
  - id: login
    action: authenticate
    with: { region: "a" }
  - id: login
    action: authenticate
    with: { region: "b" }
"#;
        assert!(matches!(
            PipelineConfig::from_yaml(yaml).unwrap_err(),
            ConfigError::DuplicateStep(_)
        ));

        let yaml = r#"
name: "Reserved"
steps:
  - id: env
    action: authenticate
    with: { region: "a" }
"#;
        assert!(matches!(
            PipelineConfig::from_yaml(yaml).unwrap_err(),
            ConfigError::InvalidStepId(_)
        ));
    }

    #[test]
    fn test_empty_pipeline_fails() {
        let yaml = r#"
name: "Empty"
steps: []
"#;
        assert!(matches!(
            PipelineConfig::from_yaml(yaml).unwrap_err(),
            ConfigError::NoSteps(_)
        ));
    }

    #[test]
    fn test_invalid_input_default() {
        let yaml = r#"
name: "Trigger"
on:
  manual:
    inputs:
      environment:
        options: [staging, production]
        default: qa
steps:
  - id: login
    action: authenticate
    with: { region: "a" }
"#;
        assert!(matches!(
            PipelineConfig::from_yaml(yaml).unwrap_err(),
            ConfigError::InvalidTrigger(_)
        ));
    }

    #[test]
    fn test_resolve_push_trigger() {
        let config = PipelineConfig::from_yaml(&deploy_yaml()).unwrap();

        let inputs = config
            .resolve_trigger(&Trigger::Push { branch: "main".to_string() })
            .unwrap();
        assert_eq!(inputs.get("environment"), Some(&"staging".to_string()));

        let err = config
            .resolve_trigger(&Trigger::Push { branch: "feature".to_string() })
            .unwrap_err();
        assert!(matches!(err, ConfigError::TriggerRejected(_)));
    }

    #[test]
    fn test_resolve_manual_trigger() {
        let config = PipelineConfig::from_yaml(&deploy_yaml()).unwrap();

        let mut inputs = HashMap::new();
        inputs.insert("environment".to_string(), "production".to_string());
        let resolved = config
            .resolve_trigger(&Trigger::Manual { inputs: inputs.clone() })
            .unwrap();
        assert_eq!(resolved.get("environment"), Some(&"production".to_string()));

        inputs.insert("environment".to_string(), "qa".to_string());
        assert!(config.resolve_trigger(&Trigger::Manual { inputs }).is_err());

        let mut unknown = HashMap::new();
        unknown.insert("region".to_string(), "eu".to_string());
        assert!(config.resolve_trigger(&Trigger::Manual { inputs: unknown }).is_err());
    }

    #[test]
    fn test_manual_only_rejects_push() {
        let yaml = r#"
name: "Manual only"
on:
  manual: {}
steps:
  - id: login
    action: authenticate
    with: { region: "a" }
"#;
        let config = PipelineConfig::from_yaml(yaml).unwrap();
        assert!(config
            .resolve_trigger(&Trigger::Push { branch: "main".to_string() })
            .is_err());
        assert!(config
            .resolve_trigger(&Trigger::Manual { inputs: HashMap::new() })
            .is_ok());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.yml");
        std::fs::write(&path, deploy_yaml()).unwrap();

        let config = PipelineConfig::from_file(&path).unwrap();
        assert_eq!(config.steps.len(), 4);

        let err = PipelineConfig::from_file(dir.path().join("missing.yml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_polling_policies() {
        let yaml = r#"
name: "Polling"
polling:
  interval_secs: 5
  stable_timeout_secs: 60
  endpoint_attempts: 3
steps:
  - id: login
    action: authenticate
    with: { region: "a" }
"#;
        let config = PipelineConfig::from_yaml(yaml).unwrap();
        let stability = config.polling.stability_policy();
        assert_eq!(stability.interval, Duration::from_secs(5));
        assert_eq!(stability.timeout, Some(Duration::from_secs(60)));

        let endpoint = config.polling.endpoint_policy();
        assert_eq!(endpoint.max_attempts, Some(3));
        assert_eq!(endpoint.interval, Duration::from_secs(6));
    }

    fn waiting_deploy(timeout_secs: u64, wait: &str) -> String {
        format!(
            r#"
name: "Timeouts"
polling:
  interval_secs: 1
  stable_timeout_secs: 5
steps:
  - id: deploy
    action: deploy
    timeout_secs: {}
    with:
      task_definition: td.json
      service: web
      cluster: staging
      wait_for_stable: {}
"#,
            timeout_secs, wait
        )
    }

    #[test]
    fn test_deploy_timeout_must_outlast_stability_wait() {
        let err = PipelineConfig::from_yaml(&waiting_deploy(2, "true")).unwrap_err();
        assert!(
            matches!(
                err,
                ConfigError::TimeoutBelowStabilityWait {
                    timeout_secs: 2,
                    stable_timeout_secs: 5,
                    ..
                }
            ),
            "{err}"
        );

        assert!(PipelineConfig::from_yaml(&waiting_deploy(5, "true")).is_err());
        assert!(PipelineConfig::from_yaml(&waiting_deploy(6, "true")).is_ok());
        assert!(PipelineConfig::from_yaml(&waiting_deploy(2, "false")).is_ok());
    }

    #[test]
    fn test_default_timeout_checked_against_stability_wait() {
        let yaml = r#"
name: "Defaults"
default_timeout_secs: 300
steps:
  - id: deploy
    action: deploy
    with:
      task_definition: td.json
      service: web
      cluster: staging
      wait_for_stable: true
"#;
        let err = PipelineConfig::from_yaml(yaml).unwrap_err();
        assert!(
            matches!(err, ConfigError::TimeoutBelowStabilityWait { stable_timeout_secs: 600, .. }),
            "{err}"
        );
    }
}
