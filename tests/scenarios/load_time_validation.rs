//! Pipelines that must be rejected before anything runs

use deployline::core::{ConfigError, PipelineConfig, Trigger};
use std::collections::HashMap;

const TRIGGERED: &str = r#"
name: "triggered"
on:
  push:
    branches: [main]
  manual:
    inputs:
      environment:
        options: [staging, production]
        default: staging
steps:
  - id: status
    action: service_status
    with:
      cluster: "${inputs.environment}"
      service: web
"#;

#[test]
fn test_reference_to_later_step_is_rejected() {
    let yaml = r#"
name: "forward"
steps:
  - id: deploy
    action: deploy
    with:
      task_definition: "${render.task_definition}"
      service: web
      cluster: staging
  - id: render
    action: render_task_definition
    with:
      template: td.json
      container_name: c
      image: "nginx:latest"
"#;
    let err = PipelineConfig::from_yaml(yaml).unwrap_err();
    assert!(matches!(err, ConfigError::ForwardReference { ref step, .. } if step == "deploy"), "{err}");
}

#[test]
fn test_reference_to_missing_step_is_rejected() {
    let yaml = r#"
name: "missing"
steps:
  - id: status
    action: service_status
    with:
      cluster: "${deploy.cluster}"
      service: web
"#;
    let err = PipelineConfig::from_yaml(yaml).unwrap_err();
    assert!(matches!(err, ConfigError::UnknownStep { .. }), "{err}");
}

#[test]
fn test_undeclared_env_is_rejected() {
    let yaml = r#"
name: "env"
steps:
  - id: login
    action: authenticate
    with:
      region: "${env.AWS_REGION}"
"#;
    let err = PipelineConfig::from_yaml(yaml).unwrap_err();
    assert!(matches!(err, ConfigError::UndeclaredEnv { .. }), "{err}");
}

#[test]
fn test_missing_required_parameter_is_rejected() {
    let yaml = r#"
name: "missing-param"
steps:
  - id: push
    action: push_image
    with:
      registry: r
      repository: web
      local_image: "web:local"
"#;
    let err = PipelineConfig::from_yaml(yaml).unwrap_err();
    assert!(
        matches!(err, ConfigError::MissingParameter { ref parameter, .. } if parameter == "tag"),
        "{err}"
    );
}

#[test]
fn test_push_to_listed_branch_uses_input_defaults() {
    let config = PipelineConfig::from_yaml(TRIGGERED).unwrap();
    let pipeline = config
        .pipeline_for(&Trigger::Push {
            branch: "main".to_string(),
        })
        .unwrap();
    assert_eq!(pipeline.inputs["environment"], "staging");
}

#[test]
fn test_unlisted_branch_and_bad_input_are_rejected() {
    let config = PipelineConfig::from_yaml(TRIGGERED).unwrap();

    let err = config
        .pipeline_for(&Trigger::Push {
            branch: "feature/x".to_string(),
        })
        .unwrap_err();
    assert!(matches!(err, ConfigError::TriggerRejected(_)), "{err}");

    let inputs = HashMap::from([("environment".to_string(), "qa".to_string())]);
    let err = config.pipeline_for(&Trigger::Manual { inputs }).unwrap_err();
    assert!(matches!(err, ConfigError::TriggerRejected(_)), "{err}");
}
