//! Fatal failures halt the run and leave later steps untouched

use super::helpers::*;
use deployline::cloud::{InMemoryCloud, PollPolicy};
use deployline::core::{DeploymentState, StepState};
use deployline::DeployError;
use std::sync::Arc;
use std::time::Duration;

fn with_trailing_status(yaml: String) -> String {
    yaml + r#"
  - id: status
    action: service_status
    with:
      cluster: staging
      service: web
"#
}

#[tokio::test]
async fn test_deployment_timeout_halts_run() {
    let cloud = Arc::new(InMemoryCloud::new().with_service("staging", "web").never_stable());
    let mut pipeline = load_pipeline(&with_trailing_status(four_step_yaml()));

    let result = run_pipeline(&mut pipeline, Arc::clone(&cloud)).await;

    assert_pipeline_failed_at(&result, "deploy");
    assert!(
        matches!(result.error(), DeployError::DeploymentTimeout { service, .. } if service == "web"),
        "{}",
        result.error()
    );
    assert_eq!(result.pipeline.state.deployment, Some(DeploymentState::TimedOut));
    assert_eq!(
        result.pipeline.state.deployment_history.last(),
        Some(&DeploymentState::TimedOut)
    );
    assert_steps_pending(&result, &["status"]);
    assert_execution_order(&result, &["auth", "push", "render", "deploy"]);
}

#[tokio::test]
async fn test_failed_rollout_marks_deployment_failed() {
    let cloud = Arc::new(InMemoryCloud::new().with_service("staging", "web").failing_rollouts());
    let mut pipeline = load_pipeline(&with_trailing_status(four_step_yaml()));

    let result = run_pipeline(&mut pipeline, cloud).await;

    assert_pipeline_failed_at(&result, "deploy");
    assert!(matches!(result.error(), DeployError::DeploymentFailed { .. }));
    assert_eq!(result.pipeline.state.deployment, Some(DeploymentState::Failed));
    assert_steps_pending(&result, &["status"]);
}

#[tokio::test]
async fn test_step_timeout_bounds_a_long_wait() {
    let cloud = Arc::new(InMemoryCloud::new().with_service("staging", "web").never_stable());
    let mut pipeline = load_pipeline(&four_step_yaml());
    pipeline.stability_policy =
        PollPolicy::until_timeout(Duration::from_millis(10), Duration::from_secs(30));
    let deploy = pipeline.steps.iter_mut().find(|s| s.id == "deploy").unwrap();
    deploy.timeout_secs = 1;

    let result = run_pipeline(&mut pipeline, cloud).await;

    assert_pipeline_failed_at(&result, "deploy");
    assert!(
        matches!(result.error(), DeployError::StepTimeout { step, secs: 1 } if step == "deploy"),
        "{}",
        result.error()
    );
    assert_eq!(result.pipeline.state.deployment, Some(DeploymentState::TimedOut));
    assert_eq!(
        result.pipeline.state.deployment_history,
        vec![
            DeploymentState::Pending,
            DeploymentState::Running,
            DeploymentState::TimedOut
        ]
    );
}

#[tokio::test]
async fn test_authentication_failure_halts_first_step() {
    let cloud = Arc::new(
        InMemoryCloud::new()
            .with_service("staging", "web")
            .failing_auth("Unable to locate credentials"),
    );
    let mut pipeline = load_pipeline(&four_step_yaml());

    let result = run_pipeline(&mut pipeline, Arc::clone(&cloud)).await;

    assert_pipeline_failed_at(&result, "auth");
    match result.error() {
        DeployError::Authentication { region, message } => {
            assert_eq!(region, "eu-west-1");
            assert!(message.contains("Unable to locate credentials"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_steps_pending(&result, &["push", "render", "deploy"]);
    assert_eq!(cloud.call_count("push_image").await, 0);
    assert!(result.pipeline.state.deployment.is_none());
}

#[tokio::test]
async fn test_push_failure_registers_nothing() {
    let cloud = Arc::new(
        InMemoryCloud::new()
            .with_service("staging", "web")
            .failing_push("denied: repository does not exist"),
    );
    let mut pipeline = load_pipeline(&four_step_yaml());

    let result = run_pipeline(&mut pipeline, Arc::clone(&cloud)).await;

    assert_pipeline_failed_at(&result, "push");
    assert!(matches!(result.error(), DeployError::Push { .. }));
    assert_steps_pending(&result, &["render", "deploy"]);
    assert!(cloud.revisions("web").await.is_empty());
}

#[tokio::test]
async fn test_unknown_service_fails_deploy() {
    let cloud = Arc::new(InMemoryCloud::new());
    let mut pipeline = load_pipeline(&four_step_yaml());

    let result = run_pipeline(&mut pipeline, Arc::clone(&cloud)).await;

    assert_pipeline_failed_at(&result, "deploy");
    assert!(matches!(result.error(), DeployError::Cloud(_)), "{}", result.error());
    assert_eq!(result.pipeline.state.deployment, Some(DeploymentState::Failed));
    // Registration happened before the update was rejected
    assert_eq!(cloud.revisions("web").await.len(), 1);
}

#[tokio::test]
async fn test_render_with_unknown_container_fails() {
    let yaml = four_step_yaml().replace("container_name: c", "container_name: sidecar");
    let cloud = Arc::new(InMemoryCloud::new().with_service("staging", "web"));
    let mut pipeline = load_pipeline(&yaml);

    let result = run_pipeline(&mut pipeline, cloud).await;

    assert_pipeline_failed_at(&result, "render");
    assert!(matches!(result.error(), DeployError::TaskDefinition(_)));
    match result.step_state("render") {
        StepState::Failed { error, .. } => assert!(error.contains("sidecar"), "{error}"),
        other => panic!("unexpected state {other:?}"),
    }
}
