//! Endpoint discovery after a deploy

use super::helpers::*;
use deployline::cloud::InMemoryCloud;
use deployline::core::{ExecutionStatus, StepState};
use deployline::DeployError;
use std::sync::Arc;

fn with_endpoint(yaml: String) -> String {
    yaml + r#"
  - id: endpoint
    action: resolve_endpoint
    with:
      cluster: staging
      service: web
      port: 8080
    outputs:
      health_check: "${endpoint.url}/health"
"#
}

#[tokio::test]
async fn test_endpoint_resolved_from_running_task() {
    let cloud = Arc::new(
        InMemoryCloud::new()
            .with_service("staging", "web")
            .with_running_task("staging", "web", "198.51.100.7"),
    );
    let mut pipeline = load_pipeline(&with_endpoint(four_step_yaml()));

    let result = run_pipeline(&mut pipeline, cloud).await;

    assert_pipeline_completed(&result);
    assert_step_output(&result, "endpoint", "public_ip", "198.51.100.7");
    assert_step_output(&result, "endpoint", "url", "http://198.51.100.7:8080");
    assert_step_output(&result, "endpoint", "health_check", "http://198.51.100.7:8080/health");
}

#[tokio::test]
async fn test_missing_endpoint_warns_and_run_completes() {
    let cloud = Arc::new(
        InMemoryCloud::new()
            .with_service("staging", "web")
            .with_pending_task("staging", "web"),
    );
    let mut pipeline = load_pipeline(&with_endpoint(four_step_yaml()));

    let result = run_pipeline(&mut pipeline, Arc::clone(&cloud)).await;

    assert_pipeline_completed(&result);
    assert!(matches!(result.step_state("endpoint"), StepState::Warned { .. }));

    let report = result.report();
    assert_eq!(report.status, ExecutionStatus::Completed);
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.warnings[0].0, "endpoint");
    assert!(report.output("endpoint", "url").is_none());
    assert_step_output(&result, "deploy", "status", "STABLE");

    // Bounded by the endpoint policy's three attempts
    assert_eq!(cloud.call_count("list_running_tasks").await, 3);
}

#[tokio::test]
async fn test_reading_a_warned_step_output_fails_later() {
    let yaml = with_endpoint(four_step_yaml())
        + r#"
  - id: announce
    action: render_task_definition
    with:
      template: "${render.task_definition}"
      container_name: c
      image: "${endpoint.url}"
"#;
    let cloud = Arc::new(
        InMemoryCloud::new()
            .with_service("staging", "web")
            .with_pending_task("staging", "web"),
    );
    let mut pipeline = load_pipeline(&yaml);

    let result = run_pipeline(&mut pipeline, cloud).await;

    assert_pipeline_failed_at(&result, "announce");
    assert!(matches!(result.step_state("endpoint"), StepState::Warned { .. }));
    match result.error() {
        DeployError::UnresolvedReference(reference) => {
            assert_eq!(reference.to_string(), "${endpoint.url}")
        }
        other => panic!("unexpected error: {other}"),
    }
}
