//! Happy-path deploys: authenticate, push, render, deploy

use super::helpers::*;
use deployline::cloud::InMemoryCloud;
use deployline::core::{DeploymentState, ExecutionStatus};
use std::sync::Arc;

#[tokio::test]
async fn test_four_step_deploy_reaches_stable() {
    let cloud = Arc::new(InMemoryCloud::new().with_service("staging", "web"));
    let mut pipeline = load_pipeline(&four_step_yaml());

    let result = run_pipeline(&mut pipeline, Arc::clone(&cloud)).await;

    assert_pipeline_completed(&result);
    let image = format!("{}/myrepo:abc123", REGISTRY);
    assert_step_output(&result, "auth", "registry", REGISTRY);
    assert_step_output(&result, "push", "image", &image);
    assert_step_output(&result, "deploy", "status", "STABLE");
    assert_step_output(&result, "deploy", "revision", "1");

    let report = result.report();
    assert_eq!(report.status, ExecutionStatus::Completed);
    assert_eq!(report.deployment, Some(DeploymentState::Stable));
    assert_eq!(
        result.pipeline.state.deployment_history,
        vec![
            DeploymentState::Pending,
            DeploymentState::Running,
            DeploymentState::Stable
        ]
    );
    assert!(report.warnings.is_empty());
    assert_eq!(
        report.output("deploy", "task_definition_arn"),
        Some("arn:aws:ecs:eu-west-1:123456789012:task-definition/web:1")
    );

    // The registered revision carries exactly the pushed image
    let revisions = cloud.revisions("web").await;
    assert_eq!(revisions.len(), 1);
    assert_eq!(revisions[0].container("c").unwrap().image, image);
    assert_eq!(cloud.pushed_images().await, vec![image]);
}

#[tokio::test]
async fn test_steps_run_in_declared_order() {
    let cloud = Arc::new(InMemoryCloud::new().with_service("staging", "web"));
    let mut pipeline = load_pipeline(&four_step_yaml());

    let result = run_pipeline(&mut pipeline, Arc::clone(&cloud)).await;

    assert_pipeline_completed(&result);
    assert_execution_order(&result, &["auth", "push", "render", "deploy"]);

    let operations: Vec<_> = cloud.calls().await.into_iter().map(|c| c.operation).collect();
    let first_describe = operations
        .iter()
        .position(|op| *op == "describe_service")
        .unwrap();
    assert_eq!(
        &operations[..first_describe],
        &["registry_login", "push_image", "register_task_definition", "update_service"]
    );
}

#[tokio::test]
async fn test_deploy_without_waiting_reports_running() {
    let yaml = four_step_yaml().replace("wait_for_stable: true", "wait_for_stable: false");
    let cloud = Arc::new(InMemoryCloud::new().with_service("staging", "web").never_stable());
    let mut pipeline = load_pipeline(&yaml);

    let result = run_pipeline(&mut pipeline, Arc::clone(&cloud)).await;

    assert_pipeline_completed(&result);
    assert_step_output(&result, "deploy", "status", "RUNNING");
    assert_eq!(result.report().deployment, Some(DeploymentState::Running));
    assert_eq!(cloud.call_count("describe_service").await, 0);
}

#[tokio::test]
async fn test_custom_outputs_feed_later_steps() {
    let yaml = format!(
        r#"
name: "custom-outputs"
env:
  AWS_REGION: eu-west-1
steps:
  - id: build
    action: build_image
    with:
      local_image: "web:local"
  - id: auth
    action: authenticate
    with:
      region: "${{env.AWS_REGION}}"
    outputs:
      repo_prefix: "${{auth.registry}}/team"
  - id: push
    action: push_image
    with:
      registry: "${{auth.repo_prefix}}"
      repository: web
      tag: "v1"
      local_image: "${{build.local_image}}"
  - id: render
    action: render_task_definition
    with:
      template: '{}'
      container_name: c
      image: "${{push.image}}"
      environment: |
        IMAGE_TAG=${{push.tag}}
"#,
        TEMPLATE
    );
    let cloud = Arc::new(InMemoryCloud::new());
    let mut pipeline = load_pipeline(&yaml);

    let result = run_pipeline(&mut pipeline, Arc::clone(&cloud)).await;

    assert_pipeline_completed(&result);
    assert_step_output(&result, "push", "image", &format!("{}/team/web:v1", REGISTRY));
    assert_eq!(cloud.built_images().await, vec!["web:local".to_string()]);

    let rendered = result.report().output("render", "task_definition").unwrap();
    assert!(rendered.contains(r#""name":"IMAGE_TAG","value":"v1""#), "{rendered}");
}
