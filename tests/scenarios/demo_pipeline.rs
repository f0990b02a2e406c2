//! The pipeline shipped under demos/, run against the simulator

use super::helpers::*;
use deployline::cloud::{InMemoryCloud, PollPolicy};
use deployline::core::{DeploymentState, PipelineConfig, Trigger};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

fn demo_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("demos").join(name)
}

#[tokio::test]
async fn test_demo_pipeline_runs_on_push_to_main() {
    let config = PipelineConfig::from_file(demo_path("deploy.yml")).unwrap();
    let mut pipeline = config
        .pipeline_for(&Trigger::Push {
            branch: "main".to_string(),
        })
        .unwrap();
    pipeline.stability_policy =
        PollPolicy::until_timeout(Duration::from_millis(1), Duration::from_millis(50));
    pipeline.endpoint_policy = PollPolicy::attempts(3, Duration::from_millis(1));

    let cloud = Arc::new(InMemoryCloud::permissive());
    let result = run_pipeline(&mut pipeline, Arc::clone(&cloud)).await;

    assert_pipeline_completed(&result);
    assert_execution_order(
        &result,
        &["login", "build", "push", "render", "deploy", "endpoint"],
    );

    let image = format!("{}/web:latest-build", REGISTRY);
    assert_step_output(&result, "push", "image", &image);
    assert_eq!(result.report().deployment, Some(DeploymentState::Stable));

    let revisions = cloud.revisions("web").await;
    assert_eq!(revisions.len(), 1);
    let container = revisions[0].container("web").unwrap();
    assert_eq!(container.image, image);
    assert!(container
        .environment
        .iter()
        .any(|e| e.name == "DEPLOY_ENV" && e.value == "staging"));

    let url = result.report().output("endpoint", "url").unwrap();
    assert!(url.starts_with("http://") && url.ends_with(":8080"), "{url}");
    assert_eq!(
        result.report().output("endpoint", "health_check"),
        Some(format!("{}/health", url).as_str())
    );
}
