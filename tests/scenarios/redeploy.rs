//! Running the same pipeline twice

use super::helpers::*;
use deployline::cloud::InMemoryCloud;
use std::sync::Arc;

#[tokio::test]
async fn test_second_run_registers_a_new_revision() {
    let cloud = Arc::new(InMemoryCloud::new().with_service("staging", "web"));
    let mut pipeline = load_pipeline(&four_step_yaml());

    let first = run_pipeline(&mut pipeline, Arc::clone(&cloud)).await;
    assert_pipeline_completed(&first);
    assert_step_output(&first, "deploy", "revision", "1");
    let first_revision = cloud.revisions("web").await[0].clone();

    pipeline.reset();
    let second = run_pipeline(&mut pipeline, Arc::clone(&cloud)).await;
    assert_pipeline_completed(&second);
    assert_step_output(&second, "deploy", "revision", "2");

    assert_ne!(
        first.pipeline.state.execution_id,
        second.pipeline.state.execution_id
    );

    let revisions = cloud.revisions("web").await;
    assert_eq!(revisions.len(), 2);
    assert_eq!(revisions[0], first_revision);
    assert_ne!(
        first.report().output("deploy", "deployment_id"),
        second.report().output("deploy", "deployment_id")
    );
}
