//! Test utilities for deployline scenarios

use deployline::cloud::{InMemoryCloud, PollPolicy};
use deployline::core::{ExecutionStatus, Pipeline, PipelineConfig, StepState};
use deployline::execution::{ExecutionEngine, ExecutionEvent, RunReport};
use deployline::DeployError;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Minimal Fargate task definition with a single container named `c`
pub const TEMPLATE: &str = r#"{"family":"web","networkMode":"awsvpc","requiresCompatibilities":["FARGATE"],"cpu":"256","memory":"512","containerDefinitions":[{"name":"c","image":"placeholder","essential":true,"portMappings":[{"containerPort":8080}]}]}"#;

/// Registry host the in-memory cloud reports for eu-west-1
pub const REGISTRY: &str = "123456789012.dkr.ecr.eu-west-1.amazonaws.com";

/// Load a pipeline and shrink its polling bounds to test scale
pub fn load_pipeline(yaml: &str) -> Pipeline {
    let config = PipelineConfig::from_yaml(yaml).unwrap_or_else(|e| panic!("invalid pipeline: {}", e));
    let mut pipeline = config.to_pipeline();
    pipeline.stability_policy = PollPolicy::until_timeout(Duration::from_millis(1), Duration::from_millis(50));
    pipeline.endpoint_policy = PollPolicy::attempts(3, Duration::from_millis(1));
    pipeline
}

/// The four-step authenticate/push/render/deploy pipeline
pub fn four_step_yaml() -> String {
    format!(
        r#"
name: "four-step"
env:
  AWS_REGION: eu-west-1
steps:
  - id: auth
    action: authenticate
    with:
      region: "${{env.AWS_REGION}}"
  - id: push
    action: push_image
    with:
      registry: "${{auth.registry}}"
      repository: myrepo
      tag: abc123
      local_image: "myrepo:local"
  - id: render
    action: render_task_definition
    with:
      template: '{}'
      container_name: c
      image: "${{push.image}}"
  - id: deploy
    action: deploy
    with:
      task_definition: "${{render.task_definition}}"
      service: web
      cluster: staging
      wait_for_stable: true
"#,
        TEMPLATE
    )
}

/// Test result from running a pipeline
pub struct PipelineTestResult {
    pub pipeline: Pipeline,
    pub result: Result<RunReport, DeployError>,
    /// Step IDs in the order they started
    pub started: Vec<String>,
}

impl PipelineTestResult {
    pub fn report(&self) -> &RunReport {
        match &self.result {
            Ok(report) => report,
            Err(e) => panic!("pipeline failed: {}", e),
        }
    }

    pub fn error(&self) -> &DeployError {
        match &self.result {
            Ok(_) => panic!("pipeline should have failed"),
            Err(e) => e,
        }
    }

    pub fn step_state(&self, step_id: &str) -> &StepState {
        &self
            .pipeline
            .step(step_id)
            .unwrap_or_else(|| panic!("Step '{}' not found", step_id))
            .state
    }
}

/// Run a pipeline against an in-memory cloud
pub async fn run_pipeline(pipeline: &mut Pipeline, cloud: Arc<InMemoryCloud>) -> PipelineTestResult {
    let started = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&started);
    let engine = ExecutionEngine::new(cloud).with_event_handler(move |event| {
        if let ExecutionEvent::StepStarted { step_id, .. } = event {
            sink.lock().unwrap().push(step_id);
        }
    });

    let result = engine.execute(pipeline).await;
    let started = started.lock().unwrap().clone();

    PipelineTestResult {
        pipeline: pipeline.clone(),
        result,
        started,
    }
}

pub fn assert_pipeline_completed(result: &PipelineTestResult) {
    assert!(
        matches!(result.pipeline.state.status, ExecutionStatus::Completed),
        "Pipeline should be completed, got {:?} ({:?})",
        result.pipeline.state.status,
        result.result.as_ref().err()
    );
}

pub fn assert_pipeline_failed_at(result: &PipelineTestResult, step_id: &str) {
    assert!(
        matches!(result.pipeline.state.status, ExecutionStatus::Failed),
        "Pipeline should have failed, got {:?}",
        result.pipeline.state.status
    );
    assert_eq!(result.pipeline.state.failed_step.as_deref(), Some(step_id));
    assert!(
        matches!(result.step_state(step_id), StepState::Failed { .. }),
        "Step '{}' should have failed, but was in state: {:?}",
        step_id,
        result.step_state(step_id)
    );
}

pub fn assert_steps_pending(result: &PipelineTestResult, step_ids: &[&str]) {
    for step_id in step_ids {
        assert!(
            matches!(result.step_state(step_id), StepState::Pending),
            "Step '{}' should not have run, but was in state: {:?}",
            step_id,
            result.step_state(step_id)
        );
    }
}

pub fn assert_execution_order(result: &PipelineTestResult, expected: &[&str]) {
    assert_eq!(result.started, expected, "steps started out of order");
}

pub fn assert_step_output(result: &PipelineTestResult, step_id: &str, key: &str, expected: &str) {
    match result.step_state(step_id) {
        StepState::Completed { outputs, .. } => assert_eq!(
            outputs.get(key).map(String::as_str),
            Some(expected),
            "Step '{}' output '{}'",
            step_id,
            key
        ),
        other => panic!("Step '{}' is not completed: {:?}", step_id, other),
    }
}
