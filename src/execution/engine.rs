//! Main execution engine - runs a pipeline's steps in order

use crate::{
    cloud::CloudAdapter,
    core::{DeploymentState, DeploymentTracker, ExecutionStatus, Pipeline, StepAction, StepState},
    error::DeployError,
    execution::StepExecutor,
};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Events that can occur during pipeline execution
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    PipelineStarted {
        execution_id: Uuid,
        pipeline_name: String,
        total_steps: usize,
    },
    StepStarted {
        step_id: String,
        action: StepAction,
        index: usize,
    },
    StepCompleted {
        step_id: String,
        outputs: HashMap<String, String>,
    },
    StepWarned {
        step_id: String,
        warning: String,
    },
    StepFailed {
        step_id: String,
        error: String,
    },
    PipelineCompleted {
        execution_id: Uuid,
        status: ExecutionStatus,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

/// Summary of a finished run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub execution_id: Uuid,
    pub pipeline_name: String,
    pub status: ExecutionStatus,
    /// Every step output, keyed `step.key`
    pub outputs: HashMap<String, String>,
    /// Where the last deploy step left its deployment
    pub deployment: Option<DeploymentState>,
    /// Non-fatal failures, as `(step_id, message)`
    pub warnings: Vec<(String, String)>,
}

impl RunReport {
    /// Look up an output by step and key
    pub fn output(&self, step_id: &str, key: &str) -> Option<&str> {
        self.outputs
            .get(&format!("{}.{}", step_id, key))
            .map(String::as_str)
    }
}

/// Main pipeline execution engine
pub struct ExecutionEngine<C: CloudAdapter> {
    cloud: Arc<C>,
    event_handlers: Vec<EventHandler>,
}

impl<C: CloudAdapter> ExecutionEngine<C> {
    pub fn new(cloud: Arc<C>) -> Self {
        Self {
            cloud,
            event_handlers: Vec::new(),
        }
    }

    /// Add an event handler
    pub fn with_event_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.event_handlers.push(Arc::new(handler));
        self
    }

    /// Emit an event to all handlers
    fn emit_event(&self, event: ExecutionEvent) {
        for handler in &self.event_handlers {
            handler(event.clone());
        }
    }

    /// Execute the entire pipeline
    ///
    /// Steps run one at a time in declaration order. The first fatal failure
    /// halts the run: later steps stay `Pending` and the error is returned.
    /// Nothing is rolled back or retried.
    pub async fn execute(&self, pipeline: &mut Pipeline) -> Result<RunReport, DeployError> {
        let execution_id = pipeline.state.execution_id;
        let pipeline_name = pipeline.name.clone();

        info!("Starting pipeline execution: {} ({})", pipeline_name, execution_id);
        pipeline.state.start(pipeline.steps.len());
        self.emit_event(ExecutionEvent::PipelineStarted {
            execution_id,
            pipeline_name: pipeline_name.clone(),
            total_steps: pipeline.steps.len(),
        });

        let executor = StepExecutor::new(
            Arc::clone(&self.cloud),
            pipeline.stability_policy,
            pipeline.endpoint_policy,
        );
        let mut context = pipeline.create_run_context();
        let mut warnings = Vec::new();

        for index in 0..pipeline.steps.len() {
            let step = pipeline.steps[index].clone();
            let started_at = Utc::now();

            pipeline.steps[index].state = StepState::Running { started_at };
            let tracker = DeploymentTracker::new();
            let is_deploy = step.action == StepAction::Deploy;
            if is_deploy {
                pipeline.state.deployment = Some(tracker.current());
            }
            self.emit_event(ExecutionEvent::StepStarted {
                step_id: step.id.clone(),
                action: step.action,
                index,
            });

            let result = executor.execute(&step, &context, &tracker).await;
            if is_deploy {
                if let Err(e) = &result {
                    settle_failed_deployment(&tracker, e);
                }
                pipeline.state.deployment = Some(tracker.current());
                pipeline.state.deployment_history = tracker.history();
            }

            match result {
                Ok(outcome) => {
                    info!("Step {} completed", step.id);
                    context.set_step_outputs(&step.id, outcome.outputs.clone());
                    pipeline.steps[index].state = StepState::Completed {
                        outputs: outcome.outputs.clone(),
                        started_at,
                        completed_at: Utc::now(),
                    };
                    pipeline.state.completed_steps += 1;
                    self.emit_event(ExecutionEvent::StepCompleted {
                        step_id: step.id.clone(),
                        outputs: outcome.outputs,
                    });
                }
                Err(e) if !e.is_fatal() => {
                    warn!("Step {} finished with a warning: {}", step.id, e);
                    pipeline.steps[index].state = StepState::Warned {
                        warning: e.to_string(),
                        started_at,
                        completed_at: Utc::now(),
                    };
                    pipeline.state.completed_steps += 1;
                    warnings.push((step.id.clone(), e.to_string()));
                    self.emit_event(ExecutionEvent::StepWarned {
                        step_id: step.id.clone(),
                        warning: e.to_string(),
                    });
                }
                Err(e) => {
                    error!("Step {} failed: {}", step.id, e);
                    pipeline.steps[index].state = StepState::Failed {
                        error: e.to_string(),
                        started_at,
                        failed_at: Utc::now(),
                    };
                    pipeline.state.fail(&step.id);
                    self.emit_event(ExecutionEvent::StepFailed {
                        step_id: step.id.clone(),
                        error: e.to_string(),
                    });
                    self.emit_event(ExecutionEvent::PipelineCompleted {
                        execution_id,
                        status: ExecutionStatus::Failed,
                    });
                    return Err(e);
                }
            }
        }

        pipeline.state.complete();
        info!(
            "Pipeline execution finished: {} - {:?}",
            pipeline_name, pipeline.state.status
        );
        self.emit_event(ExecutionEvent::PipelineCompleted {
            execution_id,
            status: ExecutionStatus::Completed,
        });

        Ok(RunReport {
            execution_id,
            pipeline_name,
            status: ExecutionStatus::Completed,
            outputs: context.flattened_outputs(),
            deployment: pipeline.state.deployment,
            warnings,
        })
    }
}

/// Bring a deploy that ended in `error` to a terminal state
///
/// A step timeout while the rollout is running leaves it timed out; any other
/// failure that did not already settle the deploy marks it failed.
fn settle_failed_deployment(tracker: &DeploymentTracker, error: &DeployError) {
    if tracker.current().is_terminal() {
        return;
    }
    let next = match (tracker.current(), error) {
        (
            DeploymentState::Running,
            DeployError::StepTimeout { .. } | DeployError::DeploymentTimeout { .. },
        ) => DeploymentState::TimedOut,
        _ => DeploymentState::Failed,
    };
    tracker.advance(next);
}
