//! Persistence layer for pipeline run history

#[cfg(feature = "sqlite")]
pub mod store;

#[cfg(feature = "sqlite")]
pub use store::SqliteExecutionStore;

pub use crate::core::ExecutionStatus;
use crate::core::{DeploymentState, Pipeline, Trigger};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Summary of a pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSummary {
    /// Unique execution ID
    pub execution_id: Uuid,

    /// Pipeline name
    pub pipeline_name: String,

    /// What started the run, e.g. `push:main` or `manual`
    pub trigger: String,

    /// Execution status
    pub status: ExecutionStatus,

    /// Where the last deploy step left its deployment
    pub deployment: Option<DeploymentState>,

    /// Step that halted the run
    pub failed_step: Option<String>,

    /// Outputs of every finished step, keyed `step.key`
    pub outputs: BTreeMap<String, String>,

    /// When execution started
    pub started_at: DateTime<Utc>,

    /// When execution completed (if complete)
    pub completed_at: Option<DateTime<Utc>>,

    /// Number of completed steps
    pub completed_steps: usize,

    /// Total number of steps
    pub total_steps: usize,
}

impl ExecutionSummary {
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.completed_at.map(|end| end - self.started_at)
    }
}

/// Trait for persistence backends
#[async_trait::async_trait]
pub trait PersistenceBackend: Send + Sync {
    /// Save a run, replacing any earlier record with the same ID
    async fn save_execution(&self, execution: &ExecutionSummary) -> Result<()>;

    /// Load a run by ID
    async fn load_execution(&self, execution_id: Uuid) -> Result<Option<ExecutionSummary>>;

    /// Runs of a pipeline, newest first
    async fn list_executions(&self, pipeline_name: &str, limit: usize) -> Result<Vec<ExecutionSummary>>;

    /// Every pipeline name with recorded runs
    async fn list_pipelines(&self) -> Result<Vec<String>>;
}

/// In-memory persistence (for tests and `--no-history` runs)
#[derive(Default)]
pub struct InMemoryPersistence {
    executions: RwLock<HashMap<Uuid, ExecutionSummary>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl PersistenceBackend for InMemoryPersistence {
    async fn save_execution(&self, execution: &ExecutionSummary) -> Result<()> {
        self.executions
            .write()
            .await
            .insert(execution.execution_id, execution.clone());
        Ok(())
    }

    async fn load_execution(&self, execution_id: Uuid) -> Result<Option<ExecutionSummary>> {
        Ok(self.executions.read().await.get(&execution_id).cloned())
    }

    async fn list_executions(&self, pipeline_name: &str, limit: usize) -> Result<Vec<ExecutionSummary>> {
        let executions = self.executions.read().await;
        let mut runs: Vec<ExecutionSummary> = executions
            .values()
            .filter(|e| e.pipeline_name == pipeline_name)
            .cloned()
            .collect();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        runs.truncate(limit);
        Ok(runs)
    }

    async fn list_pipelines(&self) -> Result<Vec<String>> {
        let executions = self.executions.read().await;
        let mut names: Vec<String> = executions.values().map(|e| e.pipeline_name.clone()).collect();
        names.sort();
        names.dedup();
        Ok(names)
    }
}

/// Create a summary from a pipeline after (or during) a run
pub fn create_summary(pipeline: &Pipeline, trigger: &Trigger) -> ExecutionSummary {
    ExecutionSummary {
        execution_id: pipeline.state.execution_id,
        pipeline_name: pipeline.name.clone(),
        trigger: trigger.to_string(),
        status: pipeline.state.status,
        deployment: pipeline.state.deployment,
        failed_step: pipeline.state.failed_step.clone(),
        outputs: pipeline.collected_outputs().into_iter().collect(),
        started_at: pipeline.state.started_at.unwrap_or_else(Utc::now),
        completed_at: pipeline.state.completed_at,
        completed_steps: pipeline.state.completed_steps,
        total_steps: pipeline.state.total_steps,
    }
}
