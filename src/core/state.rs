//! Execution state models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::warn;
use uuid::Uuid;

/// Overall pipeline execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    /// Pipeline has not started
    Pending,
    /// Pipeline is currently running
    Running,
    /// Every step completed (some may have warned)
    Completed,
    /// A step failed and the run was halted
    Failed,
}

impl ExecutionStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Pending" => Some(Self::Pending),
            "Running" => Some(Self::Running),
            "Completed" => Some(Self::Completed),
            "Failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// State of a single step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StepState {
    /// Step has not run yet (or never will, after an earlier failure)
    Pending,
    /// Step is currently running
    Running { started_at: DateTime<Utc> },
    /// Step completed successfully
    Completed {
        outputs: HashMap<String, String>,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    },
    /// Step hit a non-fatal failure; the run continued without its outputs
    Warned {
        warning: String,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    },
    /// Step failed and halted the run
    Failed {
        error: String,
        started_at: DateTime<Utc>,
        failed_at: DateTime<Utc>,
    },
}

impl StepState {
    /// Check if step is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepState::Completed { .. } | StepState::Warned { .. } | StepState::Failed { .. }
        )
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        match self {
            StepState::Pending => None,
            StepState::Running { started_at }
            | StepState::Completed { started_at, .. }
            | StepState::Warned { started_at, .. }
            | StepState::Failed { started_at, .. } => Some(*started_at),
        }
    }
}

/// Status of one deployment inside a service, as the orchestrator reports it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeploymentStatus {
    /// The deployment the service is converging on
    Primary,
    /// An older deployment still running tasks
    Active,
    /// A deployment whose tasks are being stopped
    Draining,
    /// Missing, or a status this tool does not recognise
    Unknown,
}

impl DeploymentStatus {
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "PRIMARY" => Self::Primary,
            "ACTIVE" => Self::Active,
            "DRAINING" => Self::Draining,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Primary => "PRIMARY",
            Self::Active => "ACTIVE",
            Self::Draining => "DRAINING",
            Self::Unknown => "UNKNOWN",
        })
    }
}

/// Lifecycle of a single deploy: `Pending -> Running -> {Stable, Failed, TimedOut}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeploymentState {
    Pending,
    Running,
    Stable,
    Failed,
    TimedOut,
}

impl DeploymentState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stable | Self::Failed | Self::TimedOut)
    }

    /// Whether the lifecycle allows moving from `self` to `next`
    pub fn can_transition_to(&self, next: DeploymentState) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Pending, Self::Failed)
                | (Self::Running, Self::Stable)
                | (Self::Running, Self::Failed)
                | (Self::Running, Self::TimedOut)
        )
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "RUNNING" => Some(Self::Running),
            "STABLE" => Some(Self::Stable),
            "FAILED" => Some(Self::Failed),
            "TIMED_OUT" => Some(Self::TimedOut),
            _ => None,
        }
    }
}

impl fmt::Display for DeploymentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Stable => "STABLE",
            Self::Failed => "FAILED",
            Self::TimedOut => "TIMED_OUT",
        })
    }
}

/// Lifecycle of one deploy, shared between the step driving it and the engine
///
/// Every move goes through [`DeploymentState::can_transition_to`]; a move the
/// state machine forbids is logged and dropped.
#[derive(Debug, Clone)]
pub struct DeploymentTracker {
    history: Arc<Mutex<Vec<DeploymentState>>>,
}

impl DeploymentTracker {
    /// A tracker sitting at `Pending`
    pub fn new() -> Self {
        Self {
            history: Arc::new(Mutex::new(vec![DeploymentState::Pending])),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<DeploymentState>> {
        self.history.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Move to `next`; returns whether the move was allowed
    pub fn advance(&self, next: DeploymentState) -> bool {
        let mut history = self.lock();
        let current = history.last().copied().unwrap_or(DeploymentState::Pending);
        if !current.can_transition_to(next) {
            warn!("Ignoring deployment transition {} -> {}", current, next);
            return false;
        }
        history.push(next);
        true
    }

    pub fn current(&self) -> DeploymentState {
        self.lock().last().copied().unwrap_or(DeploymentState::Pending)
    }

    /// Every state passed through, starting at `Pending`
    pub fn history(&self) -> Vec<DeploymentState> {
        self.lock().clone()
    }
}

impl Default for DeploymentTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Overall pipeline state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineState {
    /// Unique execution ID
    pub execution_id: Uuid,

    /// Current execution status
    pub status: ExecutionStatus,

    /// When execution started
    pub started_at: Option<DateTime<Utc>>,

    /// When execution completed/failed
    pub completed_at: Option<DateTime<Utc>>,

    /// Total number of steps
    pub total_steps: usize,

    /// Number of steps that finished (completed or warned)
    pub completed_steps: usize,

    /// Step that halted the run, if any
    pub failed_step: Option<String>,

    /// Where the last deploy step got to
    pub deployment: Option<DeploymentState>,

    /// States the last deploy step passed through, in order
    #[serde(default)]
    pub deployment_history: Vec<DeploymentState>,
}

impl PipelineState {
    /// Create a new pipeline state
    pub fn new() -> Self {
        Self {
            execution_id: Uuid::new_v4(),
            status: ExecutionStatus::Pending,
            started_at: None,
            completed_at: None,
            total_steps: 0,
            completed_steps: 0,
            failed_step: None,
            deployment: None,
            deployment_history: Vec::new(),
        }
    }

    /// Mark pipeline as started
    pub fn start(&mut self, total_steps: usize) {
        self.status = ExecutionStatus::Running;
        self.started_at = Some(Utc::now());
        self.total_steps = total_steps;
    }

    /// Mark pipeline as completed
    pub fn complete(&mut self) {
        self.status = ExecutionStatus::Completed;
        self.completed_at = Some(Utc::now());
    }

    /// Mark pipeline as failed at `step_id`
    pub fn fail(&mut self, step_id: &str) {
        self.status = ExecutionStatus::Failed;
        self.failed_step = Some(step_id.to_string());
        self.completed_at = Some(Utc::now());
    }
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::new()
    }
}
