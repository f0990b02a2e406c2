//! Values exchanged with the orchestration service

use crate::core::DeploymentStatus;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Result of logging in to a region's image registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub region: String,
    pub account_id: String,
    /// Registry host, e.g. `123456789012.dkr.ecr.eu-west-1.amazonaws.com`
    pub registry: String,
    pub username: String,
}

/// Fully qualified image reference in a registry
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageUri {
    pub registry: String,
    pub repository: String,
    pub tag: String,
}

impl ImageUri {
    pub fn new(registry: &str, repository: &str, tag: &str) -> Self {
        Self {
            registry: registry.trim_end_matches('/').to_string(),
            repository: repository.trim_matches('/').to_string(),
            tag: tag.to_string(),
        }
    }
}

impl fmt::Display for ImageUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.registry, self.repository, self.tag)
    }
}

/// A task definition revision the registry accepted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredTaskDefinition {
    pub arn: String,
    pub family: String,
    pub revision: u32,
}

/// One deployment within a service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDeployment {
    pub id: String,
    pub status: DeploymentStatus,
    pub task_definition: String,
    pub desired_count: u32,
    pub running_count: u32,
    /// `IN_PROGRESS`, `COMPLETED` or `FAILED` when the service reports it
    pub rollout_state: Option<String>,
}

impl ServiceDeployment {
    pub fn rollout_failed(&self) -> bool {
        self.rollout_state.as_deref() == Some("FAILED")
    }
}

/// Snapshot of a service and its deployments
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescription {
    pub cluster: String,
    pub service: String,
    pub task_definition: String,
    pub desired_count: u32,
    pub running_count: u32,
    pub deployments: Vec<ServiceDeployment>,
}

impl ServiceDescription {
    pub fn primary(&self) -> Option<&ServiceDeployment> {
        self.deployments
            .iter()
            .find(|d| d.status == DeploymentStatus::Primary)
    }

    /// Stable on `task_definition_arn`: a single primary deployment running it at full count
    pub fn is_stable_on(&self, task_definition_arn: &str) -> bool {
        match self.deployments.as_slice() {
            [only] => {
                only.status == DeploymentStatus::Primary
                    && only.task_definition == task_definition_arn
                    && only.running_count == only.desired_count
                    && self.running_count == self.desired_count
                    && !only.rollout_failed()
            }
            _ => false,
        }
    }

    /// The deployment rolling out `task_definition_arn`, if the service reports it failed
    pub fn failed_rollout(&self, task_definition_arn: &str) -> Option<&ServiceDeployment> {
        self.deployments
            .iter()
            .find(|d| d.task_definition == task_definition_arn && d.rollout_failed())
    }
}

/// A reachable address for a service's running task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub scheme: String,
    pub public_ip: String,
    pub port: u16,
}

impl Endpoint {
    pub fn url(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.public_ip, self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url())
    }
}
