//! Errors a pipeline run can end with

use crate::cloud::CloudError;
use crate::core::config::ConfigError;
use crate::core::reference::Reference;
use crate::core::task_definition::TaskDefinitionError;
use thiserror::Error;

/// Error types for pipeline execution
#[derive(Debug, Error)]
pub enum DeployError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Authentication to registry in {region} failed: {message}")]
    Authentication { region: String, message: String },

    #[error("Failed to build image {image}: {message}")]
    Build { image: String, message: String },

    #[error("Failed to push image {image}: {message}")]
    Push { image: String, message: String },

    #[error(transparent)]
    TaskDefinition(#[from] TaskDefinitionError),

    #[error("Deployment {deployment_id} of service '{service}' in cluster '{cluster}' failed: {reason}")]
    DeploymentFailed {
        cluster: String,
        service: String,
        deployment_id: String,
        reason: String,
    },

    #[error("Service '{service}' in cluster '{cluster}' did not stabilise within {timeout_secs}s")]
    DeploymentTimeout {
        cluster: String,
        service: String,
        timeout_secs: u64,
    },

    #[error("No public endpoint for service '{service}' in cluster '{cluster}' after {attempts} attempts")]
    EndpointNotFound {
        cluster: String,
        service: String,
        attempts: u32,
    },

    #[error("Step '{step}' timed out after {secs} seconds")]
    StepTimeout { step: String, secs: u64 },

    #[error("Unresolved reference {0}")]
    UnresolvedReference(Reference),

    #[error("Invalid value for parameter '{parameter}' of step '{step}': {message}")]
    InvalidParameter {
        step: String,
        parameter: String,
        message: String,
    },

    #[error(transparent)]
    Cloud(#[from] CloudError),
}

impl DeployError {
    /// Whether this error halts the run
    ///
    /// A missing endpoint only means nothing is reachable yet; the deployment
    /// itself may still be fine.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, DeployError::EndpointNotFound { .. })
    }
}
