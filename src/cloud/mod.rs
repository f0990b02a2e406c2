//! Container orchestration adapter
//!
//! [`CloudAdapter`] is the thin seam over every external call a pipeline
//! makes. [`AwsCliClient`] drives the real service through the `aws` and
//! `docker` command-line tools; [`InMemoryCloud`] simulates it for dry runs
//! and tests. [`Deployer`] and [`StatusReporter`] build the pipeline-level
//! operations on top of the seam.

pub mod aws_cli;
pub mod deployer;
pub mod error;
pub mod memory;
pub mod status;
pub mod types;

use crate::core::TaskDefinitionDocument;
use async_trait::async_trait;

pub use aws_cli::{AwsCliClient, CloudClientConfig};
pub use deployer::{DeploymentResult, Deployer};
pub use error::CloudError;
pub use memory::InMemoryCloud;
pub use status::{PollPolicy, ServiceStatus, StatusReporter};
pub use types::*;

/// External calls against the registry and orchestration service
#[async_trait]
pub trait CloudAdapter: Send + Sync {
    /// Log the local container engine in to the region's registry
    async fn registry_login(&self, region: &str) -> Result<Credentials, CloudError>;

    /// Build a local image
    async fn build_image(
        &self,
        context: &str,
        dockerfile: &str,
        local_image: &str,
    ) -> Result<(), CloudError>;

    /// Tag a local image as `image` and push it
    async fn push_image(&self, local_image: &str, image: &ImageUri) -> Result<(), CloudError>;

    /// Register a new revision of a task definition family
    async fn register_task_definition(
        &self,
        document: &TaskDefinitionDocument,
    ) -> Result<RegisteredTaskDefinition, CloudError>;

    /// Point a service at a task definition; returns the new deployment's ID
    async fn update_service(
        &self,
        cluster: &str,
        service: &str,
        task_definition_arn: &str,
    ) -> Result<String, CloudError>;

    /// Describe a service, or `None` if it does not exist
    async fn describe_service(
        &self,
        cluster: &str,
        service: &str,
    ) -> Result<Option<ServiceDescription>, CloudError>;

    /// ARNs of the service's running tasks
    async fn list_running_tasks(&self, cluster: &str, service: &str) -> Result<Vec<String>, CloudError>;

    /// Network interface attached to a task, if one is attached yet
    async fn task_network_interface(
        &self,
        cluster: &str,
        task_arn: &str,
    ) -> Result<Option<String>, CloudError>;

    /// Public IP associated with a network interface, if any
    async fn network_interface_public_ip(&self, eni_id: &str) -> Result<Option<String>, CloudError>;
}
