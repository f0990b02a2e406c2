//! Pipeline-level cloud operations built on [`CloudAdapter`]

use crate::cloud::{
    CloudAdapter, Credentials, ImageUri, PollPolicy, RegisteredTaskDefinition, StatusReporter,
};
use crate::core::task_definition::EnvironmentVariable;
use crate::core::{DeploymentState, DeploymentTracker, TaskDefinitionDocument};
use crate::error::DeployError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// What a deploy produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentResult {
    pub task_definition: RegisteredTaskDefinition,
    pub deployment_id: String,
    /// `Running` when the deploy did not wait, `Stable` when it waited and converged
    pub state: DeploymentState,
}

/// Registry and service operations a pipeline step performs
pub struct Deployer<C: CloudAdapter> {
    cloud: Arc<C>,
    reporter: StatusReporter<C>,
    stability_policy: PollPolicy,
}

impl<C: CloudAdapter> Deployer<C> {
    pub fn new(cloud: Arc<C>, stability_policy: PollPolicy) -> Self {
        Self {
            reporter: StatusReporter::new(Arc::clone(&cloud)),
            cloud,
            stability_policy,
        }
    }

    pub fn reporter(&self) -> &StatusReporter<C> {
        &self.reporter
    }

    /// Log in to the image registry of `region`
    pub async fn authenticate(&self, region: &str) -> Result<Credentials, DeployError> {
        let credentials = self
            .cloud
            .registry_login(region)
            .await
            .map_err(|e| DeployError::Authentication {
                region: region.to_string(),
                message: e.to_string(),
            })?;
        info!("Logged in to {}", credentials.registry);
        Ok(credentials)
    }

    /// Build a local image with the container engine
    pub async fn build_image(&self, context: &str, dockerfile: &str, local_image: &str) -> Result<(), DeployError> {
        self.cloud
            .build_image(context, dockerfile, local_image)
            .await
            .map_err(|e| DeployError::Build {
                image: local_image.to_string(),
                message: e.to_string(),
            })?;
        info!("Built {}", local_image);
        Ok(())
    }

    /// Tag `local_image` as `<registry>/<repository>:<tag>` and push it
    pub async fn push_image(
        &self,
        registry: &str,
        repository: &str,
        tag: &str,
        local_image: &str,
    ) -> Result<ImageUri, DeployError> {
        let image = ImageUri::new(registry, repository, tag);
        self.cloud
            .push_image(local_image, &image)
            .await
            .map_err(|e| DeployError::Push {
                image: image.to_string(),
                message: e.to_string(),
            })?;
        info!("Pushed {}", image);
        Ok(image)
    }

    /// Substitute `image` into `container_name` of a template
    ///
    /// The template is left untouched; the result is a new, validated document.
    pub fn render_task_definition(
        &self,
        template: &TaskDefinitionDocument,
        container_name: &str,
        image: &str,
        environment: &[EnvironmentVariable],
    ) -> Result<TaskDefinitionDocument, DeployError> {
        let rendered = template.with_container_image(container_name, image, environment)?;
        rendered.validate()?;
        Ok(rendered)
    }

    /// Register a new revision and roll the service onto it
    ///
    /// With `wait_for_stable`, returns only once the service is stable on the
    /// new revision; otherwise returns as soon as the update is accepted.
    /// `tracker` moves to `Running` once the update is accepted and to a
    /// terminal state when the deploy ends.
    pub async fn deploy(
        &self,
        task_definition: &TaskDefinitionDocument,
        service: &str,
        cluster: &str,
        wait_for_stable: bool,
        tracker: &DeploymentTracker,
    ) -> Result<DeploymentResult, DeployError> {
        let started = async {
            let registered = self.cloud.register_task_definition(task_definition).await?;
            info!(
                "Registered {} revision {}",
                registered.family, registered.revision
            );
            let deployment_id = self
                .cloud
                .update_service(cluster, service, &registered.arn)
                .await?;
            Ok::<_, DeployError>((registered, deployment_id))
        };
        let (registered, deployment_id) = match started.await {
            Ok(started) => started,
            Err(e) => {
                tracker.advance(DeploymentState::Failed);
                return Err(e);
            }
        };
        info!("Service {}/{} updating ({})", cluster, service, deployment_id);
        tracker.advance(DeploymentState::Running);

        if wait_for_stable {
            match self
                .reporter
                .wait_for_stable(cluster, service, &registered.arn, &self.stability_policy)
                .await
            {
                Ok(_) => {
                    tracker.advance(DeploymentState::Stable);
                }
                Err(e) => {
                    warn!("Deployment {} did not stabilise: {}", deployment_id, e);
                    tracker.advance(if matches!(e, DeployError::DeploymentTimeout { .. }) {
                        DeploymentState::TimedOut
                    } else {
                        DeploymentState::Failed
                    });
                    return Err(e);
                }
            }
        }

        Ok(DeploymentResult {
            task_definition: registered,
            deployment_id,
            state: tracker.current(),
        })
    }
}
