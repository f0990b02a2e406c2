//! AWS CLI subprocess client - drives ECR/ECS/EC2 through `aws` and `docker`

use crate::cloud::{
    CloudAdapter, CloudError, Credentials, ImageUri, RegisteredTaskDefinition, ServiceDeployment,
    ServiceDescription,
};
use crate::core::{DeploymentStatus, TaskDefinitionDocument};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::process::Stdio;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Configuration for the CLI client
#[derive(Debug, Clone)]
pub struct CloudClientConfig {
    /// Path to the `aws` executable
    pub aws_path: String,

    /// Path to the `docker` executable
    pub docker_path: String,

    /// Region for service calls; `None` defers to the CLI's own configuration
    pub region: Option<String>,

    /// Named CLI profile
    pub profile: Option<String>,

    /// Timeout for each command in seconds
    pub timeout_secs: u64,
}

impl Default for CloudClientConfig {
    fn default() -> Self {
        Self {
            aws_path: "aws".to_string(),
            docker_path: "docker".to_string(),
            region: None,
            profile: None,
            timeout_secs: 600,
        }
    }
}

impl CloudClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_aws_path(mut self, path: impl Into<String>) -> Self {
        self.aws_path = path.into();
        self
    }

    pub fn with_docker_path(mut self, path: impl Into<String>) -> Self {
        self.docker_path = path.into();
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }
}

/// Client that shells out to the `aws` and `docker` CLIs
///
/// ECS and EC2 calls go to the region of the last successful registry login,
/// so a pipeline deploys where it pushed. Before any login they use the
/// configured region.
#[derive(Debug, Clone)]
pub struct AwsCliClient {
    config: CloudClientConfig,
    login_region: Arc<RwLock<Option<String>>>,
}

impl AwsCliClient {
    pub fn new(config: CloudClientConfig) -> Self {
        Self {
            config,
            login_region: Arc::new(RwLock::new(None)),
        }
    }

    fn remember_login_region(&self, region: &str) {
        let mut login_region = self
            .login_region
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *login_region = Some(region.to_string());
    }

    /// Region for ECS and EC2 calls; `None` defers to the configured one
    fn service_region(&self) -> Option<String> {
        self.login_region
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Run a program to completion and return its stdout
    ///
    /// # Errors
    /// Returns `CloudError` if the program cannot be spawned, exits with a
    /// non-zero status, writes non-UTF-8 output, or exceeds the timeout.
    async fn run(&self, program: &str, args: &[String], stdin: Option<&str>) -> Result<String, CloudError> {
        debug!("Running {} {}", program, args.join(" "));

        let mut command = Command::new(program);
        command
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .kill_on_drop(true);

        let spawn_error = |source| CloudError::Spawn {
            program: program.to_string(),
            source,
        };

        let execution = async {
            let mut child = command.spawn().map_err(spawn_error)?;
            if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
                pipe.write_all(input.as_bytes()).await.map_err(spawn_error)?;
                // Closing stdin lets --password-stdin readers finish
                drop(pipe);
            }
            child.wait_with_output().await.map_err(spawn_error)
        };

        let output = timeout(Duration::from_secs(self.config.timeout_secs), execution)
            .await
            .map_err(|_| CloudError::Timeout {
                program: program.to_string(),
                secs: self.config.timeout_secs,
            })??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let code = output.status.code().unwrap_or(-1);
            warn!("{} exited with code {}: {}", program, code, stderr);
            return Err(CloudError::CommandFailed {
                program: program.to_string(),
                code,
                stderr,
            });
        }

        String::from_utf8(output.stdout)
            .map_err(|e| CloudError::parse(program, format!("output is not UTF-8: {}", e)))
    }

    fn aws_args(&self, region: Option<&str>, args: &[&str]) -> Vec<String> {
        let mut full: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        if let Some(region) = region.or(self.config.region.as_deref()) {
            full.push("--region".to_string());
            full.push(region.to_string());
        }
        if let Some(profile) = &self.config.profile {
            full.push("--profile".to_string());
            full.push(profile.clone());
        }
        full
    }

    async fn aws_text(&self, region: Option<&str>, args: &[&str]) -> Result<String, CloudError> {
        let args = self.aws_args(region, args);
        self.run(&self.config.aws_path, &args, None).await
    }

    async fn aws_json<T: DeserializeOwned>(
        &self,
        operation: &str,
        region: Option<&str>,
        args: &[&str],
    ) -> Result<T, CloudError> {
        let mut args = self.aws_args(region, args);
        args.push("--output".to_string());
        args.push("json".to_string());
        let stdout = self.run(&self.config.aws_path, &args, None).await?;
        serde_json::from_str(&stdout).map_err(|e| CloudError::parse(operation, e))
    }

    async fn docker(&self, args: &[&str], stdin: Option<&str>) -> Result<String, CloudError> {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        self.run(&self.config.docker_path, &args, stdin).await
    }
}

// Response shapes. ECS answers in camelCase, STS and EC2 in PascalCase.

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CallerIdentity {
    account: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterResponse {
    task_definition: RegisteredShape,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisteredShape {
    task_definition_arn: String,
    family: String,
    revision: u32,
}

#[derive(Debug, Deserialize)]
struct UpdateServiceResponse {
    service: ServiceShape,
}

#[derive(Debug, Deserialize)]
struct DescribeServicesResponse {
    #[serde(default)]
    services: Vec<ServiceShape>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServiceShape {
    service_name: String,
    #[serde(default)]
    cluster_arn: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    task_definition: String,
    #[serde(default)]
    desired_count: u32,
    #[serde(default)]
    running_count: u32,
    #[serde(default)]
    deployments: Vec<DeploymentShape>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeploymentShape {
    id: String,
    status: String,
    task_definition: String,
    #[serde(default)]
    desired_count: u32,
    #[serde(default)]
    running_count: u32,
    #[serde(default)]
    rollout_state: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListTasksResponse {
    #[serde(default)]
    task_arns: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct DescribeTasksResponse {
    #[serde(default)]
    tasks: Vec<TaskShape>,
}

#[derive(Debug, Deserialize)]
struct TaskShape {
    #[serde(default)]
    attachments: Vec<AttachmentShape>,
}

#[derive(Debug, Deserialize)]
struct AttachmentShape {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    details: Vec<NameValue>,
}

#[derive(Debug, Deserialize)]
struct NameValue {
    name: String,
    #[serde(default)]
    value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeNetworkInterfacesResponse {
    #[serde(default)]
    network_interfaces: Vec<NetworkInterfaceShape>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct NetworkInterfaceShape {
    #[serde(default)]
    association: Option<AssociationShape>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AssociationShape {
    #[serde(default)]
    public_ip: Option<String>,
}

impl ServiceShape {
    fn into_description(self, cluster: &str) -> ServiceDescription {
        ServiceDescription {
            cluster: if self.cluster_arn.is_empty() {
                cluster.to_string()
            } else {
                self.cluster_arn
            },
            service: self.service_name,
            task_definition: self.task_definition,
            desired_count: self.desired_count,
            running_count: self.running_count,
            deployments: self
                .deployments
                .into_iter()
                .map(|d| ServiceDeployment {
                    id: d.id,
                    status: DeploymentStatus::parse(&d.status),
                    task_definition: d.task_definition,
                    desired_count: d.desired_count,
                    running_count: d.running_count,
                    rollout_state: d.rollout_state,
                })
                .collect(),
        }
    }
}

fn eni_from_task(task: &TaskShape) -> Option<String> {
    task.attachments
        .iter()
        .filter(|a| a.kind == "ElasticNetworkInterface")
        .flat_map(|a| a.details.iter())
        .find(|d| d.name == "networkInterfaceId" && !d.value.is_empty())
        .map(|d| d.value.clone())
}

#[async_trait]
impl CloudAdapter for AwsCliClient {
    async fn registry_login(&self, region: &str) -> Result<Credentials, CloudError> {
        let identity: CallerIdentity = self
            .aws_json("sts get-caller-identity", Some(region), &["sts", "get-caller-identity"])
            .await?;

        let registry = format!("{}.dkr.ecr.{}.amazonaws.com", identity.account, region);
        let password = self
            .aws_text(Some(region), &["ecr", "get-login-password"])
            .await?;

        self.docker(
            &["login", "--username", "AWS", "--password-stdin", &registry],
            Some(password.trim()),
        )
        .await?;
        self.remember_login_region(region);

        Ok(Credentials {
            region: region.to_string(),
            account_id: identity.account,
            registry,
            username: "AWS".to_string(),
        })
    }

    async fn build_image(&self, context: &str, dockerfile: &str, local_image: &str) -> Result<(), CloudError> {
        self.docker(&["build", "-f", dockerfile, "-t", local_image, context], None)
            .await?;
        Ok(())
    }

    async fn push_image(&self, local_image: &str, image: &ImageUri) -> Result<(), CloudError> {
        let uri = image.to_string();
        self.docker(&["tag", local_image, &uri], None).await?;
        self.docker(&["push", &uri], None).await?;
        Ok(())
    }

    async fn register_task_definition(
        &self,
        document: &TaskDefinitionDocument,
    ) -> Result<RegisteredTaskDefinition, CloudError> {
        let json = document
            .to_json()
            .map_err(|e| CloudError::Rejected(e.to_string()))?;
        let response: RegisterResponse = self
            .aws_json(
                "ecs register-task-definition",
                self.service_region().as_deref(),
                &["ecs", "register-task-definition", "--cli-input-json", &json],
            )
            .await?;

        Ok(RegisteredTaskDefinition {
            arn: response.task_definition.task_definition_arn,
            family: response.task_definition.family,
            revision: response.task_definition.revision,
        })
    }

    async fn update_service(
        &self,
        cluster: &str,
        service: &str,
        task_definition_arn: &str,
    ) -> Result<String, CloudError> {
        let response: UpdateServiceResponse = self
            .aws_json(
                "ecs update-service",
                self.service_region().as_deref(),
                &[
                    "ecs",
                    "update-service",
                    "--cluster",
                    cluster,
                    "--service",
                    service,
                    "--task-definition",
                    task_definition_arn,
                ],
            )
            .await?;

        response
            .service
            .deployments
            .into_iter()
            .find(|d| DeploymentStatus::parse(&d.status) == DeploymentStatus::Primary)
            .map(|d| d.id)
            .ok_or_else(|| CloudError::parse("ecs update-service", "no PRIMARY deployment in response"))
    }

    async fn describe_service(&self, cluster: &str, service: &str) -> Result<Option<ServiceDescription>, CloudError> {
        let response: DescribeServicesResponse = self
            .aws_json(
                "ecs describe-services",
                self.service_region().as_deref(),
                &["ecs", "describe-services", "--cluster", cluster, "--services", service],
            )
            .await?;

        Ok(response
            .services
            .into_iter()
            .find(|s| s.status != "INACTIVE")
            .map(|s| s.into_description(cluster)))
    }

    async fn list_running_tasks(&self, cluster: &str, service: &str) -> Result<Vec<String>, CloudError> {
        let response: ListTasksResponse = self
            .aws_json(
                "ecs list-tasks",
                self.service_region().as_deref(),
                &[
                    "ecs",
                    "list-tasks",
                    "--cluster",
                    cluster,
                    "--service-name",
                    service,
                    "--desired-status",
                    "RUNNING",
                ],
            )
            .await?;
        Ok(response.task_arns)
    }

    async fn task_network_interface(&self, cluster: &str, task_arn: &str) -> Result<Option<String>, CloudError> {
        let response: DescribeTasksResponse = self
            .aws_json(
                "ecs describe-tasks",
                self.service_region().as_deref(),
                &["ecs", "describe-tasks", "--cluster", cluster, "--tasks", task_arn],
            )
            .await?;
        Ok(response.tasks.first().and_then(eni_from_task))
    }

    async fn network_interface_public_ip(&self, eni_id: &str) -> Result<Option<String>, CloudError> {
        let response: DescribeNetworkInterfacesResponse = self
            .aws_json(
                "ec2 describe-network-interfaces",
                self.service_region().as_deref(),
                &["ec2", "describe-network-interfaces", "--network-interface-ids", eni_id],
            )
            .await?;
        Ok(response
            .network_interfaces
            .into_iter()
            .next()
            .and_then(|ni| ni.association)
            .and_then(|a| a.public_ip))
    }
}
