//! In-memory orchestration service, for dry runs and tests
//!
//! Behaves like a small, deterministic ECS: registrations append revisions per
//! family, service updates start a rollout that converges after a configured
//! number of status polls, and converged services can expose running tasks
//! with public IPs.

use crate::cloud::{
    CloudAdapter, CloudError, Credentials, ImageUri, RegisteredTaskDefinition, ServiceDeployment,
    ServiceDescription,
};
use crate::core::{DeploymentStatus, TaskDefinitionDocument};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

const DEFAULT_ACCOUNT: &str = "123456789012";
const DEFAULT_REGION: &str = "eu-west-1";

/// One call made against the simulated service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudCall {
    pub operation: &'static str,
    pub detail: String,
}

#[derive(Debug)]
struct SimService {
    description: ServiceDescription,
    /// Polls left before the current rollout converges; `None` means never
    polls_left: Option<u32>,
    rolling_out: bool,
}

#[derive(Debug, Clone)]
struct SimTask {
    arn: String,
    eni: Option<String>,
    public_ip: Option<String>,
}

#[derive(Debug)]
struct CloudState {
    account_id: String,
    region: String,
    calls: Vec<CloudCall>,
    revisions: HashMap<String, Vec<TaskDefinitionDocument>>,
    services: HashMap<(String, String), SimService>,
    tasks: HashMap<(String, String), Vec<SimTask>>,
    built: Vec<String>,
    pushed: Vec<String>,
    deployments_started: u32,

    stable_after_polls: Option<u32>,
    fail_rollouts: bool,
    auth_failure: Option<String>,
    push_failure: Option<String>,
    task_listing_failure: Option<String>,
    auto_create_services: bool,
    assign_public_ips: bool,
}

impl Default for CloudState {
    fn default() -> Self {
        Self {
            account_id: DEFAULT_ACCOUNT.to_string(),
            region: DEFAULT_REGION.to_string(),
            calls: Vec::new(),
            revisions: HashMap::new(),
            services: HashMap::new(),
            tasks: HashMap::new(),
            built: Vec::new(),
            pushed: Vec::new(),
            deployments_started: 0,
            stable_after_polls: Some(1),
            fail_rollouts: false,
            auth_failure: None,
            push_failure: None,
            task_listing_failure: None,
            auto_create_services: false,
            assign_public_ips: false,
        }
    }
}

impl CloudState {
    fn record(&mut self, operation: &'static str, detail: impl Into<String>) {
        self.calls.push(CloudCall {
            operation,
            detail: detail.into(),
        });
    }

    fn task_definition_arn(&self, family: &str, revision: u32) -> String {
        format!(
            "arn:aws:ecs:{}:{}:task-definition/{}:{}",
            self.region, self.account_id, family, revision
        )
    }

    fn new_service(&self, cluster: &str, service: &str) -> SimService {
        SimService {
            description: ServiceDescription {
                cluster: cluster.to_string(),
                service: service.to_string(),
                task_definition: self.task_definition_arn(service, 0),
                desired_count: 1,
                running_count: 1,
                deployments: vec![ServiceDeployment {
                    id: "ecs-svc/0".to_string(),
                    status: DeploymentStatus::Primary,
                    task_definition: self.task_definition_arn(service, 0),
                    desired_count: 1,
                    running_count: 1,
                    rollout_state: Some("COMPLETED".to_string()),
                }],
            },
            polls_left: Some(0),
            rolling_out: false,
        }
    }

    fn converge(&mut self, key: &(String, String)) {
        let Some(sim) = self.services.get_mut(key) else {
            return;
        };
        let desc = &mut sim.description;
        desc.deployments.retain(|d| d.status == DeploymentStatus::Primary);
        for deployment in &mut desc.deployments {
            deployment.running_count = deployment.desired_count;
            deployment.rollout_state = Some("COMPLETED".to_string());
        }
        desc.running_count = desc.desired_count;
        sim.rolling_out = false;

        if self.assign_public_ips && !self.tasks.contains_key(key) {
            let n = self.tasks.len() + 10;
            self.tasks.insert(
                key.clone(),
                vec![SimTask {
                    arn: format!("arn:aws:ecs:{}:{}:task/{}/{}", self.region, self.account_id, key.0, n),
                    eni: Some(format!("eni-{:08x}", n)),
                    public_ip: Some(format!("203.0.113.{}", n)),
                }],
            );
        }
    }
}

/// Simulated orchestration service
#[derive(Debug, Default)]
pub struct InMemoryCloud {
    state: Mutex<CloudState>,
}

impl InMemoryCloud {
    pub fn new() -> Self {
        Self::default()
    }

    /// A simulation that accepts any service and converges immediately
    ///
    /// Used by dry runs, where no service has been declared up front.
    pub fn permissive() -> Self {
        let mut cloud = Self::new().stable_after_polls(0);
        let state = cloud.state.get_mut();
        state.auto_create_services = true;
        state.assign_public_ips = true;
        cloud
    }

    /// Declare an existing service with one stable deployment
    pub fn with_service(mut self, cluster: &str, service: &str) -> Self {
        let state = self.state.get_mut();
        let sim = state.new_service(cluster, service);
        state
            .services
            .insert((cluster.to_string(), service.to_string()), sim);
        self
    }

    /// Give a service a running task reachable at `public_ip`
    pub fn with_running_task(mut self, cluster: &str, service: &str, public_ip: &str) -> Self {
        let state = self.state.get_mut();
        let tasks = state
            .tasks
            .entry((cluster.to_string(), service.to_string()))
            .or_default();
        let n = tasks.len();
        tasks.push(SimTask {
            arn: format!("arn:aws:ecs:{}:{}:task/{}/{}", DEFAULT_REGION, DEFAULT_ACCOUNT, cluster, n),
            eni: Some(format!("eni-{}-{}", service, n)),
            public_ip: Some(public_ip.to_string()),
        });
        self
    }

    /// Give a service a running task that has no network interface yet
    pub fn with_pending_task(mut self, cluster: &str, service: &str) -> Self {
        let state = self.state.get_mut();
        let tasks = state
            .tasks
            .entry((cluster.to_string(), service.to_string()))
            .or_default();
        let n = tasks.len();
        tasks.push(SimTask {
            arn: format!("arn:aws:ecs:{}:{}:task/{}/{}", DEFAULT_REGION, DEFAULT_ACCOUNT, cluster, n),
            eni: None,
            public_ip: None,
        });
        self
    }

    /// Rollouts converge on the `n + 1`th status poll after the update
    pub fn stable_after_polls(mut self, polls: u32) -> Self {
        self.state.get_mut().stable_after_polls = Some(polls);
        self
    }

    /// Rollouts never converge
    pub fn never_stable(mut self) -> Self {
        self.state.get_mut().stable_after_polls = None;
        self
    }

    /// Rollouts are reported `FAILED` on the first poll
    pub fn failing_rollouts(mut self) -> Self {
        self.state.get_mut().fail_rollouts = true;
        self
    }

    /// Registry login fails with `message`
    pub fn failing_auth(mut self, message: &str) -> Self {
        self.state.get_mut().auth_failure = Some(message.to_string());
        self
    }

    /// Image pushes fail with `message`
    pub fn failing_push(mut self, message: &str) -> Self {
        self.state.get_mut().push_failure = Some(message.to_string());
        self
    }

    /// Task listings fail with `message`
    pub fn failing_task_listing(mut self, message: &str) -> Self {
        self.state.get_mut().task_listing_failure = Some(message.to_string());
        self
    }

    /// Every call made so far, in order
    pub async fn calls(&self) -> Vec<CloudCall> {
        self.state.lock().await.calls.clone()
    }

    /// Number of calls made to `operation`
    pub async fn call_count(&self, operation: &str) -> usize {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter(|c| c.operation == operation)
            .count()
    }

    /// Every registered revision of `family`, oldest first
    pub async fn revisions(&self, family: &str) -> Vec<TaskDefinitionDocument> {
        self.state
            .lock()
            .await
            .revisions
            .get(family)
            .cloned()
            .unwrap_or_default()
    }

    /// Images pushed so far
    pub async fn pushed_images(&self) -> Vec<String> {
        self.state.lock().await.pushed.clone()
    }

    /// Images built so far
    pub async fn built_images(&self) -> Vec<String> {
        self.state.lock().await.built.clone()
    }
}

#[async_trait]
impl CloudAdapter for InMemoryCloud {
    async fn registry_login(&self, region: &str) -> Result<Credentials, CloudError> {
        let mut state = self.state.lock().await;
        state.record("registry_login", region);

        if let Some(message) = &state.auth_failure {
            return Err(CloudError::CommandFailed {
                program: "aws".to_string(),
                code: 255,
                stderr: message.clone(),
            });
        }

        state.region = region.to_string();
        Ok(Credentials {
            region: region.to_string(),
            account_id: state.account_id.clone(),
            registry: format!("{}.dkr.ecr.{}.amazonaws.com", state.account_id, region),
            username: "AWS".to_string(),
        })
    }

    async fn build_image(&self, context: &str, dockerfile: &str, local_image: &str) -> Result<(), CloudError> {
        let mut state = self.state.lock().await;
        state.record("build_image", format!("{} -f {} -t {}", context, dockerfile, local_image));
        state.built.push(local_image.to_string());
        Ok(())
    }

    async fn push_image(&self, local_image: &str, image: &ImageUri) -> Result<(), CloudError> {
        let mut state = self.state.lock().await;
        state.record("push_image", format!("{} -> {}", local_image, image));

        if let Some(message) = &state.push_failure {
            return Err(CloudError::CommandFailed {
                program: "docker".to_string(),
                code: 1,
                stderr: message.clone(),
            });
        }

        state.pushed.push(image.to_string());
        Ok(())
    }

    async fn register_task_definition(
        &self,
        document: &TaskDefinitionDocument,
    ) -> Result<RegisteredTaskDefinition, CloudError> {
        let mut state = self.state.lock().await;
        state.record("register_task_definition", document.family.clone());

        let revisions = state.revisions.entry(document.family.clone()).or_default();
        revisions.push(document.clone());
        let revision = revisions.len() as u32;

        Ok(RegisteredTaskDefinition {
            arn: state.task_definition_arn(&document.family, revision),
            family: document.family.clone(),
            revision,
        })
    }

    async fn update_service(
        &self,
        cluster: &str,
        service: &str,
        task_definition_arn: &str,
    ) -> Result<String, CloudError> {
        let mut state = self.state.lock().await;
        state.record("update_service", format!("{}/{} -> {}", cluster, service, task_definition_arn));

        let key = (cluster.to_string(), service.to_string());
        if !state.services.contains_key(&key) {
            if !state.auto_create_services {
                return Err(CloudError::NotFound(format!("service {}/{}", cluster, service)));
            }
            let sim = state.new_service(cluster, service);
            state.services.insert(key.clone(), sim);
        }

        state.deployments_started += 1;
        let deployment_id = format!("ecs-svc/{}", state.deployments_started);
        let polls = state.stable_after_polls;

        if let Some(sim) = state.services.get_mut(&key) {
            let desc = &mut sim.description;
            for deployment in &mut desc.deployments {
                if deployment.status == DeploymentStatus::Primary {
                    deployment.status = DeploymentStatus::Active;
                }
            }
            desc.deployments.insert(
                0,
                ServiceDeployment {
                    id: deployment_id.clone(),
                    status: DeploymentStatus::Primary,
                    task_definition: task_definition_arn.to_string(),
                    desired_count: desc.desired_count,
                    running_count: 0,
                    rollout_state: Some("IN_PROGRESS".to_string()),
                },
            );
            desc.task_definition = task_definition_arn.to_string();
            sim.polls_left = polls;
            sim.rolling_out = true;
        }

        if polls == Some(0) {
            state.converge(&key);
        }

        Ok(deployment_id)
    }

    async fn describe_service(&self, cluster: &str, service: &str) -> Result<Option<ServiceDescription>, CloudError> {
        let mut state = self.state.lock().await;
        state.record("describe_service", format!("{}/{}", cluster, service));

        let key = (cluster.to_string(), service.to_string());
        let fail_rollouts = state.fail_rollouts;
        let mut converge = false;

        let Some(sim) = state.services.get_mut(&key) else {
            return Ok(None);
        };

        if sim.rolling_out {
            if fail_rollouts {
                if let Some(primary) = sim
                    .description
                    .deployments
                    .iter_mut()
                    .find(|d| d.status == DeploymentStatus::Primary)
                {
                    primary.rollout_state = Some("FAILED".to_string());
                }
            } else if let Some(left) = sim.polls_left.as_mut() {
                if *left == 0 {
                    converge = true;
                } else {
                    *left -= 1;
                }
            }
        }

        let snapshot = sim.description.clone();
        if converge {
            state.converge(&key);
            return Ok(state.services.get(&key).map(|s| s.description.clone()));
        }
        Ok(Some(snapshot))
    }

    async fn list_running_tasks(&self, cluster: &str, service: &str) -> Result<Vec<String>, CloudError> {
        let mut state = self.state.lock().await;
        state.record("list_running_tasks", format!("{}/{}", cluster, service));
        if let Some(message) = &state.task_listing_failure {
            return Err(CloudError::CommandFailed {
                program: "aws".to_string(),
                code: 254,
                stderr: message.clone(),
            });
        }
        Ok(state
            .tasks
            .get(&(cluster.to_string(), service.to_string()))
            .map(|tasks| tasks.iter().map(|t| t.arn.clone()).collect())
            .unwrap_or_default())
    }

    async fn task_network_interface(&self, cluster: &str, task_arn: &str) -> Result<Option<String>, CloudError> {
        let mut state = self.state.lock().await;
        state.record("task_network_interface", task_arn);
        Ok(state
            .tasks
            .iter()
            .filter(|((c, _), _)| c == cluster)
            .flat_map(|(_, tasks)| tasks.iter())
            .find(|t| t.arn == task_arn)
            .and_then(|t| t.eni.clone()))
    }

    async fn network_interface_public_ip(&self, eni_id: &str) -> Result<Option<String>, CloudError> {
        let mut state = self.state.lock().await;
        state.record("network_interface_public_ip", eni_id);
        Ok(state
            .tasks
            .values()
            .flat_map(|tasks| tasks.iter())
            .find(|t| t.eni.as_deref() == Some(eni_id))
            .and_then(|t| t.public_ip.clone()))
    }
}
