//! Step executor - runs individual steps against the cloud adapter

use crate::{
    cloud::{CloudAdapter, Deployer, PollPolicy},
    core::{
        task_definition::{parse_environment, TaskDefinitionDocument},
        DeploymentTracker, RunContext, Step, StepAction,
    },
    error::DeployError,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::{timeout, Duration};
use tracing::{debug, error, info};

/// What a successful step produced
#[derive(Debug, Clone, Default)]
pub struct StepOutcome {
    /// Built-in outputs plus evaluated `outputs` templates
    pub outputs: HashMap<String, String>,
}

/// Executes a single step
pub struct StepExecutor<C: CloudAdapter> {
    deployer: Deployer<C>,
    endpoint_policy: PollPolicy,
}

impl<C: CloudAdapter> StepExecutor<C> {
    pub fn new(cloud: Arc<C>, stability_policy: PollPolicy, endpoint_policy: PollPolicy) -> Self {
        Self {
            deployer: Deployer::new(cloud, stability_policy),
            endpoint_policy,
        }
    }

    /// Execute a step and return its outputs
    ///
    /// Parameters are resolved against `context` first; the action then runs
    /// under the step's timeout. A deploy step records its progress on
    /// `deployment`, which outlives the step even when it times out.
    pub async fn execute(
        &self,
        step: &Step,
        context: &RunContext,
        deployment: &DeploymentTracker,
    ) -> Result<StepOutcome, DeployError> {
        info!("Executing step: {} ({})", step.id, step.action);

        let params = resolve_parameters(step, context)?;
        debug!("Resolved parameters for step {}: {:?}", step.id, params.keys().collect::<Vec<_>>());

        let timeout_duration = Duration::from_secs(step.timeout_secs);
        let mut outcome = match timeout(timeout_duration, self.run_action(step, &params, deployment)).await {
            Ok(result) => result?,
            Err(_) => {
                error!("Timeout for step {} after {}s", step.id, step.timeout_secs);
                return Err(DeployError::StepTimeout {
                    step: step.id.clone(),
                    secs: step.timeout_secs,
                });
            }
        };

        let builtins = outcome.outputs.clone();
        for (key, template) in &step.outputs {
            let value = context
                .resolve_with_own(template, &step.id, &builtins)
                .map_err(DeployError::UnresolvedReference)?;
            outcome.outputs.insert(key.clone(), value);
        }

        Ok(outcome)
    }

    async fn run_action(
        &self,
        step: &Step,
        params: &Params<'_>,
        deployment: &DeploymentTracker,
    ) -> Result<StepOutcome, DeployError> {
        let outputs = match step.action {
            StepAction::Authenticate => {
                let credentials = self.deployer.authenticate(params.get("region")?).await?;
                outputs([
                    ("registry", credentials.registry),
                    ("account_id", credentials.account_id),
                    ("region", credentials.region),
                ])
            }
            StepAction::BuildImage => {
                let local_image = params.get("local_image")?;
                self.deployer
                    .build_image(params.get("context")?, params.get("dockerfile")?, local_image)
                    .await?;
                outputs([("local_image", local_image.to_string())])
            }
            StepAction::PushImage => {
                let image = self
                    .deployer
                    .push_image(
                        params.get("registry")?,
                        params.get("repository")?,
                        params.get("tag")?,
                        params.get("local_image")?,
                    )
                    .await?;
                outputs([("tag", image.tag.clone()), ("image", image.to_string())])
            }
            StepAction::RenderTaskDefinition => {
                let template = TaskDefinitionDocument::load(params.get("template")?)?;
                let environment = parse_environment(params.get_or("environment", ""))?;
                let rendered = self.deployer.render_task_definition(
                    &template,
                    params.get("container_name")?,
                    params.get("image")?,
                    &environment,
                )?;
                outputs([("task_definition", rendered.to_json()?)])
            }
            StepAction::Deploy => {
                let document = TaskDefinitionDocument::load(params.get("task_definition")?)?;
                let wait = params.get_bool("wait_for_stable")?;
                let result = self
                    .deployer
                    .deploy(
                        &document,
                        params.get("service")?,
                        params.get("cluster")?,
                        wait,
                        deployment,
                    )
                    .await?;
                outputs([
                    ("task_definition_arn", result.task_definition.arn),
                    ("revision", result.task_definition.revision.to_string()),
                    ("deployment_id", result.deployment_id),
                    ("status", result.state.to_string()),
                ])
            }
            StepAction::ServiceStatus => {
                let status = self
                    .deployer
                    .reporter()
                    .service_status(params.get("cluster")?, params.get("service")?)
                    .await?;
                outputs([
                    ("status", status.status.to_string()),
                    ("running_count", status.running_count.to_string()),
                    ("desired_count", status.desired_count.to_string()),
                ])
            }
            StepAction::ResolveEndpoint => {
                let endpoint = self
                    .deployer
                    .reporter()
                    .resolve_public_endpoint(
                        params.get("cluster")?,
                        params.get("service")?,
                        params.get_port("port")?,
                        params.get_or("scheme", "http"),
                        &self.endpoint_policy,
                    )
                    .await?;
                outputs([("url", endpoint.url()), ("public_ip", endpoint.public_ip)])
            }
        };

        Ok(StepOutcome { outputs })
    }
}

fn outputs<const N: usize>(pairs: [(&str, String); N]) -> HashMap<String, String> {
    pairs
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

/// Resolved parameters of one step
struct Params<'a> {
    step_id: &'a str,
    values: HashMap<String, String>,
}

impl Params<'_> {
    fn get(&self, name: &str) -> Result<&str, DeployError> {
        self.values
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| self.invalid(name, "missing"))
    }

    fn get_or<'s>(&'s self, name: &str, default: &'s str) -> &'s str {
        self.values.get(name).map(String::as_str).unwrap_or(default)
    }

    fn get_bool(&self, name: &str) -> Result<bool, DeployError> {
        match self.get_or(name, "false").trim() {
            "true" => Ok(true),
            "false" => Ok(false),
            other => Err(self.invalid(name, &format!("expected true or false, got '{}'", other))),
        }
    }

    fn get_port(&self, name: &str) -> Result<u16, DeployError> {
        let raw = self.get(name)?;
        raw.trim()
            .parse()
            .map_err(|_| self.invalid(name, &format!("expected a port number, got '{}'", raw)))
    }

    fn invalid(&self, name: &str, message: &str) -> DeployError {
        DeployError::InvalidParameter {
            step: self.step_id.to_string(),
            parameter: name.to_string(),
            message: message.to_string(),
        }
    }

    fn keys(&self) -> impl Iterator<Item = &String> {
        self.values.keys()
    }
}

fn resolve_parameters<'a>(step: &'a Step, context: &RunContext) -> Result<Params<'a>, DeployError> {
    let values = step
        .parameters
        .iter()
        .map(|(name, template)| {
            context
                .resolve(template)
                .map(|value| (name.clone(), value))
                .map_err(DeployError::UnresolvedReference)
        })
        .collect::<Result<HashMap<_, _>, _>>()?;

    Ok(Params {
        step_id: &step.id,
        values,
    })
}
