//! Status reporting - deployment status, stability waits and endpoint discovery

use crate::cloud::{CloudAdapter, CloudError, Endpoint, ServiceDescription};
use crate::core::DeploymentStatus;
use crate::error::DeployError;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

/// Bounds for a polling loop
///
/// A loop stops once `max_attempts` checks have been made or `timeout` has
/// elapsed, whichever comes first. A policy with neither bound allows a
/// single check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Sleep between checks
    pub interval: Duration,

    /// Wall-clock bound across all checks
    pub timeout: Option<Duration>,

    /// Maximum number of checks
    pub max_attempts: Option<u32>,
}

impl PollPolicy {
    pub fn until_timeout(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            timeout: Some(timeout),
            max_attempts: None,
        }
    }

    pub fn attempts(max_attempts: u32, interval: Duration) -> Self {
        Self {
            interval,
            timeout: None,
            max_attempts: Some(max_attempts),
        }
    }

    fn exhausted(&self, attempts: u32, started: Instant) -> bool {
        match (self.max_attempts, self.timeout) {
            (None, None) => true,
            (max, timeout) => {
                max.is_some_and(|m| attempts >= m)
                    || timeout.is_some_and(|t| started.elapsed() >= t)
            }
        }
    }

    /// Time to sleep before the next check, never past the timeout
    fn next_sleep(&self, started: Instant) -> Duration {
        match self.timeout {
            Some(t) => self.interval.min(t.saturating_sub(started.elapsed())),
            None => self.interval,
        }
    }
}

/// Summary of a service for status reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceStatus {
    pub status: DeploymentStatus,
    pub running_count: u32,
    pub desired_count: u32,
}

/// Read-only view of services and their deployments
pub struct StatusReporter<C: CloudAdapter> {
    cloud: Arc<C>,
}

impl<C: CloudAdapter> Clone for StatusReporter<C> {
    fn clone(&self) -> Self {
        Self {
            cloud: Arc::clone(&self.cloud),
        }
    }
}

impl<C: CloudAdapter> StatusReporter<C> {
    pub fn new(cloud: Arc<C>) -> Self {
        Self { cloud }
    }

    /// Describe a service, or `None` if it does not exist
    pub async fn describe(&self, cluster: &str, service: &str) -> Result<Option<ServiceDescription>, DeployError> {
        Ok(self.cloud.describe_service(cluster, service).await?)
    }

    /// Status of the service's primary deployment
    ///
    /// `UNKNOWN` when the service or its primary deployment is missing, or the
    /// orchestrator reports a status this tool does not recognise.
    pub async fn poll_deployment_status(&self, cluster: &str, service: &str) -> Result<DeploymentStatus, DeployError> {
        Ok(self.service_status(cluster, service).await?.status)
    }

    /// Primary deployment status together with task counts
    ///
    /// Counts are zero for a missing service.
    pub async fn service_status(&self, cluster: &str, service: &str) -> Result<ServiceStatus, DeployError> {
        let summary = match self.describe(cluster, service).await? {
            Some(svc) => ServiceStatus {
                status: svc
                    .primary()
                    .map(|d| d.status)
                    .unwrap_or(DeploymentStatus::Unknown),
                running_count: svc.running_count,
                desired_count: svc.desired_count,
            },
            None => ServiceStatus {
                status: DeploymentStatus::Unknown,
                running_count: 0,
                desired_count: 0,
            },
        };
        debug!(
            "Deployment status of {}/{}: {} ({}/{} running)",
            cluster, service, summary.status, summary.running_count, summary.desired_count
        );
        Ok(summary)
    }

    /// Status of one particular deployment; `UNKNOWN` once it has gone
    pub async fn deployment_status(
        &self,
        cluster: &str,
        service: &str,
        deployment_id: &str,
    ) -> Result<DeploymentStatus, DeployError> {
        Ok(self
            .describe(cluster, service)
            .await?
            .and_then(|svc| {
                svc.deployments
                    .iter()
                    .find(|d| d.id == deployment_id)
                    .map(|d| d.status)
            })
            .unwrap_or(DeploymentStatus::Unknown))
    }

    /// Block until the service runs `task_definition_arn` at full count
    ///
    /// # Errors
    /// `DeploymentFailed` if the rollout is reported failed, `DeploymentTimeout`
    /// once the policy's bounds are exhausted.
    pub async fn wait_for_stable(
        &self,
        cluster: &str,
        service: &str,
        task_definition_arn: &str,
        policy: &PollPolicy,
    ) -> Result<ServiceDescription, DeployError> {
        let started = Instant::now();
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let description = self
                .describe(cluster, service)
                .await?
                .ok_or_else(|| CloudError::NotFound(format!("service {}/{}", cluster, service)))?;

            if let Some(failed) = description.failed_rollout(task_definition_arn) {
                return Err(DeployError::DeploymentFailed {
                    cluster: cluster.to_string(),
                    service: service.to_string(),
                    deployment_id: failed.id.clone(),
                    reason: "rollout reported FAILED".to_string(),
                });
            }

            if description.is_stable_on(task_definition_arn) {
                info!(
                    "Service {}/{} stable on {} after {} checks",
                    cluster, service, task_definition_arn, attempts
                );
                return Ok(description);
            }

            debug!(
                "Service {}/{} not stable yet (running {}/{}, {} deployments)",
                cluster,
                service,
                description.running_count,
                description.desired_count,
                description.deployments.len()
            );

            if policy.exhausted(attempts, started) {
                return Err(DeployError::DeploymentTimeout {
                    cluster: cluster.to_string(),
                    service: service.to_string(),
                    timeout_secs: policy.timeout.unwrap_or_default().as_secs(),
                });
            }
            sleep(policy.next_sleep(started)).await;
        }
    }

    /// Find a public address for one of the service's running tasks
    ///
    /// Lookup errors count as a miss for that attempt.
    ///
    /// # Errors
    /// `EndpointNotFound` once the policy's bounds are exhausted.
    pub async fn resolve_public_endpoint(
        &self,
        cluster: &str,
        service: &str,
        port: u16,
        scheme: &str,
        policy: &PollPolicy,
    ) -> Result<Endpoint, DeployError> {
        let started = Instant::now();
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            match self.find_public_ip(cluster, service).await {
                Ok(Some(public_ip)) => {
                    let endpoint = Endpoint {
                        scheme: scheme.to_string(),
                        public_ip,
                        port,
                    };
                    info!("Service {}/{} reachable at {}", cluster, service, endpoint);
                    return Ok(endpoint);
                }
                Ok(None) => {}
                Err(e) => warn!(
                    "Endpoint lookup for {}/{} failed (attempt {}): {}",
                    cluster, service, attempts, e
                ),
            }

            if policy.exhausted(attempts, started) {
                return Err(DeployError::EndpointNotFound {
                    cluster: cluster.to_string(),
                    service: service.to_string(),
                    attempts,
                });
            }
            debug!(
                "No public IP for {}/{} yet (attempt {}), retrying in {:?}",
                cluster, service, attempts, policy.interval
            );
            sleep(policy.next_sleep(started)).await;
        }
    }

    async fn find_public_ip(&self, cluster: &str, service: &str) -> Result<Option<String>, CloudError> {
        for task in self.cloud.list_running_tasks(cluster, service).await? {
            let Some(eni) = self.cloud.task_network_interface(cluster, &task).await? else {
                continue;
            };
            if let Some(ip) = self.cloud.network_interface_public_ip(&eni).await? {
                return Ok(Some(ip));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::InMemoryCloud;

    fn fast(attempts: u32) -> PollPolicy {
        PollPolicy::attempts(attempts, Duration::from_millis(1))
    }

    #[test]
    fn test_policy_bounds() {
        let started = Instant::now();
        let by_attempts = PollPolicy::attempts(3, Duration::from_secs(1));
        assert!(!by_attempts.exhausted(2, started));
        assert!(by_attempts.exhausted(3, started));

        let by_time = PollPolicy::until_timeout(Duration::from_secs(1), Duration::ZERO);
        assert!(by_time.exhausted(1, started));

        let unbounded = PollPolicy {
            interval: Duration::from_secs(1),
            timeout: None,
            max_attempts: None,
        };
        assert!(unbounded.exhausted(1, started));
    }

    #[tokio::test]
    async fn test_status_of_missing_service_is_unknown() {
        let reporter = StatusReporter::new(Arc::new(InMemoryCloud::new()));
        let status = reporter.poll_deployment_status("staging", "web").await.unwrap();
        assert_eq!(status, DeploymentStatus::Unknown);
    }

    #[tokio::test]
    async fn test_status_of_primary_deployment() {
        let cloud = Arc::new(InMemoryCloud::new().with_service("staging", "web"));
        let reporter = StatusReporter::new(cloud);
        let status = reporter.poll_deployment_status("staging", "web").await.unwrap();
        assert_eq!(status, DeploymentStatus::Primary);
    }

    #[tokio::test]
    async fn test_endpoint_not_found_after_bounded_attempts() {
        let cloud = Arc::new(InMemoryCloud::new().with_service("staging", "web"));
        let reporter = StatusReporter::new(cloud.clone());

        let err = reporter
            .resolve_public_endpoint("staging", "web", 8080, "http", &fast(3))
            .await
            .unwrap_err();

        assert!(matches!(err, DeployError::EndpointNotFound { attempts: 3, .. }));
        assert_eq!(cloud.call_count("list_running_tasks").await, 3);
    }

    #[tokio::test]
    async fn test_endpoint_found() {
        let cloud = Arc::new(
            InMemoryCloud::new()
                .with_service("staging", "web")
                .with_running_task("staging", "web", "203.0.113.10"),
        );
        let reporter = StatusReporter::new(cloud);

        let endpoint = reporter
            .resolve_public_endpoint("staging", "web", 8080, "http", &fast(3))
            .await
            .unwrap();
        assert_eq!(endpoint.url(), "http://203.0.113.10:8080");
    }

    #[tokio::test]
    async fn test_lookup_errors_end_in_endpoint_not_found() {
        let cloud = Arc::new(
            InMemoryCloud::new()
                .with_service("staging", "web")
                .with_running_task("staging", "web", "203.0.113.10")
                .failing_task_listing("ServiceNotFoundException"),
        );
        let reporter = StatusReporter::new(cloud.clone());

        let err = reporter
            .resolve_public_endpoint("staging", "web", 8080, "http", &fast(3))
            .await
            .unwrap_err();

        assert!(matches!(err, DeployError::EndpointNotFound { attempts: 3, .. }));
        assert!(!err.is_fatal());
        assert_eq!(cloud.call_count("list_running_tasks").await, 3);
    }
}
