//! Task definition documents
//!
//! A task definition is an immutable description of a deployable unit. Rendering
//! produces a new document; the registry turns each registration into a new
//! revision. JSON field names follow the ECS wire format.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from loading, validating or rendering a task definition
#[derive(Debug, Error)]
pub enum TaskDefinitionError {
    #[error("Failed to read task definition {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid task definition JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Container '{container}' not found in task definition '{family}'")]
    ContainerNotFound { container: String, family: String },

    #[error("Invalid environment entry '{0}' (expected KEY=VALUE)")]
    InvalidEnvironment(String),

    #[error("Invalid task definition '{family}': {message}")]
    Invalid { family: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDefinitionDocument {
    pub family: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_role_arn: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_role_arn: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_mode: Option<String>,

    pub container_definitions: Vec<ContainerDefinition>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requires_compatibilities: Vec<String>,

    /// Task-level CPU units, a string on the wire
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,

    /// Task-level memory in MiB, a string on the wire
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerDefinition {
    pub name: String,

    pub image: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub essential: Option<bool>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub port_mappings: Vec<PortMapping>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_configuration: Option<LogConfiguration>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub environment: Vec<EnvironmentVariable>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortMapping {
    pub container_port: u16,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_port: Option<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogConfiguration {
    pub log_driver: String,

    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

impl LogConfiguration {
    pub fn group(&self) -> Option<&str> {
        self.options.get("awslogs-group").map(String::as_str)
    }

    pub fn region(&self) -> Option<&str> {
        self.options.get("awslogs-region").map(String::as_str)
    }

    pub fn stream_prefix(&self) -> Option<&str> {
        self.options.get("awslogs-stream-prefix").map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentVariable {
    pub name: String,
    pub value: String,
}

impl TaskDefinitionDocument {
    /// Parse a document from JSON
    ///
    /// Accepts both a bare task definition and the `{"taskDefinition": {...}}`
    /// envelope that describing a registered revision returns. Registry-assigned
    /// fields (ARN, revision, status, ...) are dropped.
    pub fn from_json(json: &str) -> Result<Self, TaskDefinitionError> {
        let mut value: serde_json::Value = serde_json::from_str(json)?;
        if let Some(inner) = value.get_mut("taskDefinition") {
            value = inner.take();
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Load a document from a file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, TaskDefinitionError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| TaskDefinitionError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    /// Load from inline JSON (anything starting with `{`) or a file path
    pub fn load(source: &str) -> Result<Self, TaskDefinitionError> {
        if source.trim_start().starts_with('{') {
            Self::from_json(source)
        } else {
            Self::from_file(source.trim())
        }
    }

    /// Compact JSON, suitable for registration
    pub fn to_json(&self) -> Result<String, TaskDefinitionError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> Result<String, TaskDefinitionError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn container(&self, name: &str) -> Option<&ContainerDefinition> {
        self.container_definitions.iter().find(|c| c.name == name)
    }

    /// A new document with `container`'s image replaced
    ///
    /// `environment` entries are merged into the container's environment,
    /// overriding variables with the same name.
    pub fn with_container_image(
        &self,
        container: &str,
        image: &str,
        environment: &[EnvironmentVariable],
    ) -> Result<Self, TaskDefinitionError> {
        let mut rendered = self.clone();
        let target = rendered
            .container_definitions
            .iter_mut()
            .find(|c| c.name == container)
            .ok_or_else(|| TaskDefinitionError::ContainerNotFound {
                container: container.to_string(),
                family: self.family.clone(),
            })?;

        target.image = image.to_string();
        for var in environment {
            match target.environment.iter_mut().find(|e| e.name == var.name) {
                Some(existing) => existing.value = var.value.clone(),
                None => target.environment.push(var.clone()),
            }
        }

        Ok(rendered)
    }

    /// Structural checks the orchestrator would otherwise reject at registration
    pub fn validate(&self) -> Result<(), TaskDefinitionError> {
        let invalid = |message: &str| TaskDefinitionError::Invalid {
            family: self.family.clone(),
            message: message.to_string(),
        };

        if self.family.trim().is_empty() {
            return Err(invalid("family is empty"));
        }
        if self.container_definitions.is_empty() {
            return Err(invalid("no container definitions"));
        }

        let mut names = std::collections::HashSet::new();
        for container in &self.container_definitions {
            if !names.insert(container.name.as_str()) {
                return Err(invalid(&format!("duplicate container '{}'", container.name)));
            }
        }

        if self.requires_compatibilities.iter().any(|c| c == "FARGATE") {
            if self.network_mode.as_deref() != Some("awsvpc") {
                return Err(invalid("FARGATE requires networkMode 'awsvpc'"));
            }
            if self.cpu.is_none() || self.memory.is_none() {
                return Err(invalid("FARGATE requires task-level cpu and memory"));
            }
        }

        if self.network_mode.as_deref() == Some("awsvpc") {
            for container in &self.container_definitions {
                for mapping in &container.port_mappings {
                    if mapping.host_port.is_some_and(|h| h != mapping.container_port) {
                        return Err(invalid(&format!(
                            "container '{}' maps host port {:?} to {}; awsvpc requires them to match",
                            container.name, mapping.host_port, mapping.container_port
                        )));
                    }
                }
            }
        }

        Ok(())
    }
}

/// Parse `KEY=VALUE` lines; blank lines are ignored
pub fn parse_environment(lines: &str) -> Result<Vec<EnvironmentVariable>, TaskDefinitionError> {
    lines
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            line.split_once('=')
                .filter(|(name, _)| !name.trim().is_empty())
                .map(|(name, value)| EnvironmentVariable {
                    name: name.trim().to_string(),
                    value: value.to_string(),
                })
                .ok_or_else(|| TaskDefinitionError::InvalidEnvironment(line.to_string()))
        })
        .collect()
}
