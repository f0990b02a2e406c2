//! CLI command definitions

use crate::cloud::CloudClientConfig;
use crate::core::Trigger;
use clap::Args;
use std::path::PathBuf;

/// Options for reaching the cloud through the `aws` and `docker` CLIs
#[derive(Debug, Args, Clone)]
pub struct CloudArgs {
    /// Region for service calls (defaults to the CLI's own configuration)
    #[arg(long, env = "AWS_REGION")]
    pub region: Option<String>,

    /// Named AWS CLI profile
    #[arg(long, env = "AWS_PROFILE")]
    pub profile: Option<String>,

    /// Path to the `aws` executable
    #[arg(long, env = "DEPLOYLINE_AWS", default_value = "aws")]
    pub aws_path: String,

    /// Path to the `docker` executable
    #[arg(long, env = "DEPLOYLINE_DOCKER", default_value = "docker")]
    pub docker_path: String,

    /// Timeout for each external command, in seconds
    #[arg(long, default_value_t = 600)]
    pub command_timeout_secs: u64,
}

impl CloudArgs {
    pub fn client_config(&self) -> CloudClientConfig {
        let mut config = CloudClientConfig::new()
            .with_aws_path(&self.aws_path)
            .with_docker_path(&self.docker_path)
            .with_timeout(self.command_timeout_secs);
        if let Some(region) = &self.region {
            config = config.with_region(region);
        }
        if let Some(profile) = &self.profile {
            config = config.with_profile(profile);
        }
        config
    }
}

/// Run a pipeline
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub file: PathBuf,

    /// Run as a push to this branch
    #[arg(long, conflicts_with = "input")]
    pub branch: Option<String>,

    /// Manual-trigger inputs (key=value)
    #[arg(long, value_parser = parse_key_value)]
    pub input: Vec<(String, String)>,

    /// Environment binding overrides (key=value)
    #[arg(long, value_parser = parse_key_value)]
    pub env: Vec<(String, String)>,

    /// Run against a simulated service instead of the real one (not saved to history)
    #[arg(long)]
    pub dry_run: bool,

    /// Don't save the run to history
    #[arg(long)]
    pub no_history: bool,

    #[command(flatten)]
    pub cloud: CloudArgs,
}

impl RunCommand {
    /// The trigger this invocation stands for
    pub fn trigger(&self) -> Trigger {
        match &self.branch {
            Some(branch) => Trigger::Push {
                branch: branch.clone(),
            },
            None => Trigger::Manual {
                inputs: self.input.iter().cloned().collect(),
            },
        }
    }

    /// Whether the run belongs in history; simulated runs never do
    pub fn records_history(&self) -> bool {
        !self.no_history && !self.dry_run
    }
}

/// Validate a pipeline configuration
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub file: PathBuf,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Render a task definition with a new container image
#[derive(Debug, Args, Clone)]
pub struct RenderCommand {
    /// Task definition template (JSON file)
    #[arg(short, long)]
    pub template: PathBuf,

    /// Container whose image is replaced
    #[arg(short, long)]
    pub container: String,

    /// Image URI to substitute
    #[arg(short, long)]
    pub image: String,

    /// Environment variables to merge into the container (KEY=VALUE)
    #[arg(long = "env")]
    pub environment: Vec<String>,

    /// Write the rendered document here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Show the deployment status of a service
#[derive(Debug, Args, Clone)]
pub struct StatusCommand {
    #[arg(long)]
    pub cluster: String,

    #[arg(long)]
    pub service: String,

    /// Report a specific deployment instead of the primary one
    #[arg(long)]
    pub deployment_id: Option<String>,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub cloud: CloudArgs,
}

/// Find the public endpoint of a service
#[derive(Debug, Args, Clone)]
pub struct EndpointCommand {
    #[arg(long)]
    pub cluster: String,

    #[arg(long)]
    pub service: String,

    /// Container port the service listens on
    #[arg(long)]
    pub port: u16,

    #[arg(long, default_value = "http")]
    pub scheme: String,

    /// Number of lookups before giving up
    #[arg(long, default_value_t = 10)]
    pub attempts: u32,

    /// Seconds between lookups
    #[arg(long, default_value_t = 6)]
    pub interval_secs: u64,

    #[command(flatten)]
    pub cloud: CloudArgs,
}

/// List pipelines with recorded runs
#[derive(Debug, Args, Clone)]
pub struct ListCommand {
    /// Show run counts
    #[arg(long)]
    pub with_counts: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Show run history
#[derive(Debug, Args, Clone)]
pub struct HistoryCommand {
    /// Pipeline name to filter by
    #[arg(short, long)]
    pub pipeline: Option<String>,

    /// Number of recent runs to show
    #[arg(short, long, default_value_t = 10)]
    pub limit: usize,

    /// Show full details, including outputs
    #[arg(long)]
    pub details: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,

    /// Show a single run
    #[arg(long)]
    pub execution_id: Option<String>,
}

/// Parse key=value pairs
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("Invalid key=value pair: {}", s)),
    }
}
