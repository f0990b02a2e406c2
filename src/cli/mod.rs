//! Command-line interface

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use commands::{
    EndpointCommand, HistoryCommand, ListCommand, RenderCommand, RunCommand, StatusCommand,
    ValidateCommand,
};
use std::ffi::OsString;

/// Declarative container deployment pipelines
#[derive(Debug, Parser, Clone)]
#[command(name = "deployline")]
#[command(version)]
#[command(about = "Runs declarative container deployment pipelines against ECS-style services", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run a pipeline
    Run(RunCommand),

    /// Validate a pipeline configuration
    Validate(ValidateCommand),

    /// Render a task definition with a new image
    Render(RenderCommand),

    /// Show a service's deployment status
    Status(StatusCommand),

    /// Resolve a service's public endpoint
    Endpoint(EndpointCommand),

    /// List pipelines with recorded runs
    List(ListCommand),

    /// Show run history
    History(HistoryCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}
