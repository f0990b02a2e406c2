//! deployline - declarative container deployment pipelines

pub mod cli;
pub mod cloud;
pub mod core;
pub mod error;
pub mod execution;
pub mod persistence;

// Re-export commonly used types
pub use cloud::{AwsCliClient, CloudAdapter, CloudClientConfig, Deployer, InMemoryCloud, StatusReporter};
pub use core::{ExecutionStatus, Pipeline, PipelineConfig, RunContext, Step, StepState, Trigger};
pub use error::DeployError;
pub use execution::{ExecutionEngine, ExecutionEvent, RunReport};
