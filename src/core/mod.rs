//! Core domain models
//!
//! Pipelines, steps, the run context they share, and the task definition
//! documents they deploy.

pub mod config;
pub mod context;
pub mod pipeline;
pub mod reference;
pub mod state;
pub mod step;
pub mod task_definition;

pub use config::{ConfigError, PipelineConfig, Trigger};
pub use context::*;
pub use pipeline::*;
pub use state::*;
pub use step::*;
pub use task_definition::TaskDefinitionDocument;
