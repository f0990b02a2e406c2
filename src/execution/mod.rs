//! Pipeline execution engine

pub mod engine;
pub mod executor;

pub use engine::{EventHandler, ExecutionEngine, ExecutionEvent, RunReport};
pub use executor::{StepExecutor, StepOutcome};
