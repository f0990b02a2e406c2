//! Errors from calls to the orchestration service

use thiserror::Error;

/// Error types for cloud operations
#[derive(Debug, Error)]
pub enum CloudError {
    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with code {code}: {stderr}")]
    CommandFailed {
        program: String,
        code: i32,
        stderr: String,
    },

    #[error("{program} timed out after {secs} seconds")]
    Timeout { program: String, secs: u64 },

    #[error("Unexpected response from {operation}: {message}")]
    Parse { operation: String, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rejected: {0}")]
    Rejected(String),
}

impl CloudError {
    pub fn parse(operation: &str, message: impl ToString) -> Self {
        Self::Parse {
            operation: operation.to_string(),
            message: message.to_string(),
        }
    }
}
