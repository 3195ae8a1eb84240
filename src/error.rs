//! Error types for opsdesk.
//!
//! Exit codes:
//! - 0: Success
//! - 2: User error (bad arguments, unknown task, invalid template)
//! - 4: Operation failed (I/O, storage, partial bulk failure)

use std::path::PathBuf;
use thiserror::Error;

/// Exit codes for the opsdesk CLI.
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const USER_ERROR: i32 = 2;
    pub const OPERATION_FAILED: i32 = 4;
}

/// Main error type for opsdesk operations.
#[derive(Error, Debug)]
pub enum Error {
    // User errors (exit code 2)
    #[error("Invalid date '{value}' in field {field}")]
    InvalidDate { field: &'static str, value: String },

    #[error("Invalid template {id}: {reason}")]
    InvalidTemplate { id: u64, reason: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Task not found: {0}")]
    TaskNotFound(u64),

    #[error("Task instance not found: {0}")]
    InstanceNotFound(String),

    #[error("Completion record not found for task {task_id} period {period}")]
    CompletionNotFound { task_id: u64, period: String },

    #[error("Completion record already exists for task {task_id} period {period}")]
    DuplicateCompletion { task_id: u64, period: String },

    // Operation failures (exit code 4)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Failed to read {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{failed} of {attempted} writes failed")]
    PartialFailure { attempted: usize, failed: usize },
}

impl Error {
    /// Map the error onto the CLI exit code contract.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::InvalidDate { .. }
            | Error::InvalidTemplate { .. }
            | Error::InvalidArgument(_)
            | Error::TaskNotFound(_)
            | Error::InstanceNotFound(_)
            | Error::CompletionNotFound { .. }
            | Error::DuplicateCompletion { .. } => exit_codes::USER_ERROR,
            Error::Io(_)
            | Error::Json(_)
            | Error::TomlParse(_)
            | Error::ReadFile { .. }
            | Error::PartialFailure { .. } => exit_codes::OPERATION_FAILED,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
