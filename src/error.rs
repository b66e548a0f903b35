//! Error types for the workflow execution service.

use thiserror::Error;

/// Result type for workflow operations.
pub type WorkflowResult<T> = Result<T, WorkflowError>;

/// Comprehensive error type spanning document parsing, DAG construction,
/// and scheduling.
#[derive(Error, Debug)]
pub enum WorkflowError {
    /// Document failed to parse as YAML/JSON, or failed schema validation.
    #[error("parse error: {0}")]
    Parse(String),

    /// Unsupported or missing `cwlVersion`.
    #[error("unsupported cwlVersion: {0}")]
    UnsupportedVersion(String),

    /// Workflow-level structural validation failed (duplicate ids, dangling
    /// sources, cycles). Carries every violation found, not just the first.
    #[error("validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    /// Scatter input arrays had mismatched lengths under `dotproduct`.
    #[error("scatter arity mismatch: {0}")]
    ScatterArityMismatch(String),

    /// A required input was absent when building a node's command / inputs.
    #[error("missing required input: {0}")]
    MissingRequiredInput(String),

    /// Run could not be resolved from a workflow run request.
    #[error("invalid run request: {0}")]
    InvalidRun(String),

    /// Workflow run or node not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Invalid state transition attempted on a run or DAG node.
    #[error("invalid state transition from {from:?} to {to:?}")]
    InvalidStateTransition { from: String, to: String },

    /// Expression sandbox errors.
    #[error("expression evaluation timed out")]
    ExprTimeout,
    #[error("expression evaluation exceeded memory limit")]
    ExprMemoryExceeded,
    #[error("expression sandbox worker crashed: {0}")]
    ExprWorkerCrashed(String),
    #[error("expression evaluation error: {0}")]
    ExprEvalError(String),
    #[error("sandbox pool exhausted")]
    PoolExhausted,

    /// Task execution failed permanently.
    #[error("task execution failed: {0}")]
    TaskExecutionFailed(String),

    /// Transient failure talking to the executor, store, or event bus;
    /// callers should retry without mutating state.
    #[error("transient error: {0}")]
    Transient(String),

    /// Cancellation could not be completed cleanly.
    #[error("cancellation failed: {0}")]
    CancellationFailed(String),

    /// State persistence error.
    #[error("state store error: {0}")]
    Store(String),

    /// Event bus error.
    #[error("event bus error: {0}")]
    EventBus(String),

    /// Internal invariant violation.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for WorkflowError {
    fn from(err: std::io::Error) -> Self {
        WorkflowError::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for WorkflowError {
    fn from(err: serde_json::Error) -> Self {
        WorkflowError::Parse(err.to_string())
    }
}

impl From<serde_yaml::Error> for WorkflowError {
    fn from(err: serde_yaml::Error) -> Self {
        WorkflowError::Parse(err.to_string())
    }
}
