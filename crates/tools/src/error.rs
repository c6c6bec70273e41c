use thiserror::Error;
use toolgate_policy::registry::ToolCategory;

/// Failures raised by back-ends and the executor layer.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{0}")]
    Disabled(&'static str),

    #[error("No executor registered for category '{0}'")]
    NoBackend(ToolCategory),

    #[error("Operation '{0}' is not supported by this back-end")]
    Unsupported(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Operation timed out")]
    Timeout,

    #[error("Sandbox violation: {0}")]
    SandboxViolation(String),

    #[error("Internal error")]
    Internal,
}

/// Why the dispatcher refused or failed a call. The `Display` text is what
/// callers see in `ToolOutcome::error`.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Invalid parameters: {0}")]
    Validation(String),

    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Agent is not authorized to use tool: {0}")]
    UnauthorizedTool(String),

    #[error("{0}")]
    PolicyDenied(String),

    #[error("User denied permission")]
    UserDenied,

    #[error("{0}")]
    HardDisabled(&'static str),

    #[error("{0}")]
    Execution(#[from] ToolError),
}
