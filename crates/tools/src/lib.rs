//! Gatekeeping and execution of agent tool calls.

pub mod backends;
pub mod confirmation;
pub mod denylist;
pub mod dispatcher;
pub mod error;
pub mod executors;
pub mod sandbox;

pub use backends::{FileBackend, MemoryBackend, ProcessBackend};
pub use confirmation::{
    ChannelConfirmationGate, ConfirmationGate, ConfirmationRequest, PendingConfirmation,
    StaticConfirmationGate, TerminalConfirmationGate,
};
pub use dispatcher::{ExecutionDispatcher, ToolOutcome};
pub use error::{DispatchError, ToolError};
pub use executors::{CategoryExecutor, ExecutorSet, ToolBackend};
pub use sandbox::PathGuard;
