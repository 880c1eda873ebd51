pub mod core;
pub mod permissions;
pub mod runtime;
pub mod tools;

// Ambient setup
pub mod config;
pub mod logging;

// Optional terminal adapter
pub mod cli;

pub use config::EngineConfig;
pub use core::{EngineError, EngineEvent, EngineResult, RequestState, SessionContext, ToolUseContext};
pub use permissions::{PermissionGate, PermissionPrompter, PermissionStore, PromptAnswer};
pub use runtime::{ExecutionCoordinator, ExecutionOutcome, ToolUseRequest, TurnOutcome};
pub use tools::{BuiltinTool, ToolRegistry, ToolResultBlock};
