//! Tool system for the engine
//!
//! - `Tool` trait - typed interface every built-in tool implements
//! - `BuiltinTool` / `ToolInput` / `ToolOutput` - the closed, type-erased set
//! - `ToolRegistry` - ordered tools with enable flags
//! - `projection` - model content blocks and UI presentations
//! - `common` - built-in tools (Read, Glob, Write, Bash, AskUserQuestion)

mod builtin;
mod registry;
mod tool;

pub mod common;
pub mod projection;

pub use builtin::{BuiltinTool, ToolInput, ToolOutput};
pub use projection::{
    rejection_message, schema_error_message, unknown_tool_message, ContentBlock, ImageSource,
    LineStyle, Presentation, PresentationLine, ToolResultBlock, INTERRUPT_MESSAGE,
    REJECT_MESSAGE, REJECT_MESSAGE_WITH_REASON_PREFIX,
};
pub use registry::{RegisteredTool, ToolDefinition, ToolRegistry};
pub use tool::{ExecutionEvent, PermissionSubject, ProgressSink, Tool};

pub use common::{AskUserQuestionTool, BashTool, GlobTool, ReadTool, WriteTool};
