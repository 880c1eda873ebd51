//! Common/built-in tools
//!
//! - `ReadTool` - Read file contents (read-only)
//! - `GlobTool` - Find files by pattern (read-only)
//! - `AskUserQuestionTool` - Ask the user through the custom UI slot (read-only)
//! - `WriteTool` - Create or overwrite files
//! - `BashTool` - Execute shell commands

pub mod ask_user_question;
pub mod bash;
pub mod glob_tool;
pub mod read_tool;
pub mod write_tool;

pub use ask_user_question::AskUserQuestionTool;
pub use bash::BashTool;
pub use glob_tool::GlobTool;
pub use read_tool::ReadTool;
pub use write_tool::WriteTool;
