//! Closed set of built-in tools with type-erased dispatch
//!
//! `BuiltinTool`, `ToolInput` and `ToolOutput` are parallel enums. Pairing a
//! tool with another tool's input or output is an engine invariant violation.

use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::common::ask_user_question::{AskUserQuestionInput, AskUserQuestionOutput};
use super::common::bash::{BashInput, BashOutput};
use super::common::glob_tool::{GlobInput, GlobOutput};
use super::common::read_tool::{ReadInput, ReadOutput};
use super::common::write_tool::{WriteInput, WriteOutput};
use super::common::{AskUserQuestionTool, BashTool, GlobTool, ReadTool, WriteTool};
use super::projection::{ContentBlock, Presentation};
use super::tool::{ExecutionEvent, PermissionSubject, ProgressSink, Tool};
use crate::core::{
    EngineError, EngineResult, SchemaError, ToolError, ToolUseContext, ValidationFailure,
};
use crate::runtime::channels::create_progress_channel;

/// A registered built-in tool
#[derive(Debug, Clone)]
pub enum BuiltinTool {
    Read(ReadTool),
    Write(WriteTool),
    Bash(BashTool),
    Glob(GlobTool),
    AskUser(AskUserQuestionTool),
}

/// Validated input for one of the built-in tools
#[derive(Debug, Clone)]
pub enum ToolInput {
    Read(ReadInput),
    Write(WriteInput),
    Bash(BashInput),
    Glob(GlobInput),
    AskUser(AskUserQuestionInput),
}

/// Successful output of one of the built-in tools
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "tool", content = "output")]
pub enum ToolOutput {
    Read(ReadOutput),
    Write(WriteOutput),
    Bash(BashOutput),
    Glob(GlobOutput),
    AskUser(AskUserQuestionOutput),
}

macro_rules! impl_from {
    ($enum:ident, $($variant:ident($ty:ty)),+ $(,)?) => {
        $(
            impl From<$ty> for $enum {
                fn from(value: $ty) -> Self {
                    $enum::$variant(value)
                }
            }
        )+
    };
}

impl_from!(
    BuiltinTool,
    Read(ReadTool),
    Write(WriteTool),
    Bash(BashTool),
    Glob(GlobTool),
    AskUser(AskUserQuestionTool),
);
impl_from!(
    ToolInput,
    Read(ReadInput),
    Write(WriteInput),
    Bash(BashInput),
    Glob(GlobInput),
    AskUser(AskUserQuestionInput),
);
impl_from!(
    ToolOutput,
    Read(ReadOutput),
    Write(WriteOutput),
    Bash(BashOutput),
    Glob(GlobOutput),
    AskUser(AskUserQuestionOutput),
);

/// Run `$body` with `$t` bound to the concrete tool
macro_rules! each_tool {
    ($tool:expr, |$t:ident| $body:expr) => {
        match $tool {
            BuiltinTool::Read($t) => $body,
            BuiltinTool::Write($t) => $body,
            BuiltinTool::Bash($t) => $body,
            BuiltinTool::Glob($t) => $body,
            BuiltinTool::AskUser($t) => $body,
        }
    };
}

/// Run `$body` with the concrete tool and its matching value from `$enum`
macro_rules! with_pair {
    ($tool:expr, $value:expr, $enum:ident, |$t:ident, $v:ident| $body:expr) => {
        match ($tool, $value) {
            (BuiltinTool::Read($t), $enum::Read($v)) => Ok($body),
            (BuiltinTool::Write($t), $enum::Write($v)) => Ok($body),
            (BuiltinTool::Bash($t), $enum::Bash($v)) => Ok($body),
            (BuiltinTool::Glob($t), $enum::Glob($v)) => Ok($body),
            (BuiltinTool::AskUser($t), $enum::AskUser($v)) => Ok($body),
            (tool, value) => Err(EngineError::invariant(format!(
                "{} {} passed to the {} tool",
                value.tool_name(),
                stringify!($enum),
                tool.name()
            ))),
        }
    };
}

impl ToolInput {
    /// Name of the tool this input belongs to
    pub fn tool_name(&self) -> &'static str {
        match self {
            ToolInput::Read(_) => "Read",
            ToolInput::Write(_) => "Write",
            ToolInput::Bash(_) => "Bash",
            ToolInput::Glob(_) => "Glob",
            ToolInput::AskUser(_) => "AskUserQuestion",
        }
    }
}

impl ToolOutput {
    /// Name of the tool that produced this output
    pub fn tool_name(&self) -> &'static str {
        match self {
            ToolOutput::Read(_) => "Read",
            ToolOutput::Write(_) => "Write",
            ToolOutput::Bash(_) => "Bash",
            ToolOutput::Glob(_) => "Glob",
            ToolOutput::AskUser(_) => "AskUserQuestion",
        }
    }
}

impl BuiltinTool {
    pub fn name(&self) -> &'static str {
        each_tool!(self, |t| t.name())
    }

    pub fn user_facing_name(&self) -> &'static str {
        each_tool!(self, |t| t.user_facing_name())
    }

    pub fn description(&self) -> &str {
        each_tool!(self, |t| t.description())
    }

    pub fn input_schema(&self) -> Value {
        each_tool!(self, |t| t.input_schema())
    }

    pub fn is_read_only(&self) -> bool {
        each_tool!(self, |t| t.is_read_only())
    }

    /// Parse raw model input into this tool's typed input
    pub fn validate_schema(&self, input: &Value) -> Result<ToolInput, SchemaError> {
        each_tool!(self, |t| t.validate_schema(input).map(ToolInput::from))
    }

    pub async fn validate_input(
        &self,
        input: &ToolInput,
        ctx: &ToolUseContext,
    ) -> EngineResult<Result<(), ValidationFailure>> {
        with_pair!(self, input, ToolInput, |t, i| t.validate_input(i, ctx).await)
    }

    pub fn needs_permission(&self, input: &ToolInput, ctx: &ToolUseContext) -> EngineResult<bool> {
        with_pair!(self, input, ToolInput, |t, i| t.needs_permission(i, ctx))
    }

    pub fn permission_subject(&self, input: &ToolInput) -> EngineResult<PermissionSubject> {
        with_pair!(self, input, ToolInput, |t, i| t.permission_subject(i))
    }

    pub fn render_tool_use(&self, input: &ToolInput, verbose: bool) -> EngineResult<String> {
        with_pair!(self, input, ToolInput, |t, i| t.render_tool_use(i, verbose))
    }

    pub fn render_rejected(
        &self,
        input: &ToolInput,
        ctx: &ToolUseContext,
    ) -> EngineResult<Presentation> {
        with_pair!(self, input, ToolInput, |t, i| t.render_rejected(i, ctx))
    }

    pub fn render_for_model(&self, output: &ToolOutput) -> EngineResult<Vec<ContentBlock>> {
        with_pair!(self, output, ToolOutput, |t, o| t.render_for_model(o))
    }

    pub fn render_result(&self, output: &ToolOutput, verbose: bool) -> EngineResult<Presentation> {
        with_pair!(self, output, ToolOutput, |t, o| t.render_result(o, verbose))
    }

    pub fn observed_file(&self, output: &ToolOutput) -> EngineResult<Option<(PathBuf, i64)>> {
        with_pair!(self, output, ToolOutput, |t, o| t.observed_file(o))
    }

    /// Start the tool on its own task
    ///
    /// The receiver yields `Progress*` then exactly one `Result` or `Error`.
    /// If the turn is cancelled first the call future is dropped and an
    /// `Error(Interrupted)` is sent instead.
    pub fn spawn_call(
        &self,
        input: ToolInput,
        ctx: ToolUseContext,
        buffer: usize,
    ) -> EngineResult<(mpsc::Receiver<ExecutionEvent>, JoinHandle<()>)> {
        let (tx, rx) = create_progress_channel(buffer);
        let handle = with_pair!(self.clone(), input, ToolInput, |t, i| tokio::spawn(
            drive(t, i, ctx, tx)
        ))?;
        Ok((rx, handle))
    }
}

async fn drive<T>(tool: T, input: T::Input, ctx: ToolUseContext, tx: mpsc::Sender<ExecutionEvent>)
where
    T: Tool,
    ToolOutput: From<T::Output>,
{
    let progress = ProgressSink::new(tx.clone());
    let result = tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => Err(ToolError::Interrupted),
        result = tool.call(input, &ctx, &progress) => result,
    };

    let event = match result {
        Ok(output) => ExecutionEvent::Result(output.into()),
        Err(e) => ExecutionEvent::Error(e),
    };
    if tx.send(event).await.is_err() {
        tracing::debug!("[{}] Result dropped: receiver closed", tool.name());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SessionContext;
    use crate::tools::ToolRegistry;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_mismatched_input_is_invariant_violation() {
        let tool = BuiltinTool::from(ReadTool::new());
        let input = BashTool::new()
            .validate_schema(&json!({"command": "ls"}))
            .map(ToolInput::from)
            .unwrap();

        let err = tool.permission_subject(&input).unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("Bash ToolInput passed to the Read tool"));
    }

    #[test]
    fn test_validate_schema_maps_variant() {
        let tool = BuiltinTool::from(BashTool::new());
        let input = tool.validate_schema(&json!({"command": "ls"})).unwrap();
        assert!(matches!(input, ToolInput::Bash(_)));
        assert!(tool.validate_schema(&json!({"cmd": "ls"})).is_err());
    }

    #[tokio::test]
    async fn test_spawn_call_yields_terminal_event() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "x\n").unwrap();
        let ctx = SessionContext::new(dir.path()).begin_turn(Arc::new(ToolRegistry::new()));

        let tool = BuiltinTool::from(ReadTool::new());
        let input = tool.validate_schema(&json!({"file_path": "a.txt"})).unwrap();
        let (mut rx, handle) = tool.spawn_call(input, ctx, 4).unwrap();

        let event = rx.recv().await.unwrap();
        assert!(matches!(event, ExecutionEvent::Result(ToolOutput::Read(_))));
        assert!(rx.recv().await.is_none());
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_spawn_call_cancelled_before_start() {
        let ctx = SessionContext::new(std::env::temp_dir())
            .begin_turn(Arc::new(ToolRegistry::new()));
        ctx.cancel();

        let tool = BuiltinTool::from(BashTool::new());
        let input = tool.validate_schema(&json!({"command": "echo hi"})).unwrap();
        let (mut rx, _handle) = tool.spawn_call(input, ctx, 4).unwrap();

        let event = rx.recv().await.unwrap();
        assert!(matches!(event, ExecutionEvent::Error(ToolError::Interrupted)));
    }
}
