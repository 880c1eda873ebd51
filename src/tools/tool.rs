//! Tool trait definition
//!
//! Every built-in tool implements this trait with its own typed input and
//! output. The registry erases the types through [`super::BuiltinTool`].

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt::Debug;
use std::path::PathBuf;
use tokio::sync::mpsc;

use super::builtin::ToolOutput;
use super::projection::{ContentBlock, Presentation};
use crate::core::{SchemaError, ToolError, ToolUseContext, ValidationFailure};

/// What the permission system should look at for an input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionSubject {
    /// A shell command; classified for risk and matched by prefix
    Command(String),
    /// A filesystem path
    Path(PathBuf),
    /// The tool as a whole
    Tool,
}

/// Events emitted by a running tool, in order: `Progress*` then one terminal event
#[derive(Debug)]
pub enum ExecutionEvent {
    Progress(String),
    Result(ToolOutput),
    Error(ToolError),
}

impl ExecutionEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExecutionEvent::Progress(_))
    }
}

/// Handle a tool uses to stream progress while it runs
#[derive(Debug, Clone)]
pub struct ProgressSink {
    tx: mpsc::Sender<ExecutionEvent>,
}

impl ProgressSink {
    pub fn new(tx: mpsc::Sender<ExecutionEvent>) -> Self {
        Self { tx }
    }

    /// Send a progress line; waits when the consumer is behind
    pub async fn emit(&self, content: impl Into<String>) {
        if self
            .tx
            .send(ExecutionEvent::Progress(content.into()))
            .await
            .is_err()
        {
            tracing::debug!("Progress receiver dropped");
        }
    }
}

/// Trait for tools the model can invoke
#[async_trait]
pub trait Tool: Send + Sync + Clone + 'static {
    /// Validated input
    type Input: DeserializeOwned + Debug + Clone + Send + Sync + 'static;
    /// Successful result
    type Output: Debug + Clone + Send + Sync + 'static;

    /// Unique name the model uses
    fn name(&self) -> &'static str;

    /// Name shown to the user
    fn user_facing_name(&self) -> &'static str {
        self.name()
    }

    /// Description sent to the model
    fn description(&self) -> &str;

    /// JSON schema sent to the model
    fn input_schema(&self) -> Value;

    /// Read-only tools never force a turn to serialize
    fn is_read_only(&self) -> bool;

    /// Parse raw input; unknown fields are rejected by the input type
    fn validate_schema(&self, input: &Value) -> Result<Self::Input, SchemaError> {
        Ok(serde_json::from_value(input.clone())?)
    }

    /// Semantic checks on a parsed input
    async fn validate_input(
        &self,
        _input: &Self::Input,
        _ctx: &ToolUseContext,
    ) -> Result<(), ValidationFailure> {
        Ok(())
    }

    /// Whether this input needs the user's consent
    fn needs_permission(&self, input: &Self::Input, ctx: &ToolUseContext) -> bool;

    /// What grants for this input are keyed on
    fn permission_subject(&self, _input: &Self::Input) -> PermissionSubject {
        PermissionSubject::Tool
    }

    /// Run the tool
    ///
    /// Long-running tools should check `ctx.cancel` at their yield points.
    async fn call(
        &self,
        input: Self::Input,
        ctx: &ToolUseContext,
        progress: &ProgressSink,
    ) -> Result<Self::Output, ToolError>;

    /// File and mtime observed by a successful call, for stale-write tracking
    fn observed_file(&self, _output: &Self::Output) -> Option<(PathBuf, i64)> {
        None
    }

    /// One-line description of a pending invocation
    fn render_tool_use(&self, input: &Self::Input, verbose: bool) -> String;

    /// Presentation for an invocation the user rejected
    fn render_rejected(&self, input: &Self::Input, _ctx: &ToolUseContext) -> Presentation {
        Presentation::error(format!(
            "User rejected {}: {}",
            self.user_facing_name(),
            self.render_tool_use(input, false)
        ))
    }

    /// Compact content for the model
    fn render_for_model(&self, output: &Self::Output) -> Vec<ContentBlock>;

    /// Rich rendering for the UI
    fn render_result(&self, output: &Self::Output, verbose: bool) -> Presentation;
}
