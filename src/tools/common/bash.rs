//! Bash tool for executing shell commands
//!
//! Runs `bash -c <command>` in the session's working directory. Stdout lines
//! are streamed as progress; the child is killed on cancellation or timeout.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

use super::super::projection::{
    truncate_chars, ContentBlock, LineStyle, Presentation, PresentationLine,
};
use super::super::tool::{PermissionSubject, ProgressSink, Tool};
use crate::core::{ToolError, ToolUseContext, ValidationFailure};

/// Default timeout in milliseconds (2 minutes)
pub const DEFAULT_TIMEOUT_MS: u64 = 120000;
/// Maximum timeout in milliseconds (10 minutes)
pub const MAX_TIMEOUT_MS: u64 = 600000;
/// Maximum output length in characters
const MAX_OUTPUT_LENGTH: usize = 30000;
/// Output lines shown in non-verbose presentations
const MAX_RENDERED_LINES: usize = 5;

/// Input for the bash tool
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BashInput {
    /// The command to execute
    pub command: String,
    /// Optional timeout in milliseconds (max 600000)
    #[serde(default)]
    pub timeout: Option<u64>,
    /// Optional description of what this command does
    #[serde(default)]
    pub description: Option<String>,
}

/// Output of a command that exited with status 0
#[derive(Debug, Clone, Serialize)]
pub struct BashOutput {
    pub stdout: String,
    pub stderr: String,
    pub stdout_lines: usize,
    pub stderr_lines: usize,
}

/// Bash tool for executing shell commands
#[derive(Debug, Clone)]
pub struct BashTool {
    default_timeout_ms: u64,
}

impl BashTool {
    pub fn new() -> Self {
        Self::with_timeout_ms(DEFAULT_TIMEOUT_MS)
    }

    /// Use a different default timeout (capped at [`MAX_TIMEOUT_MS`])
    pub fn with_timeout_ms(timeout_ms: u64) -> Self {
        Self {
            default_timeout_ms: timeout_ms.min(MAX_TIMEOUT_MS),
        }
    }

    /// Run a command, streaming stdout lines to `progress`
    async fn run_command(
        &self,
        command: &str,
        timeout_ms: u64,
        ctx: &ToolUseContext,
        progress: &ProgressSink,
    ) -> Result<(String, String, i32), ToolError> {
        tracing::info!("Executing bash command: {}", command);
        tracing::debug!("Working directory: {}", ctx.cwd.display());
        tracing::debug!("Timeout: {}ms", timeout_ms);

        let mut child = Command::new("bash")
            .arg("-c")
            .arg(command)
            .current_dir(&ctx.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ToolError::failed("Failed to capture stdout"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| ToolError::failed("Failed to capture stderr"))?;

        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Err(e) = stderr.read_to_end(&mut buf).await {
                tracing::warn!("Failed to read command stderr: {}", e);
            }
            String::from_utf8_lossy(&buf).into_owned()
        });

        let deadline = tokio::time::sleep(Duration::from_millis(timeout_ms));
        tokio::pin!(deadline);

        let mut reader = BufReader::new(stdout);
        let mut line = Vec::new();
        let mut collected = String::new();

        loop {
            line.clear();
            tokio::select! {
                _ = ctx.cancel.cancelled() => {
                    tracing::info!("Command cancelled, killing child: {}", command);
                    let _ = child.kill().await;
                    stderr_task.abort();
                    return Err(ToolError::Interrupted);
                }
                _ = &mut deadline => {
                    return Err(timed_out(&mut child, &stderr_task, command, timeout_ms).await);
                }
                read = reader.read_until(b'\n', &mut line) => {
                    if read? == 0 {
                        break;
                    }
                    let text = String::from_utf8_lossy(&line);
                    let text = text.trim_end_matches(['\n', '\r']);
                    progress.emit(text.to_string()).await;
                    collected.push_str(text);
                    collected.push('\n');
                }
            }
        }

        // Stdout can close while the command keeps running
        let status = tokio::select! {
            _ = ctx.cancel.cancelled() => {
                tracing::info!("Command cancelled, killing child: {}", command);
                let _ = child.kill().await;
                stderr_task.abort();
                return Err(ToolError::Interrupted);
            }
            _ = &mut deadline => {
                return Err(timed_out(&mut child, &stderr_task, command, timeout_ms).await);
            }
            status = child.wait() => status?,
        };
        let stderr = stderr_task.await.unwrap_or_default();
        let exit_code = status.code().unwrap_or(-1);

        tracing::debug!("Command exit code: {}", exit_code);
        tracing::debug!("Output length: {} chars", collected.len());

        Ok((collected, stderr, exit_code))
    }
}

async fn timed_out(
    child: &mut Child,
    stderr_task: &JoinHandle<String>,
    command: &str,
    timeout_ms: u64,
) -> ToolError {
    tracing::warn!("Command timed out after {}ms: {}", timeout_ms, command);
    let _ = child.kill().await;
    stderr_task.abort();
    ToolError::failed(format!("Command timed out after {}ms", timeout_ms))
}

impl Default for BashTool {
    fn default() -> Self {
        Self::new()
    }
}

fn format_output(stdout: &str, stderr: &str) -> String {
    let stdout = stdout.trim_end();
    let stderr = stderr.trim_end();
    let mut result = String::new();
    if !stdout.is_empty() {
        result.push_str(stdout);
    }
    if !stderr.is_empty() {
        if !result.is_empty() {
            result.push('\n');
        }
        result.push_str("STDERR:\n");
        result.push_str(stderr);
    }
    truncate_chars(&result, MAX_OUTPUT_LENGTH)
}

#[async_trait]
impl Tool for BashTool {
    type Input = BashInput;
    type Output = BashOutput;

    fn name(&self) -> &'static str {
        "Bash"
    }

    fn description(&self) -> &str {
        "Executes a given bash command with optional timeout. \
        Use this for terminal operations like git, npm, docker, etc. \
        DO NOT use it for file operations (reading, writing) - use the specialized tools instead."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The command to execute"
                },
                "timeout": {
                    "type": "number",
                    "description": "Optional timeout in milliseconds (max 600000). Default is 120000ms (2 minutes)."
                },
                "description": {
                    "type": "string",
                    "description": "Clear, concise description of what this command does in 5-10 words, in active voice."
                }
            },
            "required": ["command"],
            "additionalProperties": false
        })
    }

    fn is_read_only(&self) -> bool {
        false
    }

    async fn validate_input(
        &self,
        input: &BashInput,
        _ctx: &ToolUseContext,
    ) -> Result<(), ValidationFailure> {
        if input.command.trim().is_empty() {
            return Err(ValidationFailure::new("Command must not be empty."));
        }
        if let Some(timeout) = input.timeout {
            if timeout == 0 || timeout > MAX_TIMEOUT_MS {
                return Err(ValidationFailure::new(format!(
                    "Timeout must be between 1 and {} ms.",
                    MAX_TIMEOUT_MS
                )));
            }
        }
        Ok(())
    }

    fn needs_permission(&self, _input: &BashInput, _ctx: &ToolUseContext) -> bool {
        true
    }

    fn permission_subject(&self, input: &BashInput) -> PermissionSubject {
        PermissionSubject::Command(input.command.clone())
    }

    async fn call(
        &self,
        input: BashInput,
        ctx: &ToolUseContext,
        progress: &ProgressSink,
    ) -> Result<BashOutput, ToolError> {
        if let Some(ref desc) = input.description {
            tracing::info!("Command description: {}", desc);
        }
        let timeout_ms = input.timeout.unwrap_or(self.default_timeout_ms);

        let (stdout, stderr, exit_code) = self
            .run_command(&input.command, timeout_ms, ctx, progress)
            .await?;

        if exit_code != 0 {
            return Err(ToolError::failed(format!(
                "Command failed with exit code {}\n{}",
                exit_code,
                format_output(&stdout, &stderr)
            )));
        }

        Ok(BashOutput {
            stdout_lines: stdout.lines().count(),
            stderr_lines: stderr.lines().count(),
            stdout,
            stderr,
        })
    }

    fn render_tool_use(&self, input: &BashInput, verbose: bool) -> String {
        match (&input.description, verbose) {
            (Some(desc), false) => format!("{} ({})", input.command, desc),
            _ => input.command.clone(),
        }
    }

    fn render_for_model(&self, output: &BashOutput) -> Vec<ContentBlock> {
        let text = format_output(&output.stdout, &output.stderr);
        if text.is_empty() {
            vec![ContentBlock::text("Command completed successfully (no output)")]
        } else {
            vec![ContentBlock::text(text)]
        }
    }

    fn render_result(&self, output: &BashOutput, verbose: bool) -> Presentation {
        if output.stdout.trim().is_empty() && output.stderr.trim().is_empty() {
            return Presentation::new("(No content)");
        }

        let total = output.stdout_lines;
        let limit = if verbose { total } else { MAX_RENDERED_LINES };
        let mut presentation = Presentation::new(format!(
            "{} line{} of output",
            total,
            if total == 1 { "" } else { "s" }
        ))
        .with_lines(output.stdout.lines().take(limit).map(PresentationLine::plain));
        if total > limit {
            presentation = presentation
                .with_line(PresentationLine::dim(format!("... (+{} lines)", total - limit)));
        }
        presentation.with_lines(
            output
                .stderr
                .lines()
                .map(|l| PresentationLine::new(l, LineStyle::Error)),
        )
    }
}
