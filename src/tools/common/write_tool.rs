//! Write tool for creating/writing files
//!
//! Writes are refused when the target exists but was never read in this
//! session, or when it changed on disk after it was read.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use similar::TextDiff;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::super::projection::{
    number_lines, ContentBlock, LineStyle, Presentation, PresentationLine, TRUNCATION_NOTICE,
};
use super::super::tool::{PermissionSubject, ProgressSink, Tool};
use crate::core::{modified_millis, ToolError, ToolUseContext, ValidationFailure};

/// Lines of an updated file echoed back to the model
const MAX_LINES_TO_RENDER_FOR_MODEL: usize = 16000;
/// Lines of a created file shown in non-verbose presentations
const MAX_LINES_TO_RENDER: usize = 10;
/// Unified diff context lines
const DIFF_CONTEXT_LINES: usize = 3;

const NOT_READ_MESSAGE: &str = "File has not been read yet. Read it first before writing to it.";
const MODIFIED_MESSAGE: &str = "File has been modified since read, either by the user or by a linter. Read it again before attempting to write it.";

/// Input for the write tool
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WriteInput {
    /// Path to the file to write
    pub file_path: String,
    /// The full content to write
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteKind {
    Create,
    Update,
}

/// Output of the write tool
#[derive(Debug, Clone, Serialize)]
pub struct WriteOutput {
    pub kind: WriteKind,
    /// Path as the model gave it
    pub file_path: String,
    /// Absolute path written
    pub resolved_path: PathBuf,
    pub content: String,
    /// Unified diff against the previous content (updates only)
    pub patch: Vec<String>,
    pub mtime_ms: i64,
}

/// Write tool for creating and overwriting files
#[derive(Debug, Clone, Default)]
pub struct WriteTool;

impl WriteTool {
    pub fn new() -> Self {
        Self
    }
}

/// Write via a temp file in the same directory, then rename over the target
fn write_atomic(path: &Path, content: &str) -> std::io::Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;

    let mut temp = tempfile::NamedTempFile::new_in(dir)?;
    temp.write_all(content.as_bytes())?;
    temp.as_file().sync_all()?;

    // Keep the existing file's permissions on update
    if let Ok(metadata) = std::fs::metadata(path) {
        std::fs::set_permissions(temp.path(), metadata.permissions())?;
    }

    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Refuse an existing file that was never read or changed since it was read
fn check_fresh(
    path: &Path,
    metadata: &std::fs::Metadata,
    ctx: &ToolUseContext,
) -> Result<(), ValidationFailure> {
    let Some(read_at) = ctx.file_timestamps.get(path) else {
        return Err(ValidationFailure::new(NOT_READ_MESSAGE));
    };

    let modified = modified_millis(metadata)
        .map_err(|e| ValidationFailure::new(format!("Failed to stat file: {}", e)))?;
    if modified > read_at {
        tracing::info!(
            "Stale write refused for {}: modified {} > read {}",
            path.display(),
            modified,
            read_at
        );
        return Err(ValidationFailure::new(MODIFIED_MESSAGE));
    }
    Ok(())
}

fn unified_patch(old: &str, new: &str) -> Vec<String> {
    TextDiff::from_lines(old, new)
        .unified_diff()
        .context_radius(DIFF_CONTEXT_LINES)
        .to_string()
        .lines()
        .map(str::to_string)
        .collect()
}

#[async_trait]
impl Tool for WriteTool {
    type Input = WriteInput;
    type Output = WriteOutput;

    fn name(&self) -> &'static str {
        "Write"
    }

    fn description(&self) -> &str {
        "Writes a file to the local filesystem. \
        This will overwrite the existing file if there is one. \
        If this is an existing file, you MUST use the Read tool first to read the file's contents."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "The path to the file to write"
                },
                "content": {
                    "type": "string",
                    "description": "The content to write to the file"
                }
            },
            "required": ["file_path", "content"],
            "additionalProperties": false
        })
    }

    fn is_read_only(&self) -> bool {
        false
    }

    async fn validate_input(
        &self,
        input: &WriteInput,
        ctx: &ToolUseContext,
    ) -> Result<(), ValidationFailure> {
        let path = ctx.resolve_path(&input.file_path);
        let metadata = match tokio::fs::metadata(&path).await {
            Ok(metadata) => metadata,
            // New file
            Err(_) => return Ok(()),
        };

        if metadata.is_dir() {
            return Err(ValidationFailure::new(format!(
                "{} is a directory, not a file.",
                path.display()
            )));
        }

        check_fresh(&path, &metadata, ctx)
    }

    fn needs_permission(&self, input: &WriteInput, ctx: &ToolUseContext) -> bool {
        !ctx.roots.can_write(&ctx.resolve_path(&input.file_path))
    }

    fn permission_subject(&self, input: &WriteInput) -> PermissionSubject {
        PermissionSubject::Path(PathBuf::from(&input.file_path))
    }

    async fn call(
        &self,
        input: WriteInput,
        ctx: &ToolUseContext,
        _progress: &ProgressSink,
    ) -> Result<WriteOutput, ToolError> {
        let path = ctx.resolve_path(&input.file_path);

        let old_content = match tokio::fs::read(&path).await {
            Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        // Last point where cancellation can stop the write
        if ctx.is_cancelled() {
            return Err(ToolError::Interrupted);
        }

        // The file may have changed since validation
        if let Ok(metadata) = tokio::fs::metadata(&path).await {
            check_fresh(&path, &metadata, ctx).map_err(|f| ToolError::failed(f.message))?;
        }

        tracing::info!("Writing file: {}", path.display());
        write_atomic(&path, &input.content)?;
        let mtime_ms = modified_millis(&std::fs::metadata(&path)?)?;

        let (kind, patch) = match old_content {
            Some(old) => (WriteKind::Update, unified_patch(&old, &input.content)),
            None => (WriteKind::Create, Vec::new()),
        };

        Ok(WriteOutput {
            kind,
            file_path: input.file_path,
            resolved_path: path,
            content: input.content,
            patch,
            mtime_ms,
        })
    }

    fn observed_file(&self, output: &WriteOutput) -> Option<(PathBuf, i64)> {
        Some((output.resolved_path.clone(), output.mtime_ms))
    }

    fn render_tool_use(&self, input: &WriteInput, _verbose: bool) -> String {
        input.file_path.clone()
    }

    fn render_rejected(&self, input: &WriteInput, ctx: &ToolUseContext) -> Presentation {
        let action = if ctx.resolve_path(&input.file_path).exists() {
            "update"
        } else {
            "write"
        };
        Presentation::error(format!("User rejected {} to {}", action, input.file_path))
    }

    fn render_for_model(&self, output: &WriteOutput) -> Vec<ContentBlock> {
        match output.kind {
            WriteKind::Create => vec![ContentBlock::text(format!(
                "File created successfully at: {}",
                output.file_path
            ))],
            WriteKind::Update => {
                let lines: Vec<&str> = output.content.lines().collect();
                let shown = lines
                    .iter()
                    .take(MAX_LINES_TO_RENDER_FOR_MODEL)
                    .copied()
                    .collect::<Vec<_>>()
                    .join("\n");
                let mut text = format!(
                    "The file {} has been updated. Here's the result of running `cat -n` on a snippet of the edited file:\n{}",
                    output.file_path,
                    number_lines(&shown, 1)
                );
                if lines.len() > MAX_LINES_TO_RENDER_FOR_MODEL {
                    text.push('\n');
                    text.push_str(TRUNCATION_NOTICE);
                }
                vec![ContentBlock::text(text)]
            }
        }
    }

    fn render_result(&self, output: &WriteOutput, verbose: bool) -> Presentation {
        match output.kind {
            WriteKind::Create => {
                let total = output.content.lines().count();
                let limit = if verbose { total } else { MAX_LINES_TO_RENDER };
                let mut presentation = Presentation::new(format!(
                    "Wrote {} line{} to {}",
                    total,
                    if total == 1 { "" } else { "s" },
                    output.file_path
                ))
                .with_lines(
                    output
                        .content
                        .lines()
                        .take(limit)
                        .map(PresentationLine::plain),
                );
                if total > limit {
                    presentation = presentation.with_line(PresentationLine::dim(format!(
                        "... (+{} lines)",
                        total - limit
                    )));
                }
                presentation
            }
            WriteKind::Update => {
                let added = output
                    .patch
                    .iter()
                    .filter(|l| l.starts_with('+') && !l.starts_with("+++"))
                    .count();
                let removed = output
                    .patch
                    .iter()
                    .filter(|l| l.starts_with('-') && !l.starts_with("---"))
                    .count();
                Presentation::new(format!(
                    "Updated {} with {} addition{} and {} removal{}",
                    output.file_path,
                    added,
                    if added == 1 { "" } else { "s" },
                    removed,
                    if removed == 1 { "" } else { "s" }
                ))
                .with_lines(output.patch.iter().map(|line| {
                    let style = if line.starts_with("@@") {
                        LineStyle::Dim
                    } else if line.starts_with('+') {
                        LineStyle::Added
                    } else if line.starts_with('-') {
                        LineStyle::Removed
                    } else {
                        LineStyle::Plain
                    };
                    PresentationLine::new(line.clone(), style)
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{PermissionRoots, SessionContext};
    use crate::tools::ToolRegistry;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    fn ctx(dir: &Path) -> ToolUseContext {
        SessionContext::new(dir)
            .with_roots(PermissionRoots::new(
                vec![dir.to_path_buf()],
                vec![dir.to_path_buf()],
            ))
            .begin_turn(Arc::new(ToolRegistry::new()))
    }

    fn sink() -> ProgressSink {
        let (tx, _rx) = mpsc::channel(8);
        ProgressSink::new(tx)
    }

    fn input(path: &str, content: &str) -> WriteInput {
        WriteInput {
            file_path: path.to_string(),
            content: content.to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_file() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx(dir.path());
        let tool = WriteTool::new();

        let input = input("nested/new.txt", "hello\n");
        tool.validate_input(&input, &ctx).await.unwrap();
        let output = tool.call(input, &ctx, &sink()).await.unwrap();

        assert_eq!(output.kind, WriteKind::Create);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("nested/new.txt")).unwrap(),
            "hello\n"
        );
        assert_eq!(
            tool.render_for_model(&output)[0].as_text().unwrap(),
            "File created successfully at: nested/new.txt"
        );
    }

    #[tokio::test]
    async fn test_existing_file_must_be_read_first() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "old\n").unwrap();
        let ctx = ctx(dir.path());
        let tool = WriteTool::new();

        let err = tool
            .validate_input(&input("a.txt", "new\n"), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.message, NOT_READ_MESSAGE);
    }

    #[tokio::test]
    async fn test_stale_file_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "old\n").unwrap();
        let ctx = ctx(dir.path());
        let tool = WriteTool::new();

        let mtime = modified_millis(&std::fs::metadata(&path).unwrap()).unwrap();
        ctx.file_timestamps.record(path.clone(), mtime - 1000);

        let err = tool
            .validate_input(&input("a.txt", "new\n"), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.message, MODIFIED_MESSAGE);

        ctx.file_timestamps.record(path, mtime);
        assert!(tool
            .validate_input(&input("a.txt", "new\n"), &ctx)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_update_produces_patch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "one\ntwo\nthree\n").unwrap();
        let ctx = ctx(dir.path());
        let tool = WriteTool::new();
        let mtime = modified_millis(&std::fs::metadata(&path).unwrap()).unwrap();
        ctx.file_timestamps.record(path.clone(), mtime);

        let output = tool
            .call(input("a.txt", "one\n2\nthree\n"), &ctx, &sink())
            .await
            .unwrap();
        assert_eq!(output.kind, WriteKind::Update);
        assert!(output.patch.iter().any(|l| l == "-two"));
        assert!(output.patch.iter().any(|l| l == "+2"));

        let presentation = tool.render_result(&output, false);
        assert!(presentation.headline.contains("1 addition and 1 removal"));

        let text = tool.render_for_model(&output)[0].as_text().unwrap().to_string();
        assert!(text.contains("     2\t2"));
    }

    #[tokio::test]
    async fn test_call_refuses_file_changed_after_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "old\n").unwrap();
        let ctx = ctx(dir.path());
        let tool = WriteTool::new();

        let mtime = modified_millis(&std::fs::metadata(&path).unwrap()).unwrap();
        ctx.file_timestamps.record(path.clone(), mtime);
        tool.validate_input(&input("a.txt", "new\n"), &ctx)
            .await
            .unwrap();

        // Someone else edits the file before the call runs
        std::fs::write(&path, "theirs\n").unwrap();
        let file = std::fs::File::options().write(true).open(&path).unwrap();
        file.set_modified(std::time::SystemTime::now() + std::time::Duration::from_secs(10))
            .unwrap();
        drop(file);

        let result = tool.call(input("a.txt", "new\n"), &ctx, &sink()).await;
        assert!(matches!(result, Err(ToolError::Failed(ref m)) if m == MODIFIED_MESSAGE));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "theirs\n");
    }

    #[test]
    fn test_rejected_update_resolves_against_cwd() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("only-here.txt"), "x").unwrap();
        let ctx = ctx(dir.path());
        let tool = WriteTool::new();

        let presentation = tool.render_rejected(&input("only-here.txt", "y"), &ctx);
        assert_eq!(presentation.headline, "User rejected update to only-here.txt");

        let presentation = tool.render_rejected(&input("missing.txt", "y"), &ctx);
        assert_eq!(presentation.headline, "User rejected write to missing.txt");
    }

    #[tokio::test]
    async fn test_cancelled_write_does_not_touch_file() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx(dir.path());
        ctx.cancel();

        let result = WriteTool::new()
            .call(input("a.txt", "x"), &ctx, &sink())
            .await;
        assert!(matches!(result, Err(ToolError::Interrupted)));
        assert!(!dir.path().join("a.txt").exists());
    }

    #[test]
    fn test_needs_permission_outside_write_roots() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx(dir.path());
        let tool = WriteTool::new();
        assert!(!tool.needs_permission(&input("a.txt", ""), &ctx));
        assert!(tool.needs_permission(&input("/definitely/elsewhere.txt", ""), &ctx));
    }
}
