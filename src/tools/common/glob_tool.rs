//! Glob tool for file pattern matching
//!
//! Returns matching file paths, most recently modified first, capped at
//! [`MAX_RESULTS`].

use async_trait::async_trait;
use glob::glob;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::time::{Instant, SystemTime};

use super::super::projection::{ContentBlock, Presentation, PresentationLine};
use super::super::tool::{PermissionSubject, ProgressSink, Tool};
use crate::core::{ToolError, ToolUseContext, ValidationFailure};

/// Maximum number of paths returned
pub const MAX_RESULTS: usize = 100;

/// Input for the glob tool
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GlobInput {
    /// The glob pattern to match files against
    pub pattern: String,
    /// The directory to search in (defaults to cwd)
    #[serde(default)]
    pub path: Option<String>,
}

/// Output of the glob tool
#[derive(Debug, Clone, Serialize)]
pub struct GlobOutput {
    pub filenames: Vec<String>,
    pub num_files: usize,
    pub truncated: bool,
    pub duration_ms: u128,
}

/// Glob tool for file pattern matching
#[derive(Debug, Clone, Default)]
pub struct GlobTool;

impl GlobTool {
    pub fn new() -> Self {
        Self
    }

    fn search_root(&self, input: &GlobInput, ctx: &ToolUseContext) -> PathBuf {
        match &input.path {
            Some(path) => ctx.resolve_path(path),
            None => ctx.cwd.clone(),
        }
    }
}

#[async_trait]
impl Tool for GlobTool {
    type Input = GlobInput;
    type Output = GlobOutput;

    fn name(&self) -> &'static str {
        "Glob"
    }

    fn description(&self) -> &str {
        "Fast file pattern matching tool that works with any codebase size. \
        Supports glob patterns like \"**/*.js\" or \"src/**/*.ts\". \
        Returns matching file paths sorted by modification time."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "The glob pattern to match files against"
                },
                "path": {
                    "type": "string",
                    "description": "The directory to search in. If not specified, the current working directory will be used."
                }
            },
            "required": ["pattern"],
            "additionalProperties": false
        })
    }

    fn is_read_only(&self) -> bool {
        true
    }

    async fn validate_input(
        &self,
        input: &GlobInput,
        ctx: &ToolUseContext,
    ) -> Result<(), ValidationFailure> {
        glob::Pattern::new(&input.pattern)
            .map_err(|e| ValidationFailure::new(format!("Invalid glob pattern: {}", e)))?;

        let root = self.search_root(input, ctx);
        if !root.is_dir() {
            return Err(ValidationFailure::new(format!(
                "Directory does not exist: {}",
                root.display()
            )));
        }
        Ok(())
    }

    fn needs_permission(&self, input: &GlobInput, ctx: &ToolUseContext) -> bool {
        !ctx.roots.can_read(&self.search_root(input, ctx))
    }

    fn permission_subject(&self, input: &GlobInput) -> PermissionSubject {
        match &input.path {
            Some(path) => PermissionSubject::Path(PathBuf::from(path)),
            None => PermissionSubject::Tool,
        }
    }

    async fn call(
        &self,
        input: GlobInput,
        ctx: &ToolUseContext,
        _progress: &ProgressSink,
    ) -> Result<GlobOutput, ToolError> {
        let started = Instant::now();
        let root = self.search_root(&input, ctx);

        let full_pattern = if Path::new(&input.pattern).is_absolute() {
            input.pattern.clone()
        } else {
            root.join(&input.pattern).to_string_lossy().to_string()
        };
        tracing::info!("Searching with glob pattern: {}", full_pattern);

        let paths = glob(&full_pattern)
            .map_err(|e| ToolError::failed(format!("Invalid glob pattern: {}", e)))?;

        let mut entries: Vec<(String, SystemTime)> = Vec::new();
        for entry in paths {
            if ctx.is_cancelled() {
                return Err(ToolError::Interrupted);
            }
            let Ok(path) = entry else { continue };
            let Some(mtime) = path.metadata().ok().and_then(|m| m.modified().ok()) else {
                continue;
            };
            if path.is_dir() {
                continue;
            }
            let display_path = path
                .strip_prefix(&ctx.cwd)
                .map(|p| p.to_string_lossy().to_string())
                .unwrap_or_else(|_| path.to_string_lossy().to_string());
            entries.push((display_path, mtime));

            if entries.len() % 256 == 0 {
                tokio::task::yield_now().await;
            }
        }

        // Sort by modification time (most recent first), then name for stability
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        let truncated = entries.len() > MAX_RESULTS;
        let filenames: Vec<String> = entries
            .into_iter()
            .take(MAX_RESULTS)
            .map(|(path, _)| path)
            .collect();

        Ok(GlobOutput {
            num_files: filenames.len(),
            filenames,
            truncated,
            duration_ms: started.elapsed().as_millis(),
        })
    }

    fn render_tool_use(&self, input: &GlobInput, _verbose: bool) -> String {
        match &input.path {
            Some(path) => format!("pattern: \"{}\", path: \"{}\"", input.pattern, path),
            None => format!("pattern: \"{}\"", input.pattern),
        }
    }

    fn render_for_model(&self, output: &GlobOutput) -> Vec<ContentBlock> {
        if output.filenames.is_empty() {
            return vec![ContentBlock::text("No files found")];
        }
        let mut text = output.filenames.join("\n");
        if output.truncated {
            text.push_str(
                "\n(Results are truncated. Consider using a more specific path or pattern.)",
            );
        }
        vec![ContentBlock::text(text)]
    }

    fn render_result(&self, output: &GlobOutput, verbose: bool) -> Presentation {
        let presentation = Presentation::new(format!(
            "Found {} file{}",
            output.num_files,
            if output.num_files == 1 { "" } else { "s" }
        ));
        if verbose {
            presentation.with_lines(output.filenames.iter().map(PresentationLine::plain))
        } else {
            presentation
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SessionContext;
    use crate::tools::ToolRegistry;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    fn ctx(dir: &Path) -> ToolUseContext {
        SessionContext::new(dir).begin_turn(Arc::new(ToolRegistry::new()))
    }

    fn sink() -> ProgressSink {
        let (tx, _rx) = mpsc::channel(8);
        ProgressSink::new(tx)
    }

    #[tokio::test]
    async fn test_glob_finds_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/a.rs"), "").unwrap();
        std::fs::write(dir.path().join("src/b.rs"), "").unwrap();
        std::fs::write(dir.path().join("README.md"), "").unwrap();

        let tool = GlobTool::new();
        let input = tool.validate_schema(&json!({"pattern": "**/*.rs"})).unwrap();
        let output = tool.call(input, &ctx(dir.path()), &sink()).await.unwrap();

        assert_eq!(output.num_files, 2);
        assert!(output.filenames.contains(&"src/a.rs".to_string()));
        assert!(!output.truncated);
        assert_eq!(tool.render_result(&output, false).headline, "Found 2 files");
    }

    #[tokio::test]
    async fn test_glob_no_matches() {
        let dir = tempfile::tempdir().unwrap();
        let tool = GlobTool::new();
        let input = tool.validate_schema(&json!({"pattern": "*.zig"})).unwrap();
        let output = tool.call(input, &ctx(dir.path()), &sink()).await.unwrap();
        assert_eq!(
            tool.render_for_model(&output)[0].as_text(),
            Some("No files found")
        );
    }

    #[tokio::test]
    async fn test_glob_truncates() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..(MAX_RESULTS + 5) {
            std::fs::write(dir.path().join(format!("f{}.txt", i)), "").unwrap();
        }
        let tool = GlobTool::new();
        let input = tool.validate_schema(&json!({"pattern": "*.txt"})).unwrap();
        let output = tool.call(input, &ctx(dir.path()), &sink()).await.unwrap();

        assert_eq!(output.num_files, MAX_RESULTS);
        assert!(output.truncated);
        let text = tool.render_for_model(&output)[0].as_text().unwrap().to_string();
        assert!(text.contains("Results are truncated"));
    }

    #[tokio::test]
    async fn test_glob_observes_cancellation() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "").unwrap();
        let ctx = ctx(dir.path());
        ctx.cancel();

        let tool = GlobTool::new();
        let input = tool.validate_schema(&json!({"pattern": "*.txt"})).unwrap();
        let result = tool.call(input, &ctx, &sink()).await;
        assert!(matches!(result, Err(ToolError::Interrupted)));
    }
}
