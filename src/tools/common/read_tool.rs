//! Read tool for reading files
//!
//! Reads files from the local filesystem with line numbers. Images are
//! returned as base64 image blocks. Every successful read reports the file's
//! mtime so later writes can be checked against it.

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

use super::super::projection::{ContentBlock, Presentation, PresentationLine};
use super::super::tool::{PermissionSubject, ProgressSink, Tool};
use crate::core::{modified_millis, ToolError, ToolUseContext, ValidationFailure};

/// Maximum lines to read by default
const DEFAULT_LINE_LIMIT: usize = 2000;
/// Maximum characters per line before truncation
const MAX_LINE_LENGTH: usize = 2000;
/// Largest text file read without offset/limit
const MAX_FILE_SIZE_BYTES: u64 = 256 * 1024;
/// Largest image returned inline
const MAX_IMAGE_SIZE_BYTES: u64 = 3_750_000;

const IMAGE_EXTENSIONS: &[(&str, &str)] = &[
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("bmp", "image/bmp"),
];

/// Input for the read tool
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReadInput {
    /// Path to the file to read
    pub file_path: String,
    /// The line number to start reading from (1-indexed)
    #[serde(default)]
    pub offset: Option<usize>,
    /// The number of lines to read
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Output of the read tool
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReadOutput {
    Text {
        file_path: PathBuf,
        /// Selected lines, already cut to the line length limit
        content: String,
        start_line: usize,
        num_lines: usize,
        total_lines: usize,
        mtime_ms: i64,
    },
    Image {
        file_path: PathBuf,
        base64: String,
        media_type: String,
        mtime_ms: i64,
    },
}

/// Read tool for reading files
#[derive(Debug, Clone, Default)]
pub struct ReadTool;

impl ReadTool {
    pub fn new() -> Self {
        Self
    }
}

fn image_media_type(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    IMAGE_EXTENSIONS
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, media)| *media)
}

fn clip_line(line: &str) -> String {
    match line.char_indices().nth(MAX_LINE_LENGTH) {
        Some((idx, _)) => format!("{}...", &line[..idx]),
        None => line.to_string(),
    }
}

#[async_trait]
impl Tool for ReadTool {
    type Input = ReadInput;
    type Output = ReadOutput;

    fn name(&self) -> &'static str {
        "Read"
    }

    fn description(&self) -> &str {
        "Reads a file from the local filesystem. \
        By default, reads up to 2000 lines. \
        You can optionally specify offset and limit for long files. \
        Results are returned with line numbers starting at 1. \
        Image files are returned as images."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "The path to the file to read"
                },
                "offset": {
                    "type": "number",
                    "description": "The line number to start reading from (1-indexed). Only provide if the file is too large."
                },
                "limit": {
                    "type": "number",
                    "description": "The number of lines to read. Only provide if the file is too large."
                }
            },
            "required": ["file_path"],
            "additionalProperties": false
        })
    }

    fn is_read_only(&self) -> bool {
        true
    }

    async fn validate_input(
        &self,
        input: &ReadInput,
        ctx: &ToolUseContext,
    ) -> Result<(), ValidationFailure> {
        let path = ctx.resolve_path(&input.file_path);
        let metadata = match tokio::fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(_) => return Err(ValidationFailure::new("File does not exist.")),
        };

        if metadata.is_dir() {
            return Err(ValidationFailure::new(format!(
                "{} is a directory, not a file.",
                path.display()
            )));
        }

        if image_media_type(&path).is_some() {
            if metadata.len() > MAX_IMAGE_SIZE_BYTES {
                return Err(ValidationFailure::new(format!(
                    "Image is too large ({} bytes). Maximum size is {} bytes.",
                    metadata.len(),
                    MAX_IMAGE_SIZE_BYTES
                )));
            }
            return Ok(());
        }

        if metadata.len() > MAX_FILE_SIZE_BYTES && input.offset.is_none() && input.limit.is_none()
        {
            return Err(ValidationFailure::new(format!(
                "File content ({}KB) exceeds maximum allowed size ({}KB). Please use offset and limit parameters to read specific portions of the file.",
                metadata.len() / 1024,
                MAX_FILE_SIZE_BYTES / 1024
            )));
        }

        Ok(())
    }

    fn needs_permission(&self, input: &ReadInput, ctx: &ToolUseContext) -> bool {
        !ctx.roots.can_read(&ctx.resolve_path(&input.file_path))
    }

    fn permission_subject(&self, input: &ReadInput) -> PermissionSubject {
        PermissionSubject::Path(PathBuf::from(&input.file_path))
    }

    async fn call(
        &self,
        input: ReadInput,
        ctx: &ToolUseContext,
        _progress: &ProgressSink,
    ) -> Result<ReadOutput, ToolError> {
        let path = ctx.resolve_path(&input.file_path);
        tracing::info!("Reading file: {}", path.display());

        let metadata = tokio::fs::metadata(&path).await?;
        let mtime_ms = modified_millis(&metadata)?;

        if let Some(media_type) = image_media_type(&path) {
            let bytes = tokio::fs::read(&path).await?;
            return Ok(ReadOutput::Image {
                file_path: path,
                base64: base64::engine::general_purpose::STANDARD.encode(bytes),
                media_type: media_type.to_string(),
                mtime_ms,
            });
        }

        let bytes = tokio::fs::read(&path).await?;
        let text = String::from_utf8_lossy(&bytes);
        let lines: Vec<&str> = text.lines().collect();
        let total_lines = lines.len();

        let start = input.offset.unwrap_or(1).max(1) - 1;
        let count = input.limit.unwrap_or(DEFAULT_LINE_LIMIT);
        let end = start.saturating_add(count).min(total_lines);

        let selected: Vec<String> = if start < total_lines {
            lines[start..end].iter().map(|l| clip_line(l)).collect()
        } else {
            Vec::new()
        };

        tracing::debug!(
            "Read {} of {} lines from {}",
            selected.len(),
            total_lines,
            path.display()
        );

        Ok(ReadOutput::Text {
            file_path: path,
            content: selected.join("\n"),
            start_line: start + 1,
            num_lines: selected.len(),
            total_lines,
            mtime_ms,
        })
    }

    fn observed_file(&self, output: &ReadOutput) -> Option<(PathBuf, i64)> {
        match output {
            ReadOutput::Text {
                file_path, mtime_ms, ..
            }
            | ReadOutput::Image {
                file_path, mtime_ms, ..
            } => Some((file_path.clone(), *mtime_ms)),
        }
    }

    fn render_tool_use(&self, input: &ReadInput, verbose: bool) -> String {
        let mut text = if verbose {
            input.file_path.clone()
        } else {
            Path::new(&input.file_path)
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| input.file_path.clone())
        };
        if let Some(offset) = input.offset {
            text.push_str(&format!(", offset: {}", offset));
        }
        if let Some(limit) = input.limit {
            text.push_str(&format!(", limit: {}", limit));
        }
        text
    }

    fn render_for_model(&self, output: &ReadOutput) -> Vec<ContentBlock> {
        match output {
            ReadOutput::Image {
                base64, media_type, ..
            } => vec![ContentBlock::image(media_type.clone(), base64.clone())],
            ReadOutput::Text {
                content,
                start_line,
                num_lines,
                total_lines,
                ..
            } => {
                if *num_lines == 0 {
                    return vec![ContentBlock::text(if *total_lines == 0 {
                        "<system-reminder>The file exists but is empty.</system-reminder>".to_string()
                    } else {
                        format!(
                            "File has {} lines. Requested offset {} is out of range.",
                            total_lines, start_line
                        )
                    })];
                }

                // split, not lines(): keep a trailing empty line in the numbering
                let mut text = content
                    .split('\n')
                    .enumerate()
                    .map(|(i, line)| format!("{:>6}\t{}", start_line + i, line))
                    .collect::<Vec<_>>()
                    .join("\n");
                let end = start_line + num_lines - 1;
                if end < *total_lines {
                    text.push_str(&format!(
                        "\n\n... ({} more lines, use offset and limit to read more)",
                        total_lines - end
                    ));
                }
                vec![ContentBlock::text(text)]
            }
        }
    }

    fn render_result(&self, output: &ReadOutput, verbose: bool) -> Presentation {
        match output {
            ReadOutput::Image { file_path, .. } => {
                Presentation::new(format!("Read image {}", file_path.display()))
            }
            ReadOutput::Text {
                content, num_lines, ..
            } => {
                let headline = format!(
                    "Read {} line{}",
                    num_lines,
                    if *num_lines == 1 { "" } else { "s" }
                );
                if verbose {
                    Presentation::new(headline)
                        .with_lines(content.lines().map(PresentationLine::plain))
                } else {
                    Presentation::new(headline)
                }
            }
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
    async fn test_read_with_offset_and_limit() {
        let dir = tempfile::tempdir().unwrap();
        let contents: String = (1..=10).map(|i| format!("line {}\n", i)).collect();
        std::fs::write(dir.path().join("a.txt"), contents).unwrap();

        let tool = ReadTool::new();
        let ctx = ctx(dir.path());
        let input = tool
            .validate_schema(&json!({"file_path": "a.txt", "offset": 3, "limit": 2}))
            .unwrap();
        let output = tool.call(input, &ctx, &sink()).await.unwrap();

        let blocks = tool.render_for_model(&output);
        let text = blocks[0].as_text().unwrap();
        assert!(text.starts_with("     3\tline 3\n     4\tline 4"));
        assert!(text.contains("(6 more lines"));

        let (path, mtime) = tool.observed_file(&output).unwrap();
        assert_eq!(path, dir.path().join("a.txt"));
        assert!(mtime > 0);
    }

    #[tokio::test]
    async fn test_validate_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ReadTool::new();
        let input = tool
            .validate_schema(&json!({"file_path": "missing.txt"}))
            .unwrap();
        let err = tool.validate_input(&input, &ctx(dir.path())).await.unwrap_err();
        assert_eq!(err.message, "File does not exist.");
    }

    #[test]
    fn test_schema_rejects_unknown_fields() {
        let tool = ReadTool::new();
        assert!(tool
            .validate_schema(&json!({"file_path": "a", "mode": "fast"}))
            .is_err());
        assert!(tool.validate_schema(&json!({"offset": 1})).is_err());
    }

    #[test]
    fn test_needs_permission_outside_roots() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ReadTool::new();
        let ctx = ctx(dir.path());

        let inside = tool.validate_schema(&json!({"file_path": "a.txt"})).unwrap();
        assert!(!tool.needs_permission(&inside, &ctx));

        let outside = tool
            .validate_schema(&json!({"file_path": "/definitely/elsewhere.txt"}))
            .unwrap();
        assert!(tool.needs_permission(&outside, &ctx));
    }

    #[tokio::test]
    async fn test_read_image() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("pic.png"), [0x89u8, b'P', b'N', b'G']).unwrap();

        let tool = ReadTool::new();
        let input = tool.validate_schema(&json!({"file_path": "pic.png"})).unwrap();
        let output = tool.call(input, &ctx(dir.path()), &sink()).await.unwrap();

        match &tool.render_for_model(&output)[0] {
            ContentBlock::Image { source } => assert_eq!(source.media_type, "image/png"),
            other => panic!("expected image block, got {:?}", other),
        }
    }
}
