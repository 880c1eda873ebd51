//! Two views of every result: compact content for the model, styled lines for the UI

use serde::{Deserialize, Serialize};

/// Text fed back when the user says no
pub const REJECT_MESSAGE: &str = "The user doesn't want to proceed with this tool use. The tool use was rejected (eg. if it was a file edit, the new_string was NOT written to the file). STOP what you are doing and wait for the user to tell you how to proceed.";

/// Prefix for the user's steering message after a rejection
pub const REJECT_MESSAGE_WITH_REASON_PREFIX: &str =
    "The user doesn't want to proceed with this tool use. The tool use was rejected (eg. if it was a file edit, the new_string was NOT written to the file). To tell you how to proceed, the user said:\n";

/// Text fed back when a running tool was cancelled
pub const INTERRUPT_MESSAGE: &str = "[Request interrupted by user for tool use]";

/// Marker appended when content was cut
pub const TRUNCATION_NOTICE: &str = "<response clipped><NOTE>To save on context only part of this file has been shown to you.</NOTE>";

/// A content block the model consumes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    Image { source: ImageSource },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text { text: text.into() }
    }

    pub fn image(media_type: impl Into<String>, data: impl Into<String>) -> Self {
        ContentBlock::Image {
            source: ImageSource {
                source_type: "base64".to_string(),
                media_type: media_type.into(),
                data: data.into(),
            },
        }
    }

    /// Text content, if this is a text block
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentBlock::Text { text } => Some(text),
            ContentBlock::Image { .. } => None,
        }
    }
}

/// Inline image data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSource {
    #[serde(rename = "type")]
    pub source_type: String,
    pub media_type: String,
    pub data: String,
}

/// Result of one tool use, as returned to the model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResultBlock {
    pub tool_use_id: String,
    pub content: Vec<ContentBlock>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

impl ToolResultBlock {
    /// Successful result
    pub fn success(tool_use_id: impl Into<String>, content: Vec<ContentBlock>) -> Self {
        Self {
            tool_use_id: tool_use_id.into(),
            content,
            is_error: false,
        }
    }

    /// Error result with a single text block
    pub fn error(tool_use_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            tool_use_id: tool_use_id.into(),
            content: vec![ContentBlock::text(message)],
            is_error: true,
        }
    }

    /// Concatenated text content
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(ContentBlock::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Style hint for a presentation line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineStyle {
    Plain,
    Added,
    Removed,
    Dim,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresentationLine {
    pub text: String,
    pub style: LineStyle,
}

impl PresentationLine {
    pub fn new(text: impl Into<String>, style: LineStyle) -> Self {
        Self {
            text: text.into(),
            style,
        }
    }

    pub fn plain(text: impl Into<String>) -> Self {
        Self::new(text, LineStyle::Plain)
    }

    pub fn dim(text: impl Into<String>) -> Self {
        Self::new(text, LineStyle::Dim)
    }
}

/// UI rendering of a result: a headline plus styled lines
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Presentation {
    pub headline: String,
    pub lines: Vec<PresentationLine>,
}

impl Presentation {
    pub fn new(headline: impl Into<String>) -> Self {
        Self {
            headline: headline.into(),
            lines: Vec::new(),
        }
    }

    /// Headline-only presentation styled as an error
    pub fn error(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            headline: message.lines().next().unwrap_or_default().to_string(),
            lines: message
                .lines()
                .skip(1)
                .map(|l| PresentationLine::new(l, LineStyle::Error))
                .collect(),
        }
    }

    pub fn with_line(mut self, line: PresentationLine) -> Self {
        self.lines.push(line);
        self
    }

    pub fn with_lines(mut self, lines: impl IntoIterator<Item = PresentationLine>) -> Self {
        self.lines.extend(lines);
        self
    }
}

// ============================================================================
// Model text helpers
// ============================================================================

/// Text for a rejected tool use, with the user's steering message if any
pub fn rejection_message(steering: Option<&str>) -> String {
    match steering.map(str::trim).filter(|m| !m.is_empty()) {
        Some(message) => format!("{}{}", REJECT_MESSAGE_WITH_REASON_PREFIX, message),
        None => REJECT_MESSAGE.to_string(),
    }
}

/// Text for input that failed schema validation
pub fn schema_error_message(message: &str) -> String {
    format!("InputValidationError: {}", message)
}

/// Text for a tool name that is not registered or disabled
pub fn unknown_tool_message(name: &str) -> String {
    format!("Error: No such tool available: {}", name)
}

/// Cut `text` to at most `max_chars` characters, appending a marker if cut
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => {
            let remaining = text[idx..].chars().count();
            format!(
                "{}\n\n... [{} characters truncated] ...",
                &text[..idx],
                remaining
            )
        }
        None => text.to_string(),
    }
}

/// `cat -n` style numbering starting at `start_line`
pub fn number_lines(content: &str, start_line: usize) -> String {
    content
        .lines()
        .enumerate()
        .map(|(i, line)| format!("{:>6}\t{}", start_line + i, line))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_result_success() {
        let result = ToolResultBlock::success("toolu_1", vec![ContentBlock::text("output")]);
        assert_eq!(result.text(), "output");
        assert!(!result.is_error);
    }

    #[test]
    fn test_tool_result_error() {
        let result = ToolResultBlock::error("toolu_1", "error message");
        assert_eq!(result.text(), "error message");
        assert!(result.is_error);
    }

    #[test]
    fn test_rejection_message() {
        assert_eq!(rejection_message(None), REJECT_MESSAGE);
        assert_eq!(rejection_message(Some("  ")), REJECT_MESSAGE);

        let steered = rejection_message(Some("use /tmp instead"));
        assert!(steered.ends_with("the user said:\nuse /tmp instead"));
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("hello", 10), "hello");
        let cut = truncate_chars("hello world", 5);
        assert!(cut.starts_with("hello\n"));
        assert!(cut.contains("[6 characters truncated]"));
        // Multi-byte safe
        let cut = truncate_chars("ééé", 1);
        assert!(cut.starts_with("é\n"));
    }

    #[test]
    fn test_number_lines() {
        assert_eq!(number_lines("a\nb", 9), "     9\ta\n    10\tb");
    }

    #[test]
    fn test_content_block_serialization() {
        let block = ContentBlock::image("image/png", "AAAA");
        let json = serde_json::to_value(&block).unwrap();
        assert_eq!(json["type"], "image");
        assert_eq!(json["source"]["type"], "base64");
        assert_eq!(json["source"]["media_type"], "image/png");
    }

    #[test]
    fn test_presentation_error() {
        let p = Presentation::error("Command failed\nstderr line");
        assert_eq!(p.headline, "Command failed");
        assert_eq!(p.lines[0].style, LineStyle::Error);
    }
}
