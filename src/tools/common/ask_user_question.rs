//! AskUserQuestion tool for interactive user queries
//!
//! Posts the questions into the session's custom UI slot and waits for the
//! UI to answer through [`crate::core::CustomUiSlot::respond`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

use super::super::projection::{ContentBlock, Presentation, PresentationLine};
use super::super::tool::{ProgressSink, Tool};
use crate::core::{CustomUiRequest, EngineError, ToolError, ToolUseContext, ValidationFailure};

const MAX_QUESTIONS: usize = 4;
const MIN_OPTIONS: usize = 2;
const MAX_OPTIONS: usize = 4;

/// A single choice for a question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QuestionOption {
    pub label: String,
    pub description: String,
}

/// A single question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserQuestion {
    pub question: String,
    /// Short label, also the key of the answer
    pub header: String,
    pub options: Vec<QuestionOption>,
    #[serde(rename = "multiSelect", default)]
    pub multi_select: bool,
}

/// Input for the AskUserQuestion tool
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AskUserQuestionInput {
    pub questions: Vec<UserQuestion>,
}

/// Answers keyed by question header
#[derive(Debug, Clone, Serialize)]
pub struct AskUserQuestionOutput {
    pub answers: BTreeMap<String, String>,
}

/// AskUserQuestion tool for interacting with users
#[derive(Debug, Clone, Default)]
pub struct AskUserQuestionTool;

impl AskUserQuestionTool {
    pub fn new() -> Self {
        Self
    }
}

fn parse_answers(value: Value) -> Result<BTreeMap<String, String>, ToolError> {
    serde_json::from_value(value)
        .map_err(|e| ToolError::failed(format!("Invalid answer from UI: {}", e)))
}

#[async_trait]
impl Tool for AskUserQuestionTool {
    type Input = AskUserQuestionInput;
    type Output = AskUserQuestionOutput;

    fn name(&self) -> &'static str {
        "AskUserQuestion"
    }

    fn user_facing_name(&self) -> &'static str {
        "Ask user"
    }

    fn description(&self) -> &str {
        "Use this tool to ask the user questions during execution: to gather preferences, \
        clarify ambiguous instructions, or get decisions on implementation choices. \
        If you recommend a specific option, make it the first option and add \"(Recommended)\" \
        at the end of the label."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "questions": {
                    "type": "array",
                    "description": "Questions to ask the user (1-4 questions)",
                    "minItems": 1,
                    "maxItems": MAX_QUESTIONS,
                    "items": {
                        "type": "object",
                        "properties": {
                            "question": {
                                "type": "string",
                                "description": "The complete question to ask the user."
                            },
                            "header": {
                                "type": "string",
                                "description": "Very short label displayed as a chip/tag (max 12 chars)."
                            },
                            "options": {
                                "type": "array",
                                "description": "The available choices for this question. Must have 2-4 options.",
                                "minItems": MIN_OPTIONS,
                                "maxItems": MAX_OPTIONS,
                                "items": {
                                    "type": "object",
                                    "properties": {
                                        "label": { "type": "string" },
                                        "description": { "type": "string" }
                                    },
                                    "required": ["label", "description"],
                                    "additionalProperties": false
                                }
                            },
                            "multiSelect": {
                                "type": "boolean",
                                "default": false
                            }
                        },
                        "required": ["question", "header", "options"],
                        "additionalProperties": false
                    }
                }
            },
            "required": ["questions"],
            "additionalProperties": false
        })
    }

    fn is_read_only(&self) -> bool {
        true
    }

    async fn validate_input(
        &self,
        input: &AskUserQuestionInput,
        _ctx: &ToolUseContext,
    ) -> Result<(), ValidationFailure> {
        if input.questions.is_empty() {
            return Err(ValidationFailure::new("At least one question is required"));
        }
        if input.questions.len() > MAX_QUESTIONS {
            return Err(ValidationFailure::new("Maximum of 4 questions allowed"));
        }

        for (i, q) in input.questions.iter().enumerate() {
            if q.options.len() < MIN_OPTIONS {
                return Err(ValidationFailure::new(format!(
                    "Question {} ('{}') must have at least 2 options",
                    i + 1,
                    q.header
                )));
            }
            if q.options.len() > MAX_OPTIONS {
                return Err(ValidationFailure::new(format!(
                    "Question {} ('{}') can have at most 4 options",
                    i + 1,
                    q.header
                )));
            }
        }
        Ok(())
    }

    fn needs_permission(&self, _input: &AskUserQuestionInput, _ctx: &ToolUseContext) -> bool {
        false
    }

    async fn call(
        &self,
        input: AskUserQuestionInput,
        ctx: &ToolUseContext,
        _progress: &ProgressSink,
    ) -> Result<AskUserQuestionOutput, ToolError> {
        let owner = ctx
            .tool_use_id
            .clone()
            .unwrap_or_else(|| format!("ask_{}", uuid::Uuid::new_v4()));
        let request = CustomUiRequest::new(owner, json!({ "questions": input.questions }));

        let mut lease = ctx.ui_slot.acquire(request, &ctx.cancel).await?;
        tracing::info!("[AskUserQuestion] Waiting for answers ({})", lease.owner());

        let answer = tokio::select! {
            _ = ctx.cancel.cancelled() => return Err(ToolError::Interrupted),
            answer = lease.answer() => answer.map_err(|e| match e {
                EngineError::ChannelClosed => {
                    ToolError::failed("Connection closed before receiving response")
                }
                other => ToolError::from(other),
            })?,
        };

        Ok(AskUserQuestionOutput {
            answers: parse_answers(answer)?,
        })
    }

    fn render_tool_use(&self, input: &AskUserQuestionInput, _verbose: bool) -> String {
        format!("Ask user {} question(s)", input.questions.len())
    }

    fn render_for_model(&self, output: &AskUserQuestionOutput) -> Vec<ContentBlock> {
        let answers = output
            .answers
            .iter()
            .map(|(header, answer)| format!("\"{}\"=\"{}\"", header, answer))
            .collect::<Vec<_>>()
            .join(", ");
        vec![ContentBlock::text(format!(
            "User has answered your questions: {}. You can now continue with the user's answers in mind.",
            answers
        ))]
    }

    fn render_result(&self, output: &AskUserQuestionOutput, _verbose: bool) -> Presentation {
        Presentation::new("User answered").with_lines(
            output
                .answers
                .iter()
                .map(|(header, answer)| PresentationLine::plain(format!("{}: {}", header, answer))),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SessionContext;
    use crate::tools::ToolRegistry;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    fn input() -> AskUserQuestionInput {
        AskUserQuestionTool::new()
            .validate_schema(&json!({
                "questions": [{
                    "question": "Which database?",
                    "header": "Database",
                    "options": [
                        {"label": "Postgres", "description": "Relational"},
                        {"label": "SQLite", "description": "Embedded"}
                    ]
                }]
            }))
            .unwrap()
    }

    #[tokio::test]
    async fn test_validate_option_counts() {
        let tool = AskUserQuestionTool::new();
        let ctx = SessionContext::new("/work").begin_turn(Arc::new(ToolRegistry::new()));

        assert!(tool.validate_input(&input(), &ctx).await.is_ok());

        let mut bad = input();
        bad.questions[0].options.truncate(1);
        let err = tool.validate_input(&bad, &ctx).await.unwrap_err();
        assert!(err.message.contains("at least 2 options"));

        let empty = AskUserQuestionInput { questions: vec![] };
        assert!(tool.validate_input(&empty, &ctx).await.is_err());
    }

    #[tokio::test]
    async fn test_answers_via_ui_slot() {
        let tool = AskUserQuestionTool::new();
        let ctx = SessionContext::new("/work")
            .begin_turn(Arc::new(ToolRegistry::new()))
            .with_tool_use_id("toolu_ask");
        let slot = ctx.ui_slot.clone();
        let mut watcher = slot.subscribe();

        let ui = tokio::spawn(async move {
            loop {
                watcher.changed().await.unwrap();
                let current = watcher.borrow().clone();
                if let Some(request) = current {
                    assert_eq!(request.owner, "toolu_ask");
                    slot.respond(&request.owner, json!({"Database": "SQLite"}))
                        .unwrap();
                    break;
                }
            }
        });

        let (tx, _rx) = mpsc::channel(8);
        let output = tool
            .call(input(), &ctx, &ProgressSink::new(tx))
            .await
            .unwrap();
        ui.await.unwrap();

        assert_eq!(output.answers.get("Database").map(String::as_str), Some("SQLite"));
        assert!(!ctx.ui_slot.is_occupied());
        let text = tool.render_for_model(&output)[0].as_text().unwrap().to_string();
        assert!(text.contains("\"Database\"=\"SQLite\""));
    }

    #[tokio::test]
    async fn test_cancel_releases_slot() {
        let tool = AskUserQuestionTool::new();
        let ctx = SessionContext::new("/work").begin_turn(Arc::new(ToolRegistry::new()));
        let cancel = ctx.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            cancel.cancel();
        });

        let (tx, _rx) = mpsc::channel(8);
        let result = tool.call(input(), &ctx, &ProgressSink::new(tx)).await;
        assert!(matches!(result, Err(ToolError::Interrupted)));
        assert!(!ctx.ui_slot.is_occupied());
    }
}
