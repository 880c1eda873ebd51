//! Per-request and per-turn results

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::{EngineError, EngineResult, RequestState};
use crate::permissions::{PermissionDecision, RiskClass};
use crate::tools::{
    rejection_message, schema_error_message, unknown_tool_message, BuiltinTool, ToolOutput,
    ToolResultBlock, INTERRUPT_MESSAGE,
};

/// One tool use the model asked for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolUseRequest {
    /// Correlation id echoed back in the result block
    pub id: String,
    pub name: String,
    pub input: Value,
}

impl ToolUseRequest {
    pub fn new(id: impl Into<String>, name: impl Into<String>, input: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            input,
        }
    }
}

/// Why a request never ran
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// No enabled tool with this name
    UnknownTool(String),
    /// Input failed schema validation
    Schema(String),
    /// Input failed the tool's semantic check
    Validation(String),
    /// The user said no, optionally telling the model what to do instead
    PermissionDenied { message: Option<String> },
    /// Permission could not be requested at all
    PolicyDenied(String),
}

impl RejectReason {
    /// Text sent to the model
    pub fn model_message(&self) -> String {
        match self {
            RejectReason::UnknownTool(name) => unknown_tool_message(name),
            RejectReason::Schema(message) => schema_error_message(message),
            RejectReason::Validation(message) | RejectReason::PolicyDenied(message) => {
                message.clone()
            }
            RejectReason::PermissionDenied { message } => rejection_message(message.as_deref()),
        }
    }
}

/// Exactly one per request
#[derive(Debug, Clone)]
pub enum ExecutionOutcome {
    Completed(ToolOutput),
    Rejected(RejectReason),
    Failed(String),
    Interrupted,
    /// Cancelled before it started; produces no result block
    NotStarted,
}

impl ExecutionOutcome {
    /// Terminal lifecycle state for this outcome
    pub fn state(&self) -> RequestState {
        match self {
            ExecutionOutcome::Completed(_) => RequestState::Completed,
            ExecutionOutcome::Rejected(RejectReason::PolicyDenied(_)) => RequestState::Denied,
            ExecutionOutcome::Rejected(_) => RequestState::Rejected,
            ExecutionOutcome::Failed(_) => RequestState::Failed,
            ExecutionOutcome::Interrupted => RequestState::Interrupted,
            ExecutionOutcome::NotStarted => RequestState::NotStarted,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, ExecutionOutcome::Completed(_))
    }

    /// Model-facing block, `None` for requests that never started
    pub fn to_result_block(
        &self,
        tool_use_id: &str,
        tool: Option<&BuiltinTool>,
    ) -> EngineResult<Option<ToolResultBlock>> {
        let block = match self {
            ExecutionOutcome::Completed(output) => {
                let tool = tool.ok_or_else(|| {
                    EngineError::invariant(format!(
                        "{} completed without a registered tool",
                        tool_use_id
                    ))
                })?;
                ToolResultBlock::success(tool_use_id, tool.render_for_model(output)?)
            }
            ExecutionOutcome::Rejected(reason) => {
                ToolResultBlock::error(tool_use_id, reason.model_message())
            }
            ExecutionOutcome::Failed(message) => ToolResultBlock::error(tool_use_id, message),
            ExecutionOutcome::Interrupted => ToolResultBlock::error(tool_use_id, INTERRUPT_MESSAGE),
            ExecutionOutcome::NotStarted => return Ok(None),
        };
        Ok(Some(block))
    }
}

/// Everything known about one request once it is terminal
#[derive(Debug, Clone)]
pub struct RequestOutcome {
    pub tool_use_id: String,
    pub tool_name: String,
    pub risk: RiskClass,
    /// Gate decision, if the request got that far
    pub decision: Option<PermissionDecision>,
    pub outcome: ExecutionOutcome,
    pub result: Option<ToolResultBlock>,
}

/// Result of a whole turn
#[derive(Debug, Clone, Default)]
pub struct TurnOutcome {
    /// One entry per request, in request order
    pub outcomes: Vec<RequestOutcome>,
    /// Result blocks for the next model turn, in request order
    pub results: Vec<ToolResultBlock>,
}

impl TurnOutcome {
    pub fn get(&self, tool_use_id: &str) -> Option<&RequestOutcome> {
        self.outcomes.iter().find(|o| o.tool_use_id == tool_use_id)
    }

    pub fn completed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.outcome.is_completed())
            .count()
    }

    /// Requests that were interrupted or never started
    pub fn interrupted(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| {
                matches!(
                    o.outcome,
                    ExecutionOutcome::Interrupted | ExecutionOutcome::NotStarted
                )
            })
            .count()
    }
}
