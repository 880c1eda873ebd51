//! Events streamed from the engine to UI subscribers

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::state::RequestState;
use crate::permissions::RiskClass;
use crate::tools::Presentation;

/// Events broadcast by the execution coordinator while a turn runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EngineEvent {
    /// A request from the model was accepted into the turn
    ToolQueued {
        /// Tool use ID
        id: String,
        /// Tool name
        name: String,
    },

    /// A request moved to a new lifecycle state
    StateChange {
        /// Tool use ID
        id: String,
        /// New state
        state: RequestState,
    },

    /// The engine is waiting for the user to answer a permission prompt
    PermissionRequested {
        /// Tool use ID
        id: String,
        /// User-facing tool name
        tool_name: String,
        /// One-line description of what the tool will do
        summary: String,
        /// Risk classification of the input
        risk: RiskClass,
    },

    /// Tool execution starting
    ToolStart {
        /// Tool use ID
        id: String,
        /// Tool name
        name: String,
        /// Validated tool input
        input: Value,
    },

    /// Incremental tool output (for long-running tools)
    ToolProgress {
        /// Tool use ID
        id: String,
        /// Progress output
        content: String,
    },

    /// Tool reached a terminal state
    ToolEnd {
        /// Tool use ID
        id: String,
        /// Terminal state
        state: RequestState,
        /// Human-oriented rendering of the outcome
        presentation: Presentation,
    },

    /// All requests of the turn reached a terminal state
    TurnComplete {
        /// Number of requests that completed
        completed: usize,
        /// Number of requests that were interrupted or never started
        interrupted: usize,
    },
}

impl EngineEvent {
    /// Create a tool progress event
    pub fn progress(id: impl Into<String>, content: impl Into<String>) -> Self {
        EngineEvent::ToolProgress {
            id: id.into(),
            content: content.into(),
        }
    }

    /// Create a state change event
    pub fn state_change(id: impl Into<String>, state: RequestState) -> Self {
        EngineEvent::StateChange {
            id: id.into(),
            state,
        }
    }

    /// Tool use ID this event belongs to, if any
    pub fn tool_use_id(&self) -> Option<&str> {
        match self {
            EngineEvent::ToolQueued { id, .. }
            | EngineEvent::StateChange { id, .. }
            | EngineEvent::PermissionRequested { id, .. }
            | EngineEvent::ToolStart { id, .. }
            | EngineEvent::ToolProgress { id, .. }
            | EngineEvent::ToolEnd { id, .. } => Some(id),
            EngineEvent::TurnComplete { .. } => None,
        }
    }

    /// Check if this is the last event of a turn
    pub fn is_terminal(&self) -> bool {
        matches!(self, EngineEvent::TurnComplete { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_ids() {
        let event = EngineEvent::progress("toolu_1", "line");
        assert_eq!(event.tool_use_id(), Some("toolu_1"));
        assert!(!event.is_terminal());

        let done = EngineEvent::TurnComplete {
            completed: 1,
            interrupted: 0,
        };
        assert_eq!(done.tool_use_id(), None);
        assert!(done.is_terminal());
    }
}
