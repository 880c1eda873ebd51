//! Engine error types
//!
//! Two families live here:
//! - `EngineError` - infrastructure and turn-fatal errors
//! - `SchemaError` / `ValidationFailure` / `ToolError` - per-request errors that
//!   end up in that request's result slot and never abort the turn

use thiserror::Error;

/// Errors that can occur in the engine itself
#[derive(Error, Debug)]
pub enum EngineError {
    /// A core invariant was broken. Aborts the turn.
    #[error("Invariant violated: {0}")]
    InvariantViolation(String),

    /// Channel closed unexpectedly
    #[error("Channel closed")]
    ChannelClosed,

    /// The custom UI slot already has an occupant
    #[error("Custom UI slot is occupied by {0}")]
    SlotOccupied(String),

    /// The turn was cancelled while waiting
    #[error("Interrupted")]
    Interrupted,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Grant persistence failed
    #[error("Grant storage error: {0}")]
    Storage(String),
}

impl EngineError {
    /// Create an invariant violation
    pub fn invariant(msg: impl Into<String>) -> Self {
        EngineError::InvariantViolation(msg.into())
    }

    /// Whether this error must abort the whole turn
    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::InvariantViolation(_))
    }
}

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Structurally invalid tool input (wrong types, missing or unknown fields)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct SchemaError {
    pub message: String,
}

impl SchemaError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for SchemaError {
    fn from(err: serde_json::Error) -> Self {
        SchemaError::new(err.to_string())
    }
}

/// Well-formed input that fails a semantic precondition
///
/// The message is shown to the model so it can correct itself.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ValidationFailure {
    pub message: String,
}

impl ValidationFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Failure raised by a tool while it runs
#[derive(Error, Debug)]
pub enum ToolError {
    /// The tool's own operation failed (nonzero exit, timeout, ...)
    #[error("{0}")]
    Failed(String),

    /// The tool observed the turn's cancellation token
    #[error("Interrupted")]
    Interrupted,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ToolError {
    pub fn failed(msg: impl Into<String>) -> Self {
        ToolError::Failed(msg.into())
    }
}

impl From<EngineError> for ToolError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Interrupted => ToolError::Interrupted,
            EngineError::Io(e) => ToolError::Io(e),
            other => ToolError::Failed(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EngineError::invariant("two mutating tools running");
        assert_eq!(err.to_string(), "Invariant violated: two mutating tools running");
        assert!(err.is_fatal());

        let err = EngineError::ChannelClosed;
        assert_eq!(err.to_string(), "Channel closed");
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let engine_err: EngineError = io_err.into();
        assert!(matches!(engine_err, EngineError::Io(_)));
    }

    #[test]
    fn test_schema_error_from_serde() {
        let err = serde_json::from_str::<u32>("\"x\"").unwrap_err();
        let schema: SchemaError = err.into();
        assert!(schema.message.contains("invalid type"));
    }

    #[test]
    fn test_tool_error_from_engine_error() {
        assert!(matches!(
            ToolError::from(EngineError::Interrupted),
            ToolError::Interrupted
        ));
        assert!(matches!(
            ToolError::from(EngineError::ChannelClosed),
            ToolError::Failed(_)
        ));
    }
}
