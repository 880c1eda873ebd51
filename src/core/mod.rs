//! Core types for the tool engine
//!
//! - `ToolUseContext` / `SessionContext` - execution environment passed to tools
//! - `RequestState` - lifecycle of a single tool-use request
//! - `EngineEvent` - events streamed to UI subscribers
//! - `CustomUiSlot` - exclusive interactive takeover
//! - `EngineError` and the per-request error types

pub mod context;
pub mod error;
pub mod output;
pub mod slot;
pub mod state;

pub use context::{
    modified_millis, resolve_path, FileTimestamps, PermissionRoots, SessionContext,
    ToolUseContext, ToolUseOptions,
};
pub use error::{EngineError, EngineResult, SchemaError, ToolError, ValidationFailure};
pub use output::EngineEvent;
pub use slot::{CustomUiRequest, CustomUiSlot, SlotLease};
pub use state::RequestState;
