//! Permission system for tool execution
//!
//! - `classifier` - shell command risk classes and prefix derivation
//! - `store` - grants persisted in two tiers (global, project; project wins)
//! - `gate` - Allow / Prompt / Deny for one invocation
//! - `prompt` - what the UI is asked and how it answers
//!
//! ## Example
//!
//! ```rust,ignore
//! use shadow_tool_engine::permissions::{PermissionGate, PermissionStore};
//! use std::sync::Arc;
//!
//! let store = Arc::new(PermissionStore::in_memory());
//! let gate = PermissionGate::new(store);
//!
//! let risk = gate.assess(&tool, &input)?;
//! match gate.decide(&tool, &input, risk, &ctx, true).await? {
//!     PermissionDecision::Allow { .. } => { /* execute */ }
//!     PermissionDecision::Prompt { remember, .. } => { /* ask the user */ }
//!     PermissionDecision::Deny { reason } => { /* reject */ }
//! }
//! ```

mod classifier;
mod gate;
mod prompt;
mod store;

pub use classifier::{
    command_prefix, normalize_command, CommandClassifier, HeuristicClassifier, RiskClass,
};
pub use gate::{remember_scope, AllowReason, PermissionDecision, PermissionGate};
pub use prompt::{PermissionPrompt, PermissionPrompter, PromptAnswer};
pub use store::{
    GrantQuery, GrantScope, GrantStorage, GrantTier, JsonGrantStorage, MemoryGrantStorage,
    PermissionGrant, PermissionStore,
};
