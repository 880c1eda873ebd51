//! Allow / Prompt / Deny decisions for a single invocation

use std::sync::Arc;

use super::classifier::{command_prefix, normalize_command, CommandClassifier, HeuristicClassifier, RiskClass};
use super::store::{GrantQuery, GrantScope, PermissionGrant, PermissionStore};
use crate::core::{EngineResult, ToolUseContext};
use crate::tools::{BuiltinTool, PermissionSubject, ToolInput};

/// Why a request was allowed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllowReason {
    /// Session runs with `dangerously_skip_permissions`
    SkipPermissions,
    /// The tool does not need permission for this input
    NotRequired,
    /// A stored grant covers the request
    Granted,
    /// The user said yes to the prompt
    UserApproved,
}

/// Outcome of gating one request
#[derive(Debug, Clone, PartialEq)]
pub enum PermissionDecision {
    Allow {
        grant: Option<PermissionGrant>,
        reason: AllowReason,
    },
    /// Ask the user; `remember` is the scope eligible for "don't ask again"
    Prompt {
        risk: RiskClass,
        remember: Option<GrantScope>,
    },
    Deny { reason: String },
}

impl PermissionDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, PermissionDecision::Allow { .. })
    }
}

/// Decides whether a request may run
pub struct PermissionGate {
    store: Arc<PermissionStore>,
    classifier: Arc<dyn CommandClassifier>,
}

impl PermissionGate {
    pub fn new(store: Arc<PermissionStore>) -> Self {
        Self {
            store,
            classifier: Arc::new(HeuristicClassifier::new()),
        }
    }

    /// Use a different command classifier
    pub fn with_classifier(mut self, classifier: Arc<dyn CommandClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn store(&self) -> &Arc<PermissionStore> {
        &self.store
    }

    /// Risk of an input; non-command tools are always `Safe`
    pub fn assess(&self, tool: &BuiltinTool, input: &ToolInput) -> EngineResult<RiskClass> {
        Ok(match tool.permission_subject(input)? {
            PermissionSubject::Command(command) => self.classifier.classify(&command),
            PermissionSubject::Path(_) | PermissionSubject::Tool => RiskClass::Safe,
        })
    }

    /// Decide for one request
    ///
    /// `can_prompt` is false when no user is available; requests that would
    /// prompt are denied instead. The decision depends only on the input, the
    /// session options and the store, so repeating it without new grants
    /// gives the same answer.
    pub async fn decide(
        &self,
        tool: &BuiltinTool,
        input: &ToolInput,
        risk: RiskClass,
        ctx: &ToolUseContext,
        can_prompt: bool,
    ) -> EngineResult<PermissionDecision> {
        let tool_name = tool.name();

        if ctx.options.dangerously_skip_permissions {
            tracing::warn!(
                "[Gate] Skipping permission check for {} ({:?}): dangerously_skip_permissions is set",
                tool_name,
                ctx.tool_use_id
            );
            return Ok(PermissionDecision::Allow {
                grant: None,
                reason: AllowReason::SkipPermissions,
            });
        }

        if !tool.needs_permission(input, ctx)? {
            tracing::debug!("[Gate] {} does not need permission", tool_name);
            return Ok(PermissionDecision::Allow {
                grant: None,
                reason: AllowReason::NotRequired,
            });
        }

        let subject = tool.permission_subject(input)?;
        let command = match &subject {
            PermissionSubject::Command(command) => Some(command.as_str()),
            _ => None,
        };

        let query = GrantQuery {
            tool_name,
            command,
            risk,
            cwd: &ctx.cwd,
        };
        if let Some(grant) = self.store.lookup(query).await {
            tracing::info!(
                "[Gate] {} allowed by stored grant ({})",
                tool_name,
                grant.scope.describe()
            );
            return Ok(PermissionDecision::Allow {
                grant: Some(grant),
                reason: AllowReason::Granted,
            });
        }

        if !ctx.options.interactive || !can_prompt {
            tracing::info!("[Gate] {} denied: no grant and nobody to ask", tool_name);
            return Ok(PermissionDecision::Deny {
                reason: format!(
                    "Permission to use {} was not granted and cannot be requested in non-interactive mode",
                    tool.user_facing_name()
                ),
            });
        }

        let remember = remember_scope(&subject, risk);
        tracing::info!(
            "[Gate] {} needs approval (risk: {}, remember: {:?})",
            tool_name,
            risk,
            remember
        );
        Ok(PermissionDecision::Prompt { risk, remember })
    }

    /// Record the user's "don't ask again"
    ///
    /// Storage failures are logged and the request still proceeds.
    pub async fn remember(
        &self,
        tool_name: &str,
        scope: GrantScope,
        ctx: &ToolUseContext,
    ) -> Option<PermissionGrant> {
        match self.store.record(tool_name, scope, &ctx.cwd).await {
            Ok(grant) => Some(grant),
            Err(e) => {
                tracing::warn!("[Gate] Failed to persist grant for {}: {}", tool_name, e);
                None
            }
        }
    }
}

impl std::fmt::Debug for PermissionGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionGate")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

/// Scope offered for "allow and remember"
///
/// Commands get their prefix when they have one, otherwise the exact command.
/// Compound or suspicious commands get nothing.
pub fn remember_scope(subject: &PermissionSubject, risk: RiskClass) -> Option<GrantScope> {
    match subject {
        PermissionSubject::Command(command) => {
            if !risk.is_safe() {
                return None;
            }
            match command_prefix(command) {
                Some(prefix) => Some(GrantScope::Prefix(prefix)),
                None => Some(GrantScope::FullCommand(normalize_command(command))),
            }
        }
        PermissionSubject::Path(_) | PermissionSubject::Tool => Some(GrantScope::Tool),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_remember_scope_prefers_prefix() {
        let subject = PermissionSubject::Command("git commit -m x".into());
        assert_eq!(
            remember_scope(&subject, RiskClass::Safe),
            Some(GrantScope::Prefix(vec!["git".into(), "commit".into()]))
        );
    }

    #[test]
    fn test_remember_scope_full_command_without_prefix() {
        let subject = PermissionSubject::Command("rm  -rf /x".into());
        assert_eq!(
            remember_scope(&subject, RiskClass::Safe),
            Some(GrantScope::FullCommand("rm -rf /x".into()))
        );
    }

    #[test]
    fn test_remember_scope_none_for_risky_commands() {
        let subject = PermissionSubject::Command("ls; rm -rf /".into());
        assert_eq!(remember_scope(&subject, RiskClass::UnsafeCompound), None);
        assert_eq!(remember_scope(&subject, RiskClass::InjectionSuspected), None);
    }

    #[test]
    fn test_remember_scope_tool_for_paths() {
        let subject = PermissionSubject::Path(PathBuf::from("/tmp/a.txt"));
        assert_eq!(remember_scope(&subject, RiskClass::Safe), Some(GrantScope::Tool));
    }
}
