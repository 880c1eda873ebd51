//! UI-facing permission prompt types

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::classifier::RiskClass;
use super::store::GrantScope;

/// Everything the UI needs to ask the user about one request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionPrompt {
    pub tool_use_id: String,
    pub tool_name: String,
    pub user_facing_name: String,
    /// One-line description of what will happen
    pub summary: String,
    pub risk: RiskClass,
    /// Scope offered for "allow and remember"; `None` hides that option
    pub remember: Option<GrantScope>,
    pub cwd: PathBuf,
}

impl PermissionPrompt {
    /// Labels for the choices the UI should offer, in order
    pub fn options(&self) -> Vec<String> {
        let mut options = vec!["Yes".to_string()];
        if let Some(scope) = &self.remember {
            let label = match scope {
                GrantScope::Tool => format!(
                    "Yes, and don't ask again for {} in {}",
                    self.user_facing_name,
                    self.cwd.display()
                ),
                other => format!(
                    "Yes, and don't ask again for {} in {}",
                    other.describe(),
                    self.cwd.display()
                ),
            };
            options.push(label);
        }
        options.push("No, and tell the model what to do differently".to_string());
        options
    }
}

/// The user's answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PromptAnswer {
    AllowOnce,
    /// Allow and record the offered scope
    AllowAndRemember,
    /// Reject, optionally with a steering message for the model
    Reject { message: Option<String> },
}

/// UI collaborator that asks the user
///
/// The coordinator presents prompts one at a time, in request order.
#[async_trait]
pub trait PermissionPrompter: Send + Sync {
    async fn ask(&self, prompt: PermissionPrompt) -> PromptAnswer;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prompt(remember: Option<GrantScope>) -> PermissionPrompt {
        PermissionPrompt {
            tool_use_id: "toolu_1".into(),
            tool_name: "Bash".into(),
            user_facing_name: "Bash".into(),
            summary: "git commit -m x".into(),
            risk: RiskClass::Safe,
            remember,
            cwd: PathBuf::from("/work"),
        }
    }

    #[test]
    fn test_options_with_remember() {
        let p = prompt(Some(GrantScope::Prefix(vec!["git".into(), "commit".into()])));
        let options = p.options();
        assert_eq!(options.len(), 3);
        assert_eq!(
            options[1],
            "Yes, and don't ask again for `git commit` commands in /work"
        );
    }

    #[test]
    fn test_options_without_remember() {
        let options = prompt(None).options();
        assert_eq!(options.len(), 2);
        assert_eq!(options[0], "Yes");
        assert!(options[1].starts_with("No"));
    }
}
