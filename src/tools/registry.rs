//! Tool registry for managing available tools
//!
//! The registry holds the session's tools in registration order. Disabled
//! tools stay registered but are invisible to the model and to lookups.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::builtin::BuiltinTool;
use super::common::{AskUserQuestionTool, BashTool, GlobTool, ReadTool, WriteTool};
use crate::config::EngineConfig;

/// Tool definition sent to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// A tool plus its enable flag
#[derive(Debug, Clone)]
pub struct RegisteredTool {
    pub tool: BuiltinTool,
    pub enabled: bool,
}

/// Registry that holds all available tools
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
}

impl ToolRegistry {
    /// Create a new empty tool registry
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Registry with every built-in tool enabled
    pub fn with_builtins(bash_timeout_ms: u64) -> Self {
        let mut registry = Self::new();
        registry.register(ReadTool::new());
        registry.register(GlobTool::new());
        registry.register(WriteTool::new());
        registry.register(BashTool::with_timeout_ms(bash_timeout_ms));
        registry.register(AskUserQuestionTool::new());
        registry
    }

    /// Built-ins with the config's timeout and disabled tools applied
    pub fn from_config(config: &EngineConfig) -> Self {
        let mut registry = Self::with_builtins(config.bash_timeout_ms);
        for name in &config.disabled_tools {
            if !registry.set_enabled(name, false) {
                tracing::warn!("[ToolRegistry] Cannot disable unknown tool: {}", name);
            }
        }
        registry
    }

    /// Register a tool, replacing any tool with the same name
    pub fn register(&mut self, tool: impl Into<BuiltinTool>) {
        let tool = tool.into();
        let name = tool.name();
        tracing::info!("Registering tool: {}", name);

        let entry = RegisteredTool {
            tool,
            enabled: true,
        };
        match self.tools.iter_mut().find(|r| r.tool.name() == name) {
            Some(existing) => {
                tracing::warn!("[ToolRegistry] Replacing existing tool: {}", name);
                *existing = entry;
            }
            None => self.tools.push(entry),
        }
    }

    /// Enable or disable a tool; returns false if it is not registered
    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> bool {
        match self.tools.iter_mut().find(|r| r.tool.name() == name) {
            Some(entry) => {
                tracing::info!("[ToolRegistry] {} {}", if enabled { "Enabled" } else { "Disabled" }, name);
                entry.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Get an enabled tool by name
    pub fn get(&self, name: &str) -> Option<&BuiltinTool> {
        self.enabled().find(|t| t.name() == name)
    }

    /// Whether a tool is registered and enabled
    pub fn is_enabled(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Definitions of enabled tools, in registration order
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.enabled()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.input_schema(),
            })
            .collect()
    }

    /// Names of enabled tools
    pub fn tool_names(&self) -> Vec<&str> {
        self.enabled().map(|t| t.name()).collect()
    }

    /// Get the number of enabled tools
    pub fn len(&self) -> usize {
        self.enabled().count()
    }

    /// Check if no tool is enabled
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn enabled(&self) -> impl Iterator<Item = &BuiltinTool> {
        self.tools.iter().filter(|r| r.enabled).map(|r| &r.tool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_registry() {
        let registry = ToolRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
        assert!(registry.get("nonexistent").is_none());
    }

    #[test]
    fn test_builtins_in_order() {
        let registry = ToolRegistry::with_builtins(1000);
        assert_eq!(
            registry.tool_names(),
            vec!["Read", "Glob", "Write", "Bash", "AskUserQuestion"]
        );
        let defs = registry.definitions();
        assert_eq!(defs.len(), 5);
        assert_eq!(defs[0].input_schema["required"][0], "file_path");
    }

    #[test]
    fn test_disabled_tools_are_hidden() {
        let mut registry = ToolRegistry::with_builtins(1000);
        assert!(registry.set_enabled("Bash", false));
        assert!(registry.get("Bash").is_none());
        assert!(!registry.definitions().iter().any(|d| d.name == "Bash"));
        assert_eq!(registry.len(), 4);

        assert!(registry.set_enabled("Bash", true));
        assert!(registry.is_enabled("Bash"));
        assert!(!registry.set_enabled("Nope", false));
    }

    #[test]
    fn test_from_config() {
        let config = EngineConfig::new("/work").with_disabled_tool("AskUserQuestion");
        let registry = ToolRegistry::from_config(&config);
        assert!(!registry.is_enabled("AskUserQuestion"));
        assert!(registry.is_enabled("Read"));
    }

    #[test]
    fn test_register_replaces_same_name() {
        let mut registry = ToolRegistry::new();
        registry.register(BashTool::new());
        registry.register(BashTool::with_timeout_ms(5));
        assert_eq!(registry.len(), 1);
    }
}
