//! Shell command risk classification and prefix derivation
//!
//! The classifier decides whether a command is a single simple invocation
//! (`Safe`), chains several commands or redirects (`UnsafeCompound`), or
//! contains substitution syntax that could smuggle in another command
//! (`InjectionSuspected`). Only `Safe` commands may be matched or remembered
//! by prefix.

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Risk classification of a tool input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskClass {
    /// A single command with no shell operators
    Safe,
    /// Chaining, piping, backgrounding or redirection
    UnsafeCompound,
    /// Command or process substitution, or unparseable quoting
    InjectionSuspected,
}

impl RiskClass {
    /// Numeric severity, higher is riskier
    pub fn score(&self) -> u8 {
        match self {
            RiskClass::Safe => 0,
            RiskClass::UnsafeCompound => 1,
            RiskClass::InjectionSuspected => 2,
        }
    }

    pub fn is_safe(&self) -> bool {
        matches!(self, RiskClass::Safe)
    }
}

impl Default for RiskClass {
    fn default() -> Self {
        RiskClass::Safe
    }
}

impl std::fmt::Display for RiskClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            RiskClass::Safe => "safe",
            RiskClass::UnsafeCompound => "compound command",
            RiskClass::InjectionSuspected => "possible command injection",
        };
        write!(f, "{}", label)
    }
}

/// Pluggable shell command classifier
pub trait CommandClassifier: Send + Sync {
    fn classify(&self, command: &str) -> RiskClass;
}

/// Substrings that indicate command or process substitution
const INJECTION_MARKERS: &[&str] = &["$(", "`", "<(", ">(", "${", "\n", "\r"];

/// Default classifier based on tokenizing and pattern checks
///
/// Extra patterns can be added with [`HeuristicClassifier::with_injection_pattern`];
/// a match makes the command `InjectionSuspected`.
#[derive(Debug, Clone, Default)]
pub struct HeuristicClassifier {
    extra_patterns: Vec<Regex>,
}

impl HeuristicClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Treat commands matching `pattern` as suspected injection
    pub fn with_injection_pattern(mut self, pattern: &str) -> Result<Self, regex::Error> {
        self.extra_patterns.push(Regex::new(pattern)?);
        Ok(self)
    }

    fn looks_injected(&self, command: &str) -> bool {
        INJECTION_MARKERS.iter().any(|marker| command.contains(marker))
            || self.extra_patterns.iter().any(|re| re.is_match(command))
    }
}

impl CommandClassifier for HeuristicClassifier {
    fn classify(&self, command: &str) -> RiskClass {
        if self.looks_injected(command) || shlex::split(command).is_none() {
            return RiskClass::InjectionSuspected;
        }
        if has_unquoted_operator(command) {
            return RiskClass::UnsafeCompound;
        }
        RiskClass::Safe
    }
}

/// Scan for `; & | > <` outside single or double quotes
fn has_unquoted_operator(command: &str) -> bool {
    let mut in_single = false;
    let mut in_double = false;
    let mut escaped = false;

    for c in command.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if !in_single => escaped = true,
            '\'' if !in_double => in_single = !in_single,
            '"' if !in_single => in_double = !in_double,
            ';' | '&' | '|' | '>' | '<' if !in_single && !in_double => return true,
            _ => {}
        }
    }
    false
}

/// Commands that never get a reusable prefix
const NO_PREFIX_COMMANDS: &[&str] = &[
    "rm", "rmdir", "sudo", "su", "dd", "mkfs", "chmod", "chown", "kill", "killall", "shutdown",
    "reboot", "curl", "wget", "eval", "exec", "sh", "bash", "zsh", "env", "xargs", "python",
    "python3", "node", "perl", "ruby",
];

/// Commands whose first argument is a subcommand that belongs in the prefix
const SUBCOMMAND_COMMANDS: &[&str] = &[
    "git", "npm", "cargo", "yarn", "pnpm", "docker", "kubectl", "go", "pip", "pip3", "brew",
    "apt", "make", "gh", "rustup", "poetry", "uv",
];

/// Canonical single-space form of a command, used for full-command grants
pub fn normalize_command(command: &str) -> String {
    match shlex::split(command) {
        Some(tokens) if !tokens.is_empty() => tokens.join(" "),
        _ => command.trim().to_string(),
    }
}

/// Leading tokens that identify what a command does
///
/// `git commit -m x` yields `["git", "commit"]`, `ls -la` yields `["ls"]`.
/// Returns `None` for commands that must never be remembered by prefix,
/// such as `rm`, interpreters, privilege escalation and env assignments.
pub fn command_prefix(command: &str) -> Option<Vec<String>> {
    let tokens = shlex::split(command)?;
    let first = tokens.first()?;

    if first.contains('=') || NO_PREFIX_COMMANDS.contains(&first.as_str()) {
        return None;
    }

    if SUBCOMMAND_COMMANDS.contains(&first.as_str()) {
        if let Some(sub) = tokens.get(1).filter(|t| !t.starts_with('-')) {
            return Some(vec![first.clone(), sub.clone()]);
        }
    }

    Some(vec![first.clone()])
}
