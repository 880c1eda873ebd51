//! Engine configuration
//!
//! Loaded from a JSON file or built in code with the `with_*` methods:
//!
//! ```ignore
//! let config = EngineConfig::new("/work/project")
//!     .with_write_root("/work/project/out")
//!     .with_bash_timeout_ms(30_000)
//!     .with_interactive(true);
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::core::{EngineError, EngineResult};
use crate::runtime::channels::{EVENT_CHANNEL_SIZE, PROGRESS_CHANNEL_SIZE};
use crate::tools::common::bash::DEFAULT_TIMEOUT_MS;

/// Environment variable pointing at a JSON config file
pub const CONFIG_PATH_ENV: &str = "SHADOW_TOOLS_CONFIG";

/// Environment variable that turns on `dangerously_skip_permissions`
pub const SKIP_PERMISSIONS_ENV: &str = "SHADOW_SKIP_PERMISSIONS";

/// Logging setup used by [`crate::logging::init_logging`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub filter: String,
    /// Emit JSON lines instead of human-readable text
    pub json: bool,
    /// Directory for a daily rolling log file; stderr only when unset
    pub directory: Option<PathBuf>,
    /// File name prefix for the rolling log
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "shadow_tool_engine=info".to_string(),
            json: false,
            directory: None,
            file_prefix: "shadow-tools.log".to_string(),
        }
    }
}

/// Configuration for a tool engine session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Working directory for all tools
    pub cwd: PathBuf,

    /// Allow every request without asking. Each bypass is logged.
    pub dangerously_skip_permissions: bool,

    /// Whether a user is available to answer permission prompts
    pub interactive: bool,

    /// Verbose presentations
    pub verbose: bool,

    /// Roots readable without permission (default: cwd)
    pub read_roots: Vec<PathBuf>,

    /// Roots writable without permission (default: none)
    pub write_roots: Vec<PathBuf>,

    /// Tools registered but disabled for this session
    pub disabled_tools: Vec<String>,

    /// Default timeout for shell commands
    pub bash_timeout_ms: u64,

    /// Capacity of the engine event broadcast channel
    pub event_channel_size: usize,

    /// Capacity of each tool's progress channel
    pub progress_channel_size: usize,

    /// Global grant file; in-memory when unset
    pub global_grants_path: Option<PathBuf>,

    /// Project grant file; in-memory when unset
    pub project_grants_path: Option<PathBuf>,

    /// Logging setup
    pub logging: LoggingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            dangerously_skip_permissions: false,
            interactive: true,
            verbose: false,
            read_roots: Vec::new(),
            write_roots: Vec::new(),
            disabled_tools: Vec::new(),
            bash_timeout_ms: DEFAULT_TIMEOUT_MS,
            event_channel_size: EVENT_CHANNEL_SIZE,
            progress_channel_size: PROGRESS_CHANNEL_SIZE,
            global_grants_path: None,
            project_grants_path: None,
            logging: LoggingConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Create a configuration rooted at `cwd`
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: cwd.into(),
            ..Default::default()
        }
    }

    /// Load a configuration from a JSON file
    pub fn load(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let config: EngineConfig = serde_json::from_str(&contents).map_err(|e| {
            EngineError::InvalidConfig(format!("{}: {}", path.display(), e))
        })?;
        config.validate()?;
        tracing::debug!("Loaded engine config from {}", path.display());
        Ok(config)
    }

    /// Build a configuration from the environment
    ///
    /// Reads the file named by `SHADOW_TOOLS_CONFIG` if set, then applies
    /// `SHADOW_SKIP_PERMISSIONS`.
    pub fn from_env() -> EngineResult<Self> {
        let mut config = match std::env::var_os(CONFIG_PATH_ENV) {
            Some(path) => Self::load(PathBuf::from(path))?,
            None => Self::default(),
        };

        if let Ok(value) = std::env::var(SKIP_PERMISSIONS_ENV) {
            config.dangerously_skip_permissions = parse_flag(&value);
        }

        config.validate()?;
        Ok(config)
    }

    /// Check values that serde cannot
    pub fn validate(&self) -> EngineResult<()> {
        if self.event_channel_size == 0 {
            return Err(EngineError::InvalidConfig(
                "event_channel_size must be greater than zero".into(),
            ));
        }
        if self.progress_channel_size == 0 {
            return Err(EngineError::InvalidConfig(
                "progress_channel_size must be greater than zero".into(),
            ));
        }
        if self.bash_timeout_ms == 0 {
            return Err(EngineError::InvalidConfig(
                "bash_timeout_ms must be greater than zero".into(),
            ));
        }
        if self.global_grants_path.is_some() != self.project_grants_path.is_some() {
            return Err(EngineError::InvalidConfig(
                "global_grants_path and project_grants_path must be set together".into(),
            ));
        }
        Ok(())
    }

    pub fn with_skip_permissions(mut self, skip: bool) -> Self {
        self.dangerously_skip_permissions = skip;
        self
    }

    pub fn with_interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }

    pub fn with_read_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.read_roots.push(root.into());
        self
    }

    pub fn with_write_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.write_roots.push(root.into());
        self
    }

    /// Disable a tool by name
    pub fn with_disabled_tool(mut self, name: impl Into<String>) -> Self {
        self.disabled_tools.push(name.into());
        self
    }

    pub fn with_bash_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.bash_timeout_ms = timeout_ms;
        self
    }

    /// Persist grants to the given files
    pub fn with_grant_files(
        mut self,
        global: impl Into<PathBuf>,
        project: impl Into<PathBuf>,
    ) -> Self {
        self.global_grants_path = Some(global.into());
        self.project_grants_path = Some(project.into());
        self
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
