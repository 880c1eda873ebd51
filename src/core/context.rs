//! Session and per-turn execution context passed to tools

use std::collections::HashMap;
use std::fmt;
use std::fs::Metadata;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::UNIX_EPOCH;

use tokio_util::sync::CancellationToken;

use super::slot::CustomUiSlot;
use crate::config::EngineConfig;
use crate::tools::ToolRegistry;

// ============================================================================
// Paths and timestamps
// ============================================================================

/// Resolve `path` against `cwd` and normalize it lexically
///
/// `.` and `..` components are collapsed without touching the filesystem, so
/// the result is usable for files that do not exist yet.
pub fn resolve_path(cwd: &Path, path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    };

    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// Modification time in milliseconds since the Unix epoch
pub fn modified_millis(metadata: &Metadata) -> std::io::Result<i64> {
    let modified = metadata.modified()?;
    let millis = modified
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0);
    Ok(millis)
}

/// Last observed modification time per absolute file path
///
/// Owned by the session so it survives between turns. Only the execution
/// coordinator records into it, after a successful read or write.
#[derive(Default)]
pub struct FileTimestamps {
    entries: RwLock<HashMap<PathBuf, i64>>,
}

impl FileTimestamps {
    pub fn new() -> Self {
        Self::default()
    }

    /// Timestamp recorded for `path`, if it was observed in this session
    pub fn get(&self, path: &Path) -> Option<i64> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .copied()
    }

    pub(crate) fn record(&self, path: impl Into<PathBuf>, millis: i64) {
        let path = path.into();
        tracing::debug!("Recording file timestamp {} for {}", millis, path.display());
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path, millis);
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for FileTimestamps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileTimestamps")
            .field("count", &self.len())
            .finish()
    }
}

// ============================================================================
// Filesystem permission roots
// ============================================================================

/// Directories under which file tools may operate without asking
#[derive(Debug, Clone, Default)]
pub struct PermissionRoots {
    read_roots: Vec<PathBuf>,
    write_roots: Vec<PathBuf>,
}

impl PermissionRoots {
    pub fn new(read_roots: Vec<PathBuf>, write_roots: Vec<PathBuf>) -> Self {
        Self {
            read_roots,
            write_roots,
        }
    }

    /// Whether reading `path` (absolute, normalized) is pre-approved
    pub fn can_read(&self, path: &Path) -> bool {
        // Anything writable is readable
        self.read_roots
            .iter()
            .chain(self.write_roots.iter())
            .any(|root| path.starts_with(root))
    }

    /// Whether writing `path` (absolute, normalized) is pre-approved
    pub fn can_write(&self, path: &Path) -> bool {
        self.write_roots.iter().any(|root| path.starts_with(root))
    }

    pub fn read_roots(&self) -> &[PathBuf] {
        &self.read_roots
    }

    pub fn write_roots(&self) -> &[PathBuf] {
        &self.write_roots
    }
}

// ============================================================================
// Session
// ============================================================================

/// Session-wide switches that affect every turn
#[derive(Debug, Clone, Default)]
pub struct ToolUseOptions {
    /// Allow everything without asking (audit-logged)
    pub dangerously_skip_permissions: bool,
    /// Whether a user is present to answer permission prompts
    pub interactive: bool,
    /// Verbose rendering for presentations
    pub verbose: bool,
}

/// State that outlives a single turn
///
/// Holds the working directory, permission roots, the file timestamp map and
/// the custom UI slot. Each turn gets a fresh [`ToolUseContext`] from
/// [`SessionContext::begin_turn`].
#[derive(Clone)]
pub struct SessionContext {
    /// Unique session ID
    pub session_id: String,
    /// Working directory for every tool in this session
    pub cwd: PathBuf,
    /// Session-wide switches
    pub options: ToolUseOptions,
    /// Pre-approved filesystem roots
    pub roots: Arc<PermissionRoots>,
    /// Read/write timestamps, shared by all turns
    pub file_timestamps: Arc<FileTimestamps>,
    /// Interactive takeover slot
    pub ui_slot: CustomUiSlot,
}

impl SessionContext {
    /// Create a session rooted at `cwd`, with `cwd` readable and nothing writable
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        let cwd = cwd.into();
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            roots: Arc::new(PermissionRoots::new(vec![cwd.clone()], Vec::new())),
            cwd,
            options: ToolUseOptions {
                interactive: true,
                ..Default::default()
            },
            file_timestamps: Arc::new(FileTimestamps::new()),
            ui_slot: CustomUiSlot::new(),
        }
    }

    /// Create a session from engine configuration
    pub fn from_config(config: &EngineConfig) -> Self {
        let cwd = config.cwd.clone();
        let resolve_all = |paths: &[PathBuf]| -> Vec<PathBuf> {
            paths.iter().map(|p| resolve_path(&cwd, p)).collect()
        };

        let mut read_roots = resolve_all(&config.read_roots);
        if read_roots.is_empty() {
            read_roots.push(cwd.clone());
        }

        let mut session = Self::new(cwd.clone());
        session.roots = Arc::new(PermissionRoots::new(
            read_roots,
            resolve_all(&config.write_roots),
        ));
        session.options = ToolUseOptions {
            dangerously_skip_permissions: config.dangerously_skip_permissions,
            interactive: config.interactive,
            verbose: config.verbose,
        };
        session
    }

    /// Replace the permission roots
    pub fn with_roots(mut self, roots: PermissionRoots) -> Self {
        self.roots = Arc::new(roots);
        self
    }

    /// Replace the session options
    pub fn with_options(mut self, options: ToolUseOptions) -> Self {
        self.options = options;
        self
    }

    /// Create the context for a new turn with its own cancellation token
    pub fn begin_turn(&self, tools: Arc<ToolRegistry>) -> ToolUseContext {
        ToolUseContext {
            session_id: self.session_id.clone(),
            cwd: self.cwd.clone(),
            options: self.options.clone(),
            roots: self.roots.clone(),
            tools,
            cancel: CancellationToken::new(),
            file_timestamps: self.file_timestamps.clone(),
            ui_slot: self.ui_slot.clone(),
            tool_use_id: None,
        }
    }
}

impl fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionContext")
            .field("session_id", &self.session_id)
            .field("cwd", &self.cwd)
            .field("options", &self.options)
            .field("roots", &self.roots)
            .field("file_timestamps", &self.file_timestamps)
            .finish()
    }
}

// ============================================================================
// ToolUseContext - per-turn execution environment
// ============================================================================

/// Execution environment for one turn
///
/// Cloning is cheap; every clone shares the same cancellation token, timestamp
/// map and UI slot.
#[derive(Clone)]
pub struct ToolUseContext {
    /// Session this turn belongs to
    pub session_id: String,
    /// Working directory
    pub cwd: PathBuf,
    /// Session-wide switches
    pub options: ToolUseOptions,
    /// Pre-approved filesystem roots
    pub roots: Arc<PermissionRoots>,
    /// Tools registered for this session
    pub tools: Arc<ToolRegistry>,
    /// Cancellation signal shared by every request of the turn
    pub cancel: CancellationToken,
    /// Session-owned read/write timestamps
    pub file_timestamps: Arc<FileTimestamps>,
    /// Interactive takeover slot
    pub ui_slot: CustomUiSlot,
    /// Tool use ID being executed (set during tool execution)
    pub tool_use_id: Option<String>,
}

impl ToolUseContext {
    /// Resolve a tool-supplied path against the working directory
    pub fn resolve_path(&self, path: impl AsRef<Path>) -> PathBuf {
        resolve_path(&self.cwd, path)
    }

    /// Create a copy with the current tool_use_id set
    pub fn with_tool_use_id(&self, tool_use_id: impl Into<String>) -> Self {
        let mut ctx = self.clone();
        ctx.tool_use_id = Some(tool_use_id.into());
        ctx
    }

    /// Trigger cancellation for the whole turn
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Check if the turn has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl fmt::Debug for ToolUseContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolUseContext")
            .field("session_id", &self.session_id)
            .field("cwd", &self.cwd)
            .field("options", &self.options)
            .field("tools", &self.tools.tool_names())
            .field("cancelled", &self.cancel.is_cancelled())
            .field("tool_use_id", &self.tool_use_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_path() {
        let cwd = Path::new("/work/project");
        assert_eq!(resolve_path(cwd, "src/main.rs"), PathBuf::from("/work/project/src/main.rs"));
        assert_eq!(resolve_path(cwd, "/etc/hosts"), PathBuf::from("/etc/hosts"));
        assert_eq!(resolve_path(cwd, "../other/./x"), PathBuf::from("/work/other/x"));
    }

    #[test]
    fn test_permission_roots() {
        let roots = PermissionRoots::new(
            vec![PathBuf::from("/work/project")],
            vec![PathBuf::from("/tmp")],
        );
        assert!(roots.can_read(Path::new("/work/project/a.txt")));
        assert!(roots.can_read(Path::new("/tmp/a.txt")));
        assert!(!roots.can_read(Path::new("/etc/passwd")));

        assert!(roots.can_write(Path::new("/tmp/a.txt")));
        assert!(!roots.can_write(Path::new("/work/project/a.txt")));
        // Component-wise, not string prefix
        assert!(!roots.can_write(Path::new("/tmpfoo/a.txt")));
    }

    #[test]
    fn test_file_timestamps() {
        let stamps = FileTimestamps::new();
        assert!(stamps.is_empty());

        stamps.record("/tmp/a.txt", 10);
        stamps.record("/tmp/a.txt", 20);
        assert_eq!(stamps.get(Path::new("/tmp/a.txt")), Some(20));
        assert_eq!(stamps.get(Path::new("/tmp/b.txt")), None);
        assert_eq!(stamps.len(), 1);
    }

    #[test]
    fn test_begin_turn_shares_session_state() {
        let session = SessionContext::new("/work");
        let tools = Arc::new(ToolRegistry::new());
        let turn1 = session.begin_turn(tools.clone());
        let turn2 = session.begin_turn(tools);

        turn1.file_timestamps.record("/work/a", 1);
        assert_eq!(turn2.file_timestamps.get(Path::new("/work/a")), Some(1));

        // Each turn has its own cancellation token
        turn1.cancel();
        assert!(turn1.is_cancelled());
        assert!(!turn2.is_cancelled());
    }

    #[test]
    fn test_with_tool_use_id() {
        let session = SessionContext::new("/work");
        let ctx = session.begin_turn(Arc::new(ToolRegistry::new()));
        let ctx_with_tool = ctx.with_tool_use_id("toolu_789");

        assert!(ctx.tool_use_id.is_none());
        assert_eq!(ctx_with_tool.tool_use_id, Some("toolu_789".into()));
        // Clones share the turn's token
        ctx.cancel();
        assert!(ctx_with_tool.is_cancelled());
    }
}
