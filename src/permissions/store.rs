//! Persisted permission grants
//!
//! Grants live in two tiers: global (shared by every project) and project.
//! A project grant always wins over a global one. Grants are additive; the
//! store never revokes anything.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tokio::sync::RwLock;

use super::classifier::{command_prefix, normalize_command, RiskClass};
use crate::core::{EngineError, EngineResult};

/// What a grant covers
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum GrantScope {
    /// Every invocation of the tool
    Tool,
    /// Exactly this normalized command
    FullCommand(String),
    /// Any safe command whose derived prefix equals these tokens
    Prefix(Vec<String>),
}

impl GrantScope {
    /// Short label for logs and prompts
    pub fn describe(&self) -> String {
        match self {
            GrantScope::Tool => "any input".to_string(),
            GrantScope::FullCommand(cmd) => format!("`{}`", cmd),
            GrantScope::Prefix(tokens) => format!("`{}` commands", tokens.join(" ")),
        }
    }
}

/// A remembered "yes" from the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PermissionGrant {
    pub tool_name: String,
    pub scope: GrantScope,
    pub cwd: PathBuf,
    pub granted_at: DateTime<Utc>,
}

impl PermissionGrant {
    pub fn new(tool_name: impl Into<String>, scope: GrantScope, cwd: impl Into<PathBuf>) -> Self {
        Self {
            tool_name: tool_name.into(),
            scope,
            cwd: cwd.into(),
            granted_at: Utc::now(),
        }
    }

    fn key(&self) -> (&str, &GrantScope, &Path) {
        (&self.tool_name, &self.scope, &self.cwd)
    }
}

/// Storage tier of a grant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GrantTier {
    Global,
    Project,
}

impl GrantTier {
    const ALL: [GrantTier; 2] = [GrantTier::Global, GrantTier::Project];

    fn index(self) -> usize {
        match self {
            GrantTier::Global => 0,
            GrantTier::Project => 1,
        }
    }
}

/// Backend that persists grants per tier
#[async_trait]
pub trait GrantStorage: Send + Sync {
    async fn load(&self, tier: GrantTier) -> EngineResult<Vec<PermissionGrant>>;
    async fn save(&self, tier: GrantTier, grants: &[PermissionGrant]) -> EngineResult<()>;
}

// ============================================================================
// MemoryGrantStorage
// ============================================================================

/// Non-persistent storage, used for tests and ephemeral sessions
#[derive(Debug, Default)]
pub struct MemoryGrantStorage {
    tiers: Mutex<[Vec<PermissionGrant>; 2]>,
}

impl MemoryGrantStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GrantStorage for MemoryGrantStorage {
    async fn load(&self, tier: GrantTier) -> EngineResult<Vec<PermissionGrant>> {
        let tiers = self.tiers.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(tiers[tier.index()].clone())
    }

    async fn save(&self, tier: GrantTier, grants: &[PermissionGrant]) -> EngineResult<()> {
        let mut tiers = self.tiers.lock().unwrap_or_else(PoisonError::into_inner);
        tiers[tier.index()] = grants.to_vec();
        Ok(())
    }
}

// ============================================================================
// JsonGrantStorage
// ============================================================================

#[derive(Debug, Default, Serialize, Deserialize)]
struct GrantFile {
    grants: Vec<PermissionGrant>,
}

/// One JSON file per tier
///
/// A missing file reads as no grants. Saves go through a temp file in the
/// same directory followed by a rename.
#[derive(Debug, Clone)]
pub struct JsonGrantStorage {
    global_path: PathBuf,
    project_path: PathBuf,
}

impl JsonGrantStorage {
    pub fn new(global_path: impl Into<PathBuf>, project_path: impl Into<PathBuf>) -> Self {
        Self {
            global_path: global_path.into(),
            project_path: project_path.into(),
        }
    }

    /// File backing the given tier
    pub fn path(&self, tier: GrantTier) -> &Path {
        match tier {
            GrantTier::Global => &self.global_path,
            GrantTier::Project => &self.project_path,
        }
    }
}

#[async_trait]
impl GrantStorage for JsonGrantStorage {
    async fn load(&self, tier: GrantTier) -> EngineResult<Vec<PermissionGrant>> {
        let path = self.path(tier);
        let contents = match tokio::fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let file: GrantFile = serde_json::from_str(&contents)
            .map_err(|e| EngineError::Storage(format!("{}: {}", path.display(), e)))?;
        tracing::debug!(
            "Loaded {} {:?} grants from {}",
            file.grants.len(),
            tier,
            path.display()
        );
        Ok(file.grants)
    }

    async fn save(&self, tier: GrantTier, grants: &[PermissionGrant]) -> EngineResult<()> {
        let path = self.path(tier).to_path_buf();
        let json = serde_json::to_string_pretty(&GrantFile {
            grants: grants.to_vec(),
        })?;

        tokio::task::spawn_blocking(move || write_atomic(&path, json.as_bytes()))
            .await
            .map_err(|e| EngineError::Storage(format!("save task failed: {}", e)))?
    }
}

fn write_atomic(path: &Path, contents: &[u8]) -> EngineResult<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;

    let mut temp = tempfile::NamedTempFile::new_in(dir)?;
    temp.write_all(contents)?;
    temp.as_file().sync_all()?;
    temp.persist(path)
        .map_err(|e| EngineError::Storage(format!("{}: {}", path.display(), e.error)))?;
    Ok(())
}

// ============================================================================
// PermissionStore
// ============================================================================

/// What the gate asks the store about
#[derive(Debug, Clone, Copy)]
pub struct GrantQuery<'a> {
    pub tool_name: &'a str,
    /// Shell command, for command-based tools
    pub command: Option<&'a str>,
    /// Risk of `command`; prefix grants only apply to `Safe`
    pub risk: RiskClass,
    pub cwd: &'a Path,
}

/// In-memory view of both tiers over a [`GrantStorage`]
pub struct PermissionStore {
    storage: Box<dyn GrantStorage>,
    tiers: RwLock<[Vec<PermissionGrant>; 2]>,
}

impl PermissionStore {
    /// Load both tiers from `storage`
    pub async fn new(storage: impl GrantStorage + 'static) -> EngineResult<Self> {
        let global = storage.load(GrantTier::Global).await?;
        let project = storage.load(GrantTier::Project).await?;
        tracing::info!(
            "[PermissionStore] Loaded {} global and {} project grants",
            global.len(),
            project.len()
        );
        Ok(Self {
            storage: Box::new(storage),
            tiers: RwLock::new([global, project]),
        })
    }

    /// Empty store backed by memory
    pub fn in_memory() -> Self {
        Self {
            storage: Box::new(MemoryGrantStorage::new()),
            tiers: RwLock::new([Vec::new(), Vec::new()]),
        }
    }

    /// Find the grant that covers `query`, if any
    ///
    /// Project beats global; within a tier a full-command match beats a
    /// prefix match, which beats a whole-tool match.
    pub async fn lookup(&self, query: GrantQuery<'_>) -> Option<PermissionGrant> {
        let tiers = self.tiers.read().await;
        let normalized = query.command.map(normalize_command);
        let prefix = query
            .command
            .filter(|_| query.risk.is_safe())
            .and_then(command_prefix);

        for tier in [GrantTier::Project, GrantTier::Global] {
            let candidates: Vec<&PermissionGrant> = tiers[tier.index()]
                .iter()
                .filter(|g| g.tool_name == query.tool_name && g.cwd == query.cwd)
                .collect();

            let found = match &normalized {
                Some(cmd) => candidates
                    .iter()
                    .find(|g| matches!(&g.scope, GrantScope::FullCommand(c) if c == cmd))
                    .or_else(|| {
                        candidates.iter().find(|g| {
                            matches!((&g.scope, &prefix), (GrantScope::Prefix(p), Some(q)) if p == q)
                        })
                    }),
                None => candidates
                    .iter()
                    .find(|g| matches!(g.scope, GrantScope::Tool)),
            };

            if let Some(grant) = found {
                return Some((*grant).clone());
            }
        }
        None
    }

    /// Remember a grant in the project tier
    pub async fn record(
        &self,
        tool_name: &str,
        scope: GrantScope,
        cwd: &Path,
    ) -> EngineResult<PermissionGrant> {
        self.record_in(GrantTier::Project, tool_name, scope, cwd).await
    }

    /// Remember a grant in a specific tier
    ///
    /// An existing grant with the same tool, scope and cwd is replaced.
    /// The tier is saved before the lock is released so concurrent records
    /// land in order. Nothing changes in memory if the save fails.
    pub async fn record_in(
        &self,
        tier: GrantTier,
        tool_name: &str,
        scope: GrantScope,
        cwd: &Path,
    ) -> EngineResult<PermissionGrant> {
        let grant = PermissionGrant::new(tool_name, scope, cwd);
        let mut tiers = self.tiers.write().await;

        let mut grants: Vec<PermissionGrant> = tiers[tier.index()]
            .iter()
            .filter(|g| g.key() != grant.key())
            .cloned()
            .collect();
        grants.push(grant.clone());
        self.storage.save(tier, &grants).await?;
        tiers[tier.index()] = grants;

        tracing::info!(
            "[PermissionStore] Recorded {:?} grant for {} ({})",
            tier,
            tool_name,
            grant.scope.describe()
        );
        Ok(grant)
    }

    /// Snapshot of all grants in a tier
    pub async fn grants(&self, tier: GrantTier) -> Vec<PermissionGrant> {
        self.tiers.read().await[tier.index()].clone()
    }

    /// Total number of grants across tiers
    pub async fn len(&self) -> usize {
        let tiers = self.tiers.read().await;
        GrantTier::ALL.iter().map(|t| tiers[t.index()].len()).sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl std::fmt::Debug for PermissionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionStore").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query<'a>(command: Option<&'a str>, risk: RiskClass, cwd: &'a Path) -> GrantQuery<'a> {
        GrantQuery {
            tool_name: "Bash",
            command,
            risk,
            cwd,
        }
    }

    fn prefix(tokens: &[&str]) -> GrantScope {
        GrantScope::Prefix(tokens.iter().map(|t| t.to_string()).collect())
    }

    struct ReadOnlyStorage;

    #[async_trait]
    impl GrantStorage for ReadOnlyStorage {
        async fn load(&self, _tier: GrantTier) -> EngineResult<Vec<PermissionGrant>> {
            Ok(Vec::new())
        }

        async fn save(&self, _tier: GrantTier, _grants: &[PermissionGrant]) -> EngineResult<()> {
            Err(EngineError::Storage("read-only".into()))
        }
    }

    #[tokio::test]
    async fn test_failed_save_keeps_grant_out_of_memory() {
        let store = PermissionStore::new(ReadOnlyStorage).await.unwrap();
        let cwd = Path::new("/work");

        assert!(store.record("Bash", prefix(&["ls"]), cwd).await.is_err());
        assert!(store.is_empty().await);
        assert!(store
            .lookup(query(Some("ls -la"), RiskClass::Safe, cwd))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_prefix_matching_is_exact() {
        let store = PermissionStore::in_memory();
        let cwd = Path::new("/work");
        store.record("Bash", prefix(&["git", "commit"]), cwd).await.unwrap();

        let hit = store
            .lookup(query(Some("git commit -m x"), RiskClass::Safe, cwd))
            .await;
        assert!(hit.is_some());

        let miss = store
            .lookup(query(Some("git commit-all"), RiskClass::Safe, cwd))
            .await;
        assert!(miss.is_none());

        // Different cwd
        let miss = store
            .lookup(query(Some("git commit -m x"), RiskClass::Safe, Path::new("/other")))
            .await;
        assert!(miss.is_none());
    }

    #[tokio::test]
    async fn test_prefix_grant_ignored_for_unsafe_commands() {
        let store = PermissionStore::in_memory();
        let cwd = Path::new("/work");
        store.record("Bash", prefix(&["ls"]), cwd).await.unwrap();

        assert!(store
            .lookup(query(Some("ls -la"), RiskClass::Safe, cwd))
            .await
            .is_some());
        assert!(store
            .lookup(query(Some("ls; rm -rf /"), RiskClass::UnsafeCompound, cwd))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_no_prefix_command_never_matches_prefix() {
        let store = PermissionStore::in_memory();
        let cwd = Path::new("/work");
        store.record("Bash", prefix(&["rm"]), cwd).await.unwrap();

        assert!(store
            .lookup(query(Some("rm -rf /x"), RiskClass::Safe, cwd))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_full_command_beats_prefix() {
        let store = PermissionStore::in_memory();
        let cwd = Path::new("/work");
        store.record("Bash", prefix(&["git", "push"]), cwd).await.unwrap();
        store
            .record("Bash", GrantScope::FullCommand("git push origin main".into()), cwd)
            .await
            .unwrap();

        let grant = store
            .lookup(query(Some("git  push origin main"), RiskClass::Safe, cwd))
            .await
            .unwrap();
        assert_eq!(grant.scope, GrantScope::FullCommand("git push origin main".into()));
    }

    #[tokio::test]
    async fn test_project_beats_global() {
        let store = PermissionStore::in_memory();
        let cwd = Path::new("/work");
        store
            .record_in(GrantTier::Global, "Bash", GrantScope::FullCommand("make".into()), cwd)
            .await
            .unwrap();
        store.record("Bash", prefix(&["make"]), cwd).await.unwrap();

        let grant = store
            .lookup(query(Some("make"), RiskClass::Safe, cwd))
            .await
            .unwrap();
        assert_eq!(grant.scope, prefix(&["make"]));
    }

    #[tokio::test]
    async fn test_tool_scope_only_for_commandless_tools() {
        let store = PermissionStore::in_memory();
        let cwd = Path::new("/work");
        store.record("Write", GrantScope::Tool, cwd).await.unwrap();

        let write = GrantQuery {
            tool_name: "Write",
            command: None,
            risk: RiskClass::Safe,
            cwd,
        };
        assert!(store.lookup(write).await.is_some());

        store.record("Bash", GrantScope::Tool, cwd).await.unwrap();
        assert!(store
            .lookup(query(Some("ls"), RiskClass::Safe, cwd))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_record_dedupes() {
        let store = PermissionStore::in_memory();
        let cwd = Path::new("/work");
        store.record("Bash", prefix(&["ls"]), cwd).await.unwrap();
        store.record("Bash", prefix(&["ls"]), cwd).await.unwrap();
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_json_storage_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonGrantStorage::new(
            dir.path().join("global.json"),
            dir.path().join("nested/project.json"),
        );
        let cwd = dir.path().to_path_buf();

        // Missing files load as empty
        let store = PermissionStore::new(storage.clone()).await.unwrap();
        assert!(store.is_empty().await);

        store.record("Bash", prefix(&["cargo", "test"]), &cwd).await.unwrap();
        drop(store);

        let reloaded = PermissionStore::new(storage).await.unwrap();
        let grants = reloaded.grants(GrantTier::Project).await;
        assert_eq!(grants.len(), 1);
        assert_eq!(grants[0].scope, prefix(&["cargo", "test"]));
        assert!(reloaded.grants(GrantTier::Global).await.is_empty());
    }

    #[tokio::test]
    async fn test_json_storage_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let global = dir.path().join("global.json");
        std::fs::write(&global, "not json").unwrap();

        let storage = JsonGrantStorage::new(global, dir.path().join("project.json"));
        let err = PermissionStore::new(storage).await.unwrap_err();
        assert!(matches!(err, EngineError::Storage(_)));
    }
}
