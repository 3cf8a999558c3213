//! Provisioning state persistence
//!
//! Manages the `.dwhflow/state.json` file which records the identifiers
//! resolved by previous runs (role ARN, cluster endpoint). Stored values are
//! hints: the orchestrator re-verifies them against the control plane before
//! relying on them.

use crate::error::{ProvisionError, Result};
use crate::model::ClusterStatus;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;

const STATE_VERSION: u32 = 1;
const STATE_DIR: &str = ".dwhflow";
const STATE_FILE: &str = "state.json";
const STATE_BACKUP: &str = "state.json.backup";

/// Durable record of resolved identifiers across runs.
///
/// An empty string means "not provisioned".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningState {
    /// State file version
    pub version: u32,

    /// Last modified timestamp
    pub updated_at: DateTime<Utc>,

    #[serde(default)]
    pub cluster_identifier: String,

    #[serde(default)]
    pub role_arn: String,

    #[serde(default)]
    pub endpoint: String,

    #[serde(default)]
    pub port: Option<u16>,

    #[serde(default)]
    pub vpc_id: String,

    #[serde(default)]
    pub security_group_id: String,

    #[serde(default)]
    pub last_status: Option<ClusterStatus>,
}

impl Default for ProvisioningState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            updated_at: Utc::now(),
            cluster_identifier: String::new(),
            role_arn: String::new(),
            endpoint: String::new(),
            port: None,
            vpc_id: String::new(),
            security_group_id: String::new(),
            last_status: None,
        }
    }
}

fn non_empty(value: &str) -> Option<&str> {
    if value.is_empty() { None } else { Some(value) }
}

impl ProvisioningState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn role_arn(&self) -> Option<&str> {
        non_empty(&self.role_arn)
    }

    pub fn endpoint(&self) -> Option<&str> {
        non_empty(&self.endpoint)
    }

    pub fn security_group_id(&self) -> Option<&str> {
        non_empty(&self.security_group_id)
    }

    pub fn vpc_id(&self) -> Option<&str> {
        non_empty(&self.vpc_id)
    }

    pub fn set_role_arn(&mut self, arn: impl Into<String>) {
        self.role_arn = arn.into();
        self.touch();
    }

    pub fn clear_role_arn(&mut self) {
        self.role_arn.clear();
        self.touch();
    }

    pub fn set_endpoint(&mut self, address: impl Into<String>, port: u16) {
        self.endpoint = address.into();
        self.port = Some(port);
        self.touch();
    }

    pub fn clear_endpoint(&mut self) {
        self.endpoint.clear();
        self.port = None;
        self.touch();
    }

    pub fn set_network(&mut self, vpc_id: impl Into<String>, security_group_id: impl Into<String>) {
        self.vpc_id = vpc_id.into();
        self.security_group_id = security_group_id.into();
        self.touch();
    }

    pub fn clear_network(&mut self) {
        self.vpc_id.clear();
        self.security_group_id.clear();
        self.touch();
    }

    pub fn set_status(&mut self, status: ClusterStatus) {
        self.last_status = Some(status);
        self.touch();
    }

    /// Nothing provisioned is recorded
    pub fn is_empty(&self) -> bool {
        self.role_arn.is_empty()
            && self.endpoint.is_empty()
            && self.security_group_id.is_empty()
            && matches!(self.last_status, None | Some(ClusterStatus::Absent))
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Durable key-value store for [`ProvisioningState`]
///
/// Single writer per run; implementations do no locking.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load the state; a store with nothing saved yields the empty state
    async fn load(&self) -> Result<ProvisioningState>;

    async fn save(&self, state: &ProvisioningState) -> Result<()>;
}

/// File-backed state store
pub struct FileStateStore {
    /// Project root directory
    project_root: PathBuf,
}

impl FileStateStore {
    pub fn new(project_root: impl AsRef<Path>) -> Self {
        Self {
            project_root: project_root.as_ref().to_path_buf(),
        }
    }

    /// Get the state directory path
    fn state_dir(&self) -> PathBuf {
        self.project_root.join(STATE_DIR)
    }

    /// Get the state file path
    pub fn state_path(&self) -> PathBuf {
        self.state_dir().join(STATE_FILE)
    }

    /// Get the backup file path
    fn backup_path(&self) -> PathBuf {
        self.state_dir().join(STATE_BACKUP)
    }

    /// Ensure the state directory exists
    async fn ensure_state_dir(&self) -> Result<()> {
        let dir = self.state_dir();
        if !dir.exists() {
            fs::create_dir_all(&dir).await?;
            tracing::debug!("Created state directory: {}", dir.display());
        }
        Ok(())
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn load(&self) -> Result<ProvisioningState> {
        let path = self.state_path();
        if !path.exists() {
            tracing::debug!("State file not found, returning empty state");
            return Ok(ProvisioningState::new());
        }

        let content = fs::read_to_string(&path).await?;
        let state: ProvisioningState = serde_json::from_str(&content)?;

        // Version check
        if state.version > STATE_VERSION {
            return Err(ProvisionError::State(format!(
                "State file version {} is newer than supported version {}",
                state.version, STATE_VERSION
            )));
        }

        tracing::debug!(path = %path.display(), "Loaded provisioning state");
        Ok(state)
    }

    async fn save(&self, state: &ProvisioningState) -> Result<()> {
        self.ensure_state_dir().await?;

        let path = self.state_path();
        let backup = self.backup_path();

        // Create backup if state file exists
        if path.exists() {
            if backup.exists() {
                fs::remove_file(&backup).await?;
            }
            fs::rename(&path, &backup).await?;
            tracing::debug!("Created state backup");
        }

        let content = serde_json::to_string_pretty(state)?;
        fs::write(&path, content).await?;

        tracing::debug!(path = %path.display(), "Saved provisioning state");
        Ok(())
    }
}

/// In-memory state store
#[derive(Default)]
pub struct MemoryStateStore {
    state: Mutex<Option<ProvisioningState>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: ProvisioningState) -> Self {
        Self {
            state: Mutex::new(Some(state)),
        }
    }

    /// Last saved state, if any
    pub async fn snapshot(&self) -> Option<ProvisioningState> {
        self.state.lock().await.clone()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self) -> Result<ProvisioningState> {
        Ok(self.state.lock().await.clone().unwrap_or_default())
    }

    async fn save(&self, state: &ProvisioningState) -> Result<()> {
        *self.state.lock().await = Some(state.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_state_save_load() {
        let temp_dir = tempdir().unwrap();
        let store = FileStateStore::new(temp_dir.path());

        let mut state = ProvisioningState::new();
        state.cluster_identifier = "dwhcluster".to_string();
        state.set_role_arn("arn:aws:iam::123456789012:role/dwhRole");
        state.set_endpoint("dwhcluster.abc123.us-west-2.redshift.amazonaws.com", 5439);
        state.set_status(ClusterStatus::Available);

        store.save(&state).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded, state);
        assert_eq!(loaded.role_arn(), Some("arn:aws:iam::123456789012:role/dwhRole"));
    }

    #[tokio::test]
    async fn test_empty_state() {
        let temp_dir = tempdir().unwrap();
        let store = FileStateStore::new(temp_dir.path());

        let state = store.load().await.unwrap();
        assert!(state.is_empty());
        assert_eq!(state.role_arn(), None);
        assert_eq!(state.endpoint(), None);
    }

    #[tokio::test]
    async fn test_cleared_values_round_trip_as_empty() {
        let temp_dir = tempdir().unwrap();
        let store = FileStateStore::new(temp_dir.path());

        let mut state = ProvisioningState::new();
        state.set_endpoint("dwhcluster.abc123.us-west-2.redshift.amazonaws.com", 5439);
        store.save(&state).await.unwrap();

        state.clear_endpoint();
        store.save(&state).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.endpoint, "");
        assert_eq!(loaded.endpoint(), None);
        assert_eq!(loaded.port, None);
        assert!(temp_dir.path().join(".dwhflow/state.json.backup").exists());
    }

    #[tokio::test]
    async fn test_newer_version_is_rejected() {
        let temp_dir = tempdir().unwrap();
        let store = FileStateStore::new(temp_dir.path());

        let mut state = ProvisioningState::new();
        state.version = STATE_VERSION + 1;
        store.save(&state).await.unwrap();

        let err = store.load().await.unwrap_err();
        assert!(matches!(err, ProvisionError::State(_)));
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryStateStore::new();
        assert!(store.load().await.unwrap().is_empty());

        let mut state = ProvisioningState::new();
        state.set_role_arn("arn:aws:iam::123456789012:role/dwhRole");
        store.save(&state).await.unwrap();

        assert_eq!(store.snapshot().await, Some(state));
    }
}
