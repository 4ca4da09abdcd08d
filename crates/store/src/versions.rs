//! Version history: immutable snapshots of a project.
//!
//! A store never touches a file manager. Restoring returns the snapshot and
//! the caller decides how to apply it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use forgeline_core::error::StoreError;
use forgeline_core::project::ProjectFile;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

pub type VersionId = u64;

/// A snapshot of every project file at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Version {
    pub id: VersionId,
    pub timestamp: DateTime<Utc>,
    pub files: Vec<ProjectFile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_path: Option<String>,
    /// Usually the prompt that produced this version.
    pub message: String,
}

#[async_trait]
pub trait VersionStore: Send + Sync {
    fn name(&self) -> &str;

    /// Store a deep copy of `files` under the next id.
    async fn save_version(
        &self,
        files: &[ProjectFile],
        entry_path: Option<&str>,
        message: &str,
    ) -> Result<Version, StoreError>;

    /// All versions, newest first.
    async fn all_versions(&self) -> Result<Vec<Version>, StoreError>;

    async fn get(&self, id: VersionId) -> Result<Option<Version>, StoreError>;

    async fn delete_version(&self, id: VersionId) -> Result<bool, StoreError>;

    /// The files of a version, if it exists.
    async fn restore(&self, id: VersionId) -> Result<Option<Vec<ProjectFile>>, StoreError> {
        Ok(self.get(id).await?.map(|v| v.files))
    }
}

/// Versions held in a Vec, oldest first.
pub struct InMemoryVersionStore {
    inner: RwLock<Inner>,
}

struct Inner {
    versions: Vec<Version>,
    next_id: VersionId,
}

impl InMemoryVersionStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                versions: Vec::new(),
                next_id: 1,
            }),
        }
    }
}

impl Default for InMemoryVersionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VersionStore for InMemoryVersionStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn save_version(
        &self,
        files: &[ProjectFile],
        entry_path: Option<&str>,
        message: &str,
    ) -> Result<Version, StoreError> {
        let mut inner = self.inner.write().await;
        let version = Version {
            id: inner.next_id,
            timestamp: Utc::now(),
            files: files.to_vec(),
            entry_path: entry_path.map(str::to_string),
            message: message.to_string(),
        };
        // Ids are never reused, even after deletes
        inner.next_id += 1;
        inner.versions.push(version.clone());
        tracing::debug!(id = version.id, files = files.len(), "Version saved");
        Ok(version)
    }

    async fn all_versions(&self) -> Result<Vec<Version>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.versions.iter().rev().cloned().collect())
    }

    async fn get(&self, id: VersionId) -> Result<Option<Version>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.versions.iter().find(|v| v.id == id).cloned())
    }

    async fn delete_version(&self, id: VersionId) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        let len_before = inner.versions.len();
        inner.versions.retain(|v| v.id != id);
        Ok(inner.versions.len() < len_before)
    }
}
