use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::config::RemoteConfig;

/// Opaque version token issued by a remote.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VersionId(String);

impl VersionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VersionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// One version of the database object as listed by a remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObjectRecord {
    pub key: String,
    pub version_id: VersionId,
    pub last_modified: DateTime<Utc>,
    /// Backends without a "latest" marker report `false` for every version.
    pub is_latest: bool,
}

/// Backend-neutral failure of a store operation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Network, auth or service failure.
    #[error("{0}")]
    Unavailable(String),
    /// The object or version does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    #[error("{0}")]
    Other(String),
}

/// Pick the version flagged latest, falling back to the newest `last_modified`.
///
/// Several records flagged latest can only come from a broken listing; the
/// newest of them wins. Remaining ties go to the greatest version id.
pub fn select_latest(records: &[RemoteObjectRecord]) -> Option<&RemoteObjectRecord> {
    let newest = |a: &&RemoteObjectRecord, b: &&RemoteObjectRecord| {
        a.last_modified
            .cmp(&b.last_modified)
            .then_with(|| a.version_id.cmp(&b.version_id))
    };
    records
        .iter()
        .filter(|r| r.is_latest)
        .max_by(newest)
        .or_else(|| records.iter().max_by(newest))
}

/// Versioned object store bound to a single database key.
///
/// Existing versions are never overwritten: every `persist_version` creates a
/// new version. Implementations must not retry internally.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Object key the store is bound to.
    fn key(&self) -> &str;

    /// Display location, e.g. `s3://bucket/key`.
    fn location(&self) -> String;

    /// All versions of the key. Read-only.
    async fn list_versions(&self) -> Result<Vec<RemoteObjectRecord>, StoreError>;

    /// Upload `data` as a new version.
    async fn persist_version(&self, data: Vec<u8>) -> Result<VersionId, StoreError>;

    /// Fetch the full content of one version.
    async fn get_version(&self, version: &VersionId) -> Result<Vec<u8>, StoreError>;

    /// Version id of the latest version.
    async fn get_last_version(&self) -> Result<VersionId, StoreError> {
        let records = self.list_versions().await?;
        select_latest(&records)
            .map(|r| r.version_id.clone())
            .ok_or_else(|| StoreError::NotFound(self.key().to_string()))
    }
}

/// Builds a store for one remote and key. Client construction lives here.
pub trait StoreFactory: Send + Sync {
    fn open(&self, remote: &RemoteConfig, key: &str) -> Result<Arc<dyn RemoteStore>, StoreError>;
}
