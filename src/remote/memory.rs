//! In-process versioned store.
//!
//! Behaves like a versioned bucket: every write appends a version, the last
//! written version is flagged latest. Can emulate flat (unversioned) listings
//! and transport failures.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::RemoteConfig;
use crate::remote::store::{RemoteObjectRecord, RemoteStore, StoreError, StoreFactory, VersionId};

#[derive(Debug, Clone)]
struct StoredVersion {
    version_id: VersionId,
    last_modified: DateTime<Utc>,
    data: Vec<u8>,
}

#[derive(Debug, Default)]
struct BucketState {
    objects: HashMap<String, Vec<StoredVersion>>,
    next_version: u64,
    unavailable: Option<String>,
}

/// Call counters, for asserting which store operations a run issued.
#[derive(Debug, Default)]
pub struct CallCounts {
    pub list: AtomicUsize,
    pub persist: AtomicUsize,
    pub get: AtomicUsize,
}

impl CallCounts {
    pub fn transfers(&self) -> usize {
        self.persist.load(Ordering::SeqCst) + self.get.load(Ordering::SeqCst)
    }
}

/// A named in-memory bucket holding any number of keys.
#[derive(Debug, Default)]
pub struct MemoryBucket {
    name: String,
    state: Mutex<BucketState>,
    flat_listing: bool,
    pub calls: CallCounts,
}

impl MemoryBucket {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            ..Default::default()
        })
    }

    /// Bucket whose listing never flags a latest version.
    pub fn flat(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            flat_listing: true,
            ..Default::default()
        })
    }

    fn state(&self) -> MutexGuard<'_, BucketState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append a version with an explicit timestamp.
    pub fn put_at(&self, key: &str, data: impl Into<Vec<u8>>, last_modified: DateTime<Utc>) -> VersionId {
        let mut state = self.state();
        state.next_version += 1;
        let version_id = VersionId::new(format!("v{}", state.next_version));
        state.objects.entry(key.to_string()).or_default().push(StoredVersion {
            version_id: version_id.clone(),
            last_modified,
            data: data.into(),
        });
        version_id
    }

    /// Make every operation fail as if the service were unreachable.
    pub fn set_unavailable(&self, reason: Option<&str>) {
        self.state().unavailable = reason.map(str::to_string);
    }

    pub fn version_count(&self, key: &str) -> usize {
        self.state().objects.get(key).map(Vec::len).unwrap_or(0)
    }

    pub fn store(self: &Arc<Self>, key: &str) -> MemoryStore {
        MemoryStore {
            bucket: Arc::clone(self),
            key: key.to_string(),
        }
    }

    fn check_available(&self) -> Result<(), StoreError> {
        match &self.state().unavailable {
            Some(reason) => Err(StoreError::Unavailable(reason.clone())),
            None => Ok(()),
        }
    }
}

/// `RemoteStore` view of one key inside a `MemoryBucket`.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    bucket: Arc<MemoryBucket>,
    key: String,
}

#[async_trait]
impl RemoteStore for MemoryStore {
    fn key(&self) -> &str {
        &self.key
    }

    fn location(&self) -> String {
        format!("memory://{}/{}", self.bucket.name, self.key)
    }

    async fn list_versions(&self) -> Result<Vec<RemoteObjectRecord>, StoreError> {
        self.bucket.calls.list.fetch_add(1, Ordering::SeqCst);
        self.bucket.check_available()?;

        let state = self.bucket.state();
        let versions = state.objects.get(&self.key).cloned().unwrap_or_default();
        let last = versions.len().saturating_sub(1);
        Ok(versions
            .into_iter()
            .enumerate()
            .map(|(i, v)| RemoteObjectRecord {
                key: self.key.clone(),
                version_id: v.version_id,
                last_modified: v.last_modified,
                is_latest: !self.bucket.flat_listing && i == last,
            })
            .collect())
    }

    async fn persist_version(&self, data: Vec<u8>) -> Result<VersionId, StoreError> {
        self.bucket.calls.persist.fetch_add(1, Ordering::SeqCst);
        self.bucket.check_available()?;
        Ok(self.bucket.put_at(&self.key, data, Utc::now()))
    }

    async fn get_version(&self, version: &VersionId) -> Result<Vec<u8>, StoreError> {
        self.bucket.calls.get.fetch_add(1, Ordering::SeqCst);
        self.bucket.check_available()?;

        let state = self.bucket.state();
        state
            .objects
            .get(&self.key)
            .and_then(|versions| versions.iter().find(|v| &v.version_id == version))
            .map(|v| v.data.clone())
            .ok_or_else(|| StoreError::NotFound(format!("{}@{}", self.key, version)))
    }
}

/// Maps remote names to in-memory buckets.
#[derive(Debug, Default, Clone)]
pub struct MemoryStoreFactory {
    buckets: HashMap<String, Arc<MemoryBucket>>,
}

impl MemoryStoreFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bucket(mut self, remote_name: &str, bucket: Arc<MemoryBucket>) -> Self {
        self.buckets.insert(remote_name.to_string(), bucket);
        self
    }
}

impl StoreFactory for MemoryStoreFactory {
    fn open(&self, remote: &RemoteConfig, key: &str) -> Result<Arc<dyn RemoteStore>, StoreError> {
        let bucket = self
            .buckets
            .get(&remote.name)
            .ok_or_else(|| StoreError::Unavailable(format!("no bucket for remote {}", remote.name)))?;
        Ok(Arc::new(bucket.store(key)))
    }
}
