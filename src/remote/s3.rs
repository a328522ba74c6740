use async_trait::async_trait;
use chrono::{DateTime, Utc};
use opendal::{services::S3, ErrorKind, Operator};
use std::sync::Arc;
use std::time::SystemTime;

use crate::config::RemoteConfig;
use crate::remote::store::{RemoteObjectRecord, RemoteStore, StoreError, StoreFactory, VersionId};

/// S3-compatible storage providers
#[derive(Debug, Clone, PartialEq)]
pub enum S3Provider {
    Aws,
    Custom { name: String, endpoint: String },
}

impl S3Provider {
    /// Get the endpoint URL for this provider
    pub fn endpoint(&self) -> Option<String> {
        match self {
            S3Provider::Aws => None, // Use default AWS endpoint
            S3Provider::Custom { endpoint, .. } => Some(endpoint.clone()),
        }
    }
}

/// Versioned S3 (or S3-compatible) object store using OpenDAL.
///
/// Bucket versioning must be enabled on the service side; every write then
/// yields a fresh version id.
pub struct S3Store {
    operator: Operator,
    bucket: String,
    key: String,
}

impl S3Store {
    /// Create a store for `key` in the bucket of `remote`.
    ///
    /// Empty credentials fall back to the standard AWS credential chain
    /// (environment, shared credentials file, instance profile).
    pub fn new(remote: &RemoteConfig, key: &str) -> Result<Self, StoreError> {
        let mut builder = S3::default()
            .bucket(&remote.bucket)
            .region(remote.effective_region())
            .enable_versioning(true);

        if !remote.credential_id.is_empty() {
            builder = builder
                .access_key_id(&remote.credential_id)
                .secret_access_key(&remote.credential_secret);
        }

        // Set custom endpoint for S3-compatible providers
        if let Some(endpoint) = remote.provider().endpoint() {
            builder = builder.endpoint(&endpoint);
        }

        let operator = Operator::new(builder)
            .map_err(|e| StoreError::Unavailable(format!("failed to build S3 client: {}", e)))?
            .finish();

        Ok(Self {
            operator,
            bucket: remote.bucket.clone(),
            key: key.trim_start_matches('/').to_string(),
        })
    }
}

fn map_error(context: &str, err: opendal::Error) -> StoreError {
    match err.kind() {
        ErrorKind::NotFound => StoreError::NotFound(format!("{}: {}", context, err)),
        _ => StoreError::Unavailable(format!("{}: {}", context, err)),
    }
}

fn to_utc(t: impl Into<SystemTime>) -> DateTime<Utc> {
    DateTime::<Utc>::from(t.into())
}

#[async_trait]
impl RemoteStore for S3Store {
    fn key(&self) -> &str {
        &self.key
    }

    fn location(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.key)
    }

    async fn list_versions(&self) -> Result<Vec<RemoteObjectRecord>, StoreError> {
        // Prefix listing; only exact key matches are versions of the database.
        let entries = self
            .operator
            .list_with(&self.key)
            .versions(true)
            .await
            .map_err(|e| map_error("failed to list S3 object versions", e))?;

        let mut records = Vec::new();
        for entry in entries {
            if entry.path() != self.key {
                continue;
            }
            let meta = entry.metadata();
            if meta.is_deleted() {
                continue;
            }
            let (Some(version), Some(modified)) = (meta.version(), meta.last_modified()) else {
                continue;
            };
            records.push(RemoteObjectRecord {
                key: self.key.clone(),
                version_id: VersionId::new(version),
                last_modified: to_utc(modified),
                is_latest: meta.is_current().unwrap_or(false),
            });
        }

        Ok(records)
    }

    async fn persist_version(&self, data: Vec<u8>) -> Result<VersionId, StoreError> {
        let meta = self
            .operator
            .write(&self.key, data)
            .await
            .map_err(|e| map_error("failed to upload to S3", e))?;

        meta.version().map(VersionId::new).ok_or_else(|| {
            StoreError::Other(format!(
                "bucket {} returned no version id; is versioning enabled?",
                self.bucket
            ))
        })
    }

    async fn get_version(&self, version: &VersionId) -> Result<Vec<u8>, StoreError> {
        let content = self
            .operator
            .read_with(&self.key)
            .version(version.as_str())
            .await
            .map_err(|e| map_error("failed to download from S3", e))?;
        Ok(content.to_vec())
    }
}

/// Opens an `S3Store` per remote.
#[derive(Debug, Default, Clone, Copy)]
pub struct S3StoreFactory;

impl StoreFactory for S3StoreFactory {
    fn open(&self, remote: &RemoteConfig, key: &str) -> Result<Arc<dyn RemoteStore>, StoreError> {
        Ok(Arc::new(S3Store::new(remote, key)?))
    }
}
