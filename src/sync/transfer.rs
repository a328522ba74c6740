//! Push and pull of the database between the local file and a remote store.
//!
//! Both directions are single-attempt: no retry, no resume, no checksum
//! beyond what the backend does natively.

use serde::{Deserialize, Serialize};
use std::fs::Permissions;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::error::{Direction, Result, SyncError};
use crate::fs::LocalFileRecord;
use crate::remote::{RemoteObjectRecord, RemoteStore, VersionId};

const PART_SUFFIX: &str = "keepsync-part";

/// What a pull does with the existing local file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PullPolicy {
    /// Replace the local file atomically (write aside, then rename).
    #[default]
    Overwrite,
    /// Move the local file aside as `<stem>.conflict-<n>.<ext>`, then write
    /// the pulled version to the database path as `Overwrite` does.
    KeepBoth,
}

/// Result of one executed transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReport {
    pub bytes: u64,
    /// Version created by a push, or fetched by a pull.
    pub version: VersionId,
    /// Local file written by a pull.
    pub written_to: Option<PathBuf>,
    /// Where a pull moved the previous local file (`KeepBoth`).
    pub kept_as: Option<PathBuf>,
}

/// Executes a decided push or pull against one store.
pub struct TransferExecutor {
    store: Arc<dyn RemoteStore>,
    policy: PullPolicy,
}

impl TransferExecutor {
    pub fn new(store: Arc<dyn RemoteStore>, policy: PullPolicy) -> Self {
        Self { store, policy }
    }

    /// Upload the full local content as a new remote version.
    ///
    /// The local file is only read. Its handle is closed on return.
    pub async fn push(&self, local: LocalFileRecord) -> Result<TransferReport> {
        let LocalFileRecord { path, mut handle, .. } = local;
        let push_error = |reason: String| SyncError::Transfer {
            direction: Direction::Push,
            reason,
        };

        let mut data = Vec::new();
        handle
            .seek(SeekFrom::Start(0))
            .await
            .map_err(|e| push_error(format!("failed to read {}: {}", path.display(), e)))?;
        handle
            .read_to_end(&mut data)
            .await
            .map_err(|e| push_error(format!("failed to read {}: {}", path.display(), e)))?;
        drop(handle);

        let bytes = data.len() as u64;
        let version = self
            .store
            .persist_version(data)
            .await
            .map_err(|e| push_error(format!("upload to {} failed: {}", self.store.location(), e)))?;

        info!(bytes, version = %version, location = %self.store.location(), "pushed database");
        Ok(TransferReport {
            bytes,
            version,
            written_to: None,
            kept_as: None,
        })
    }

    /// Download `remote` into `destination`.
    ///
    /// `existing` is the local record the decision was made on, if any; its
    /// handle is released before the destination is touched. The written
    /// file gets the remote `last_modified` as mtime so the next run is a no-op,
    /// and keeps the permissions of the file it replaces.
    pub async fn pull(
        &self,
        destination: &Path,
        existing: Option<LocalFileRecord>,
        remote: &RemoteObjectRecord,
    ) -> Result<TransferReport> {
        drop(existing);

        let data = self
            .store
            .get_version(&remote.version_id)
            .await
            .map_err(|e| pull_error(format!("download from {} failed: {}", self.store.location(), e)))?;
        let bytes = data.len() as u64;
        let mtime = SystemTime::from(remote.last_modified);
        let permissions = fs::metadata(destination).await.ok().map(|m| m.permissions());

        let part = part_path(destination);
        if let Err(e) = write_part(&part, &data, mtime, permissions.clone()).await {
            discard(&part).await;
            return Err(pull_error(format!("failed to write {}: {}", part.display(), e)));
        }

        let kept_as = match (self.policy, permissions.is_some()) {
            (PullPolicy::KeepBoth, true) => {
                let aside = free_conflict_path(destination).await;
                if let Err(e) = fs::rename(destination, &aside).await {
                    discard(&part).await;
                    return Err(pull_error(format!("failed to move {} aside: {}", destination.display(), e)));
                }
                Some(aside)
            }
            _ => None,
        };

        if let Err(e) = fs::rename(&part, destination).await {
            discard(&part).await;
            if let Some(aside) = &kept_as {
                restore(aside, destination).await;
            }
            return Err(pull_error(format!("failed to replace {}: {}", destination.display(), e)));
        }

        info!(bytes, version = %remote.version_id, path = %destination.display(), "pulled database");
        Ok(TransferReport {
            bytes,
            version: remote.version_id.clone(),
            written_to: Some(destination.to_path_buf()),
            kept_as,
        })
    }
}

fn pull_error(reason: String) -> SyncError {
    SyncError::Transfer {
        direction: Direction::Pull,
        reason,
    }
}

async fn write_part(
    path: &Path,
    data: &[u8],
    mtime: SystemTime,
    permissions: Option<Permissions>,
) -> std::io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(data).await?;
    file.sync_all().await?;
    let file = file.into_std().await;
    if let Some(permissions) = permissions {
        file.set_permissions(permissions)?;
    }
    file.set_modified(mtime)?;
    Ok(())
}

async fn discard(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        warn!(path = %path.display(), error = %e, "failed to remove partial download");
    }
}

async fn restore(aside: &Path, destination: &Path) {
    if let Err(e) = fs::rename(aside, destination).await {
        warn!(path = %aside.display(), error = %e, "failed to restore local database");
    }
}

/// Sibling path used while a pull is being written.
pub fn part_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    target.with_file_name(format!(".{}.{}", name, PART_SUFFIX))
}

/// Generate a conflict-renamed path (e.g., db.kdbx -> db.conflict-1.kdbx)
pub fn conflict_path(path: &Path, suffix: u32) -> PathBuf {
    let stem = path.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    path.with_file_name(format!("{}.conflict-{}{}", stem, suffix, ext))
}

async fn free_conflict_path(path: &Path) -> PathBuf {
    let mut suffix = 1;
    loop {
        let candidate = conflict_path(path, suffix);
        if !fs::try_exists(&candidate).await.unwrap_or(false) {
            debug!(path = %candidate.display(), "moving existing database aside");
            return candidate;
        }
        suffix += 1;
    }
}
