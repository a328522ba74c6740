// Tests for push / pull execution
// Atomic overwrite, keep-both, forced directions

use async_trait::async_trait;
use std::fs;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tempfile::TempDir;

use keepsync::remote::{MemoryBucket, MemoryStore, StoreError};
use keepsync::sync::{conflict_path, TransferExecutor};
use keepsync::{
    DatabaseSelector, DecisionKind, ErrorKind, LocalInspector, PullPolicy, Reconciler, RemoteObjectRecord,
    RemoteStore, SyncRequest, VersionId,
};

use crate::common::{at, exact, home, mtime, write_at};

fn entries(dir: &TempDir) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn test_push_then_pull_round_trip() {
    let content: Vec<u8> = (0..=255u8).cycle().take(64 * 1024).collect();
    let source = TempDir::new().unwrap();
    write_at(source.path(), "db.kdbx", &content, at(0));

    let bucket = MemoryBucket::new("vault");
    let (remotes, factory) = home(&bucket);

    let pushed = Reconciler::new(exact(source.path()), remotes.clone(), factory.clone())
        .push_forced()
        .await
        .unwrap();
    assert_eq!(pushed.bytes, content.len() as u64);

    let target = TempDir::new().unwrap();
    let pulled = Reconciler::new(exact(target.path()), remotes, factory)
        .pull_forced()
        .await
        .unwrap();

    assert_eq!(pulled.version, pushed.version);
    assert_eq!(fs::read(target.path().join("db.kdbx")).unwrap(), content);
}

#[tokio::test]
async fn test_pulled_file_carries_remote_timestamp() {
    let dir = TempDir::new().unwrap();
    let path = write_at(dir.path(), "db.kdbx", b"local", at(0));

    let bucket = MemoryBucket::new("vault");
    bucket.put_at("db.kdbx", b"remote".to_vec(), at(5));
    let (remotes, factory) = home(&bucket);

    let first = Reconciler::new(exact(dir.path()), remotes.clone(), factory.clone())
        .run()
        .await
        .unwrap();
    assert_eq!(first.action, DecisionKind::Pull);
    assert_eq!(mtime(&path), at(5));
    // No part file is left behind.
    assert_eq!(entries(&dir), vec!["db.kdbx".to_string()]);

    let second = Reconciler::new(exact(dir.path()), remotes, factory).run().await.unwrap();
    assert_eq!(second.action, DecisionKind::NoOp);
    assert_eq!(bucket.calls.transfers(), 1);
}

#[tokio::test]
async fn test_keep_both_moves_local_copy_aside() {
    let dir = TempDir::new().unwrap();
    let path = write_at(dir.path(), "db.kdbx", b"local", at(0));

    let bucket = MemoryBucket::new("vault");
    bucket.put_at("db.kdbx", b"remote".to_vec(), at(5));
    let (remotes, factory) = home(&bucket);

    let outcome = Reconciler::new(exact(dir.path()), remotes, factory)
        .with_pull_policy(PullPolicy::KeepBoth)
        .run()
        .await
        .unwrap();

    assert_eq!(outcome.written_to.unwrap().file_name().unwrap(), "db.kdbx");
    assert_eq!(outcome.kept_as.unwrap().file_name().unwrap(), "db.conflict-1.kdbx");
    assert_eq!(fs::read(&path).unwrap(), b"remote");
    assert_eq!(mtime(&path), at(5));
    assert_eq!(fs::read(dir.path().join("db.conflict-1.kdbx")).unwrap(), b"local");
}

#[tokio::test]
async fn test_keep_both_settles_after_one_pull() {
    let dir = TempDir::new().unwrap();
    write_at(dir.path(), "db.kdbx", b"local", at(0));

    let bucket = MemoryBucket::new("vault");
    bucket.put_at("db.kdbx", b"remote".to_vec(), at(5));
    let (remotes, factory) = home(&bucket);

    for expected in [DecisionKind::Pull, DecisionKind::NoOp, DecisionKind::NoOp] {
        let outcome = Reconciler::new(exact(dir.path()), remotes.clone(), factory.clone())
            .with_pull_policy(PullPolicy::KeepBoth)
            .run()
            .await
            .unwrap();
        assert_eq!(outcome.action, expected);
    }
    assert_eq!(
        entries(&dir),
        vec!["db.conflict-1.kdbx".to_string(), "db.kdbx".to_string()]
    );
    assert_eq!(bucket.calls.get.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_keep_both_with_scan_settles() {
    let dir = TempDir::new().unwrap();
    write_at(dir.path(), "db.kdbx", b"local", at(0));

    let bucket = MemoryBucket::new("vault");
    bucket.put_at("db.kdbx", b"remote".to_vec(), at(5));
    let (remotes, factory) = home(&bucket);

    let request = SyncRequest::new(dir.path(), DatabaseSelector::Any).with_db_name("db.kdbx");
    let first = Reconciler::new(request.clone(), remotes.clone(), factory.clone())
        .with_pull_policy(PullPolicy::KeepBoth)
        .run()
        .await
        .unwrap();
    assert_eq!(first.action, DecisionKind::Pull);

    // The conflict copy is older than the pulled file, so it is never picked.
    let second = Reconciler::new(request, remotes, factory)
        .with_pull_policy(PullPolicy::KeepBoth)
        .run()
        .await
        .unwrap();
    assert_eq!(second.action, DecisionKind::NoOp);
    assert_eq!(second.local.unwrap().name, "db.kdbx");
}

#[tokio::test]
async fn test_keep_both_skips_taken_conflict_names() {
    let dir = TempDir::new().unwrap();
    let path = write_at(dir.path(), "db.kdbx", b"local", at(0));
    fs::write(conflict_path(&path, 1), b"earlier conflict").unwrap();

    let bucket = MemoryBucket::new("vault");
    bucket.put_at("db.kdbx", b"remote".to_vec(), at(5));
    let (remotes, factory) = home(&bucket);

    let outcome = Reconciler::new(exact(dir.path()), remotes, factory)
        .with_pull_policy(PullPolicy::KeepBoth)
        .run()
        .await
        .unwrap();

    assert_eq!(outcome.kept_as.unwrap().file_name().unwrap(), "db.conflict-2.kdbx");
    assert_eq!(fs::read(conflict_path(&path, 1)).unwrap(), b"earlier conflict");
    assert_eq!(fs::read(conflict_path(&path, 2)).unwrap(), b"local");
}

#[tokio::test]
async fn test_forced_pull_without_local_keeps_nothing() {
    let dir = TempDir::new().unwrap();
    let bucket = MemoryBucket::new("vault");
    bucket.put_at("db.kdbx", b"remote".to_vec(), at(5));
    let (remotes, factory) = home(&bucket);

    let outcome = Reconciler::new(exact(dir.path()), remotes, factory)
        .with_pull_policy(PullPolicy::KeepBoth)
        .pull_forced()
        .await
        .unwrap();
    assert!(outcome.kept_as.is_none());
    assert_eq!(entries(&dir), vec!["db.kdbx".to_string()]);
}

#[cfg(unix)]
#[tokio::test]
async fn test_pull_keeps_file_mode() {
    use std::os::unix::fs::PermissionsExt;

    for policy in [PullPolicy::Overwrite, PullPolicy::KeepBoth] {
        let dir = TempDir::new().unwrap();
        let path = write_at(dir.path(), "db.kdbx", b"local", at(0));
        fs::set_permissions(&path, fs::Permissions::from_mode(0o600)).unwrap();

        let bucket = MemoryBucket::new("vault");
        bucket.put_at("db.kdbx", b"remote".to_vec(), at(5));
        let (remotes, factory) = home(&bucket);

        Reconciler::new(exact(dir.path()), remotes, factory)
            .with_pull_policy(policy)
            .run()
            .await
            .unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"remote");
        assert_eq!(fs::metadata(&path).unwrap().permissions().mode() & 0o777, 0o600);
    }
}

#[tokio::test]
async fn test_forced_push_to_empty_remote() {
    let dir = TempDir::new().unwrap();
    write_at(dir.path(), "db.kdbx", b"first upload", at(0));

    let bucket = MemoryBucket::new("vault");
    let (remotes, factory) = home(&bucket);

    let outcome = Reconciler::new(exact(dir.path()), remotes, factory)
        .push_forced()
        .await
        .unwrap();

    assert_eq!(outcome.action, DecisionKind::Push);
    assert!(outcome.remote.is_none());
    assert_eq!(bucket.version_count("db.kdbx"), 1);
}

#[tokio::test]
async fn test_forced_push_ignores_newer_remote() {
    let dir = TempDir::new().unwrap();
    write_at(dir.path(), "db.kdbx", b"local", at(0));

    let bucket = MemoryBucket::new("vault");
    bucket.put_at("db.kdbx", b"remote".to_vec(), at(100));
    let (remotes, factory) = home(&bucket);

    Reconciler::new(exact(dir.path()), remotes, factory)
        .push_forced()
        .await
        .unwrap();
    // The older version is kept; push never overwrites.
    assert_eq!(bucket.version_count("db.kdbx"), 2);
}

#[tokio::test]
async fn test_forced_push_without_local_file() {
    let dir = TempDir::new().unwrap();
    let bucket = MemoryBucket::new("vault");
    let (remotes, factory) = home(&bucket);

    let err = Reconciler::new(exact(dir.path()), remotes, factory)
        .push_forced()
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(bucket.calls.transfers(), 0);
}

#[tokio::test]
async fn test_forced_pull_into_empty_directory() {
    let dir = TempDir::new().unwrap();
    let bucket = MemoryBucket::new("vault");
    bucket.put_at("vault.kdbx", b"remote".to_vec(), at(7));
    let (remotes, factory) = home(&bucket);

    let request = SyncRequest::new(dir.path(), DatabaseSelector::Any).with_db_name("vault.kdbx");
    let outcome = Reconciler::new(request, remotes, factory)
        .pull_forced()
        .await
        .unwrap();

    assert!(outcome.local.is_none());
    let path = dir.path().join("vault.kdbx");
    assert_eq!(fs::read(&path).unwrap(), b"remote");
    assert_eq!(mtime(&path), at(7));
}

#[tokio::test]
async fn test_forced_pull_overwrites_newer_local() {
    let dir = TempDir::new().unwrap();
    let path = write_at(dir.path(), "db.kdbx", b"local", at(100));

    let bucket = MemoryBucket::new("vault");
    bucket.put_at("db.kdbx", b"remote".to_vec(), at(0));
    let (remotes, factory) = home(&bucket);

    Reconciler::new(exact(dir.path()), remotes, factory)
        .pull_forced()
        .await
        .unwrap();
    assert_eq!(fs::read(&path).unwrap(), b"remote");
    assert_eq!(mtime(&path), at(0));
}

#[tokio::test]
async fn test_forced_pull_from_empty_remote() {
    let dir = TempDir::new().unwrap();
    let path = write_at(dir.path(), "db.kdbx", b"local", at(0));
    let bucket = MemoryBucket::new("vault");
    let (remotes, factory) = home(&bucket);

    let err = Reconciler::new(exact(dir.path()), remotes, factory)
        .pull_forced()
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoVersionFound);
    assert_eq!(fs::read(&path).unwrap(), b"local");
}

/// Lists normally but refuses every upload.
struct ReadOnlyStore(MemoryStore);

#[async_trait]
impl RemoteStore for ReadOnlyStore {
    fn key(&self) -> &str {
        self.0.key()
    }

    fn location(&self) -> String {
        self.0.location()
    }

    async fn list_versions(&self) -> Result<Vec<RemoteObjectRecord>, StoreError> {
        self.0.list_versions().await
    }

    async fn persist_version(&self, _data: Vec<u8>) -> Result<VersionId, StoreError> {
        Err(StoreError::Other("AccessDenied".to_string()))
    }

    async fn get_version(&self, version: &VersionId) -> Result<Vec<u8>, StoreError> {
        self.0.get_version(version).await
    }
}

#[tokio::test]
async fn test_failed_upload_is_transfer_error() {
    let dir = TempDir::new().unwrap();
    write_at(dir.path(), "db.kdbx", b"local", at(0));
    let record = LocalInspector::new(dir.path())
        .inspect(&DatabaseSelector::Exact("db.kdbx".to_string()))
        .await
        .unwrap();

    let bucket = MemoryBucket::new("vault");
    let store = Arc::new(ReadOnlyStore(bucket.store("db.kdbx")));
    let err = TransferExecutor::new(store, PullPolicy::Overwrite)
        .push(record)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Transfer);
    assert!(err.to_string().contains("AccessDenied"));
    assert_eq!(bucket.version_count("db.kdbx"), 0);
}

#[tokio::test]
async fn test_failed_download_keeps_local_file() {
    let dir = TempDir::new().unwrap();
    let path = write_at(dir.path(), "db.kdbx", b"local", at(0));

    let bucket = MemoryBucket::new("vault");
    bucket.put_at("db.kdbx", b"remote".to_vec(), at(5));
    let listed = bucket.store("db.kdbx").list_versions().await.unwrap();
    let mut missing = listed[0].clone();
    missing.version_id = VersionId::new("gone");

    let executor = TransferExecutor::new(Arc::new(bucket.store("db.kdbx")), PullPolicy::Overwrite);
    let err = executor.pull(&path, None, &missing).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Transfer);
    assert_eq!(fs::read(&path).unwrap(), b"local");
    assert_eq!(entries(&dir), vec!["db.kdbx".to_string()]);
}
