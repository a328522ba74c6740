// Shared fixtures: pinned mtimes and in-memory remotes

use chrono::{DateTime, TimeZone, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use keepsync::remote::{MemoryBucket, MemoryStoreFactory, StoreFactory};
use keepsync::{DatabaseSelector, RemoteConfig, SyncRequest};

/// Reference instant used by the scenarios.
pub const T: i64 = 1_700_000_000;

pub fn at(offset_secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(T + offset_secs, 0).unwrap()
}

/// Write `data` to `dir/name` and pin its mtime.
pub fn write_at(dir: &Path, name: &str, data: &[u8], modified: DateTime<Utc>) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, data).unwrap();
    set_mtime(&path, modified);
    path
}

pub fn set_mtime(path: &Path, modified: DateTime<Utc>) {
    let file = fs::OpenOptions::new().write(true).open(path).unwrap();
    file.set_modified(SystemTime::from(modified)).unwrap();
}

pub fn mtime(path: &Path) -> DateTime<Utc> {
    DateTime::<Utc>::from(fs::metadata(path).unwrap().modified().unwrap())
}

/// One default remote named "home" backed by `bucket`.
pub fn home(bucket: &Arc<MemoryBucket>) -> (Vec<RemoteConfig>, Arc<dyn StoreFactory>) {
    let remotes = vec![RemoteConfig::new("home", "vault").as_default()];
    let factory = MemoryStoreFactory::new().with_bucket("home", Arc::clone(bucket));
    (remotes, Arc::new(factory))
}

pub fn exact(dir: &Path) -> SyncRequest {
    SyncRequest::new(dir, DatabaseSelector::Exact("db.kdbx".to_string()))
}
