use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use crate::error::{Result, SyncError};
use crate::fs::types::{Candidate, DatabaseSelector, LocalFileRecord, NameMatcher};

/// Resolves the newest local database file in one directory.
#[derive(Debug, Clone)]
pub struct LocalInspector {
    directory: PathBuf,
}

impl LocalInspector {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    /// Find and open the newest file matching `selector`.
    pub async fn inspect(&self, selector: &DatabaseSelector) -> Result<LocalFileRecord> {
        let directory = fs::canonicalize(&self.directory)
            .await
            .map_err(|e| SyncError::directory_error(e, "resolving directory", self.directory.clone()))?;

        match selector.matcher()? {
            None => {
                // Exact names never fall back to a scan.
                let name = selector.describe();
                Self::open_exact(&directory, &name).await
            }
            Some(matcher) => {
                let candidates = Self::scan(&directory, &matcher).await?;
                let newest = pick_newest(candidates).ok_or_else(|| SyncError::NoCandidates {
                    dir: directory.clone(),
                    pattern: selector.describe(),
                })?;
                debug!(name = %newest.name, modified = %newest.modified, "selected newest local candidate");
                let handle = fs::File::open(&newest.path).await.map_err(|e| {
                    SyncError::from_io_error(e, "opening database", Some(newest.path.clone()))
                })?;
                Ok(LocalFileRecord {
                    name: newest.name,
                    path: newest.path,
                    modified_at: newest.modified,
                    handle,
                })
            }
        }
    }

    async fn open_exact(directory: &Path, name: &str) -> Result<LocalFileRecord> {
        let path = directory.join(name);
        let handle = fs::File::open(&path)
            .await
            .map_err(|e| SyncError::from_io_error(e, "opening database", Some(path.clone())))?;
        let metadata = handle
            .metadata()
            .await
            .map_err(|e| SyncError::from_io_error(e, "reading metadata", Some(path.clone())))?;
        if !metadata.is_file() {
            return Err(SyncError::NotFound { path });
        }
        let modified = metadata
            .modified()
            .map_err(|e| SyncError::from_io_error(e, "reading modification time", Some(path.clone())))?;

        Ok(LocalFileRecord {
            name: name.to_string(),
            path,
            modified_at: DateTime::<Utc>::from(modified),
            handle,
        })
    }

    /// List immediate regular files of `directory` whose names match.
    async fn scan(directory: &Path, matcher: &NameMatcher) -> Result<Vec<Candidate>> {
        let mut read_dir = fs::read_dir(directory)
            .await
            .map_err(|e| SyncError::directory_error(e, "listing directory", directory.to_path_buf()))?;

        let mut candidates = Vec::new();
        loop {
            let entry = match read_dir.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => return Err(SyncError::directory_error(e, "listing directory", directory.to_path_buf())),
            };
            let name = entry.file_name().to_string_lossy().to_string();

            // Skip hidden files starting with .
            if name.starts_with('.') || !matcher.is_match(&name) {
                continue;
            }

            let path = entry.path();
            let metadata = match fs::metadata(&path).await {
                Ok(m) if m.is_file() => m,
                Ok(_) => continue,
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "skipping unreadable entry");
                    continue;
                }
            };
            let Ok(modified) = metadata.modified() else {
                continue;
            };

            candidates.push(Candidate {
                name,
                path,
                modified: DateTime::<Utc>::from(modified),
            });
        }

        Ok(candidates)
    }
}

/// Newest candidate; on equal timestamps the lexicographically smallest name wins.
pub fn pick_newest(candidates: Vec<Candidate>) -> Option<Candidate> {
    candidates.into_iter().reduce(|best, c| {
        if c.modified > best.modified || (c.modified == best.modified && c.name < best.name) {
            c
        } else {
            best
        }
    })
}
