use std::sync::Arc;
use tracing::debug;

use crate::config::{default_remote, remote_by_name, RemoteConfig};
use crate::error::{Result, SyncError};
use crate::remote::store::{select_latest, RemoteObjectRecord, RemoteStore, StoreError, StoreFactory};

/// Which configured remote to talk to.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RemoteSelection {
    /// The single remote flagged as default.
    #[default]
    Default,
    /// A remote picked by name.
    Named(String),
}

/// Store bound to the selected remote, with its newest version if any.
pub struct RemoteLookup {
    pub remote: RemoteConfig,
    pub store: Arc<dyn RemoteStore>,
    pub latest: Option<RemoteObjectRecord>,
}

impl RemoteLookup {
    /// Split off the latest version; an empty listing is `NoVersionFound`.
    pub fn require_latest(self) -> Result<(RemoteLookup, RemoteObjectRecord)> {
        match self.latest.clone() {
            Some(latest) => Ok((self, latest)),
            None => Err(SyncError::NoVersionFound {
                key: self.store.key().to_string(),
                location: self.store.location(),
            }),
        }
    }
}

impl std::fmt::Debug for RemoteLookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteLookup")
            .field("remote", &self.remote.name)
            .field("location", &self.store.location())
            .field("latest", &self.latest)
            .finish()
    }
}

/// Resolves the newest version of the database object on the selected remote.
///
/// Read-only: only listing is issued against the store.
#[derive(Clone)]
pub struct RemoteInspector {
    remotes: Vec<RemoteConfig>,
    selection: RemoteSelection,
    factory: Arc<dyn StoreFactory>,
}

impl RemoteInspector {
    pub fn new(remotes: Vec<RemoteConfig>, factory: Arc<dyn StoreFactory>) -> Self {
        Self {
            remotes,
            selection: RemoteSelection::Default,
            factory,
        }
    }

    pub fn with_selection(mut self, selection: RemoteSelection) -> Self {
        self.selection = selection;
        self
    }

    /// The remote this inspector will use.
    pub fn resolve(&self) -> Result<&RemoteConfig> {
        let remote = match &self.selection {
            RemoteSelection::Default => default_remote(&self.remotes)?,
            RemoteSelection::Named(name) => remote_by_name(&self.remotes, name)?,
        };
        Ok(remote)
    }

    /// List versions of `key` and keep the latest; an empty listing is not an error here.
    pub async fn lookup(&self, key: &str) -> Result<RemoteLookup> {
        let remote = self.resolve()?.clone();
        let store = self
            .factory
            .open(&remote, key)
            .map_err(|e| unavailable(&remote.location(), e))?;

        let records = store
            .list_versions()
            .await
            .map_err(|e| unavailable(&store.location(), e))?;
        let latest = select_latest(&records).cloned();
        debug!(
            remote = %remote.name,
            versions = records.len(),
            latest = ?latest.as_ref().map(|r| r.version_id.to_string()),
            "listed remote versions"
        );

        Ok(RemoteLookup { remote, store, latest })
    }

    /// Like `lookup`, but an empty listing is `NoVersionFound`.
    pub async fn inspect(&self, key: &str) -> Result<(RemoteLookup, RemoteObjectRecord)> {
        self.lookup(key).await?.require_latest()
    }
}

fn unavailable(location: &str, err: StoreError) -> SyncError {
    SyncError::RemoteUnavailable {
        location: location.to_string(),
        reason: err.to_string(),
    }
}
