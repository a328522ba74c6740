//! Reconciliation engine.
//!
//! One run inspects the local directory and the selected remote concurrently,
//! waits for both, decides push / pull / no-op on the modification instants and
//! executes at most one transfer. A run is one-shot: the reconciler is consumed.

use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::RemoteConfig;
use crate::error::{ConfigError, Result, SyncError};
use crate::fs::{DatabaseSelector, LocalFileRecord, LocalInspector};
use crate::remote::{RemoteInspector, RemoteLookup, RemoteObjectRecord, RemoteSelection, StoreFactory, VersionId};
use crate::sync::decision::{DecisionKind, SyncDecision};
use crate::sync::transfer::{PullPolicy, TransferExecutor, TransferReport};

/// What to synchronize: where the database lives and how to pick it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRequest {
    pub directory: PathBuf,
    pub selector: DatabaseSelector,
    /// Logical database name, used as the remote object key.
    pub db_name: Option<String>,
}

impl SyncRequest {
    pub fn new(directory: impl Into<PathBuf>, selector: DatabaseSelector) -> Self {
        Self {
            directory: directory.into(),
            selector,
            db_name: None,
        }
    }

    pub fn with_db_name(mut self, name: impl Into<String>) -> Self {
        self.db_name = Some(name.into());
        self
    }

    /// Remote object key. Must be known before the local scan finishes.
    pub fn key(&self) -> Result<String> {
        self.db_name
            .clone()
            .or_else(|| self.selector.exact_name().map(str::to_string))
            .ok_or(SyncError::Config(ConfigError::MissingDatabaseName))
    }
}

/// Reconciler lifecycle, reported on the progress channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReconcileState {
    #[default]
    Idle,
    LookupInFlight,
    Decided(DecisionKind),
    Pushed,
    Pulled,
    NoOp,
    Failed,
}

impl ReconcileState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Pushed | Self::Pulled | Self::NoOp | Self::Failed)
    }
}

/// Local side of a decision, without the file handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalSummary {
    pub name: String,
    pub path: PathBuf,
    pub modified_at: DateTime<Utc>,
}

impl From<&LocalFileRecord> for LocalSummary {
    fn from(record: &LocalFileRecord) -> Self {
        Self {
            name: record.name.clone(),
            path: record.path.clone(),
            modified_at: record.modified_at,
        }
    }
}

/// Lookups and decision of a run, without a transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPlan {
    pub action: DecisionKind,
    pub remote_name: String,
    pub local: LocalSummary,
    pub remote: RemoteObjectRecord,
}

/// Result of a successful run. `NoOp` transfers nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    pub action: DecisionKind,
    pub remote_name: String,
    pub local: Option<LocalSummary>,
    pub remote: Option<RemoteObjectRecord>,
    pub bytes: u64,
    pub version: Option<VersionId>,
    pub written_to: Option<PathBuf>,
    /// Previous local file, moved aside by a `KeepBoth` pull.
    pub kept_as: Option<PathBuf>,
}

impl SyncOutcome {
    fn from_report(
        action: DecisionKind,
        remote_name: String,
        local: Option<LocalSummary>,
        remote: Option<RemoteObjectRecord>,
        report: TransferReport,
    ) -> Self {
        Self {
            action,
            remote_name,
            local,
            remote,
            bytes: report.bytes,
            version: Some(report.version),
            written_to: report.written_to,
            kept_as: report.kept_as,
        }
    }
}

/// One-shot reconciliation between a local directory and one remote.
pub struct Reconciler {
    request: SyncRequest,
    local: LocalInspector,
    remote: RemoteInspector,
    policy: PullPolicy,
    state: ReconcileState,
    progress_tx: Option<mpsc::Sender<ReconcileState>>,
}

impl Reconciler {
    pub fn new(request: SyncRequest, remotes: Vec<RemoteConfig>, factory: Arc<dyn StoreFactory>) -> Self {
        Self {
            local: LocalInspector::new(request.directory.clone()),
            remote: RemoteInspector::new(remotes, factory),
            request,
            policy: PullPolicy::default(),
            state: ReconcileState::Idle,
            progress_tx: None,
        }
    }

    pub fn with_selection(mut self, selection: RemoteSelection) -> Self {
        self.remote = self.remote.with_selection(selection);
        self
    }

    pub fn with_pull_policy(mut self, policy: PullPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Report every state transition on `progress_tx`.
    pub fn with_progress(mut self, progress_tx: mpsc::Sender<ReconcileState>) -> Self {
        self.progress_tx = Some(progress_tx);
        self
    }

    async fn transition(&mut self, state: ReconcileState) {
        debug!(from = ?self.state, to = ?state, "reconciler transition");
        self.state = state;
        if let Some(ref tx) = self.progress_tx {
            let _ = tx.send(state).await;
        }
    }

    async fn fail<T>(&mut self, err: SyncError) -> Result<T> {
        warn!(error = %err, "reconciliation failed");
        self.transition(ReconcileState::Failed).await;
        Err(err)
    }

    /// Run both lookups concurrently and wait for both.
    ///
    /// Neither lookup is cancelled when the other fails. When both fail,
    /// both errors are reported.
    async fn lookups(&mut self, key: &str) -> (Result<LocalFileRecord>, Result<RemoteLookup>) {
        self.transition(ReconcileState::LookupInFlight).await;
        info!(key, directory = %self.request.directory.display(), "starting lookups");

        tokio::join!(self.local.inspect(&self.request.selector), self.remote.lookup(key))
    }

    fn join_errors<L, R>(local: Result<L>, remote: Result<R>) -> Result<(L, R)> {
        match (local, remote) {
            (Ok(l), Ok(r)) => Ok((l, r)),
            (Err(e), Ok(_)) | (Ok(_), Err(e)) => Err(e),
            (Err(l), Err(r)) => Err(SyncError::BothLookupsFailed {
                local: Box::new(l),
                remote: Box::new(r),
            }),
        }
    }

    /// Lookups plus the decision rule, requiring a remote version.
    async fn decide(&mut self, key: &str) -> Result<(SyncDecision, RemoteLookup)> {
        let (local, remote) = self.lookups(key).await;
        let remote = remote.and_then(RemoteLookup::require_latest);

        let (local, (lookup, latest)) = match Self::join_errors(local, remote) {
            Ok(found) => found,
            Err(e) => return self.fail(e).await,
        };

        let decision = SyncDecision::decide(local, latest);
        info!(
            action = %decision.kind(),
            local = %decision.local().name,
            local_modified = %decision.local().modified_at,
            remote_version = %decision.remote().version_id,
            remote_modified = %decision.remote().last_modified,
            "{}",
            decision.kind().description()
        );
        self.transition(ReconcileState::Decided(decision.kind())).await;
        Ok((decision, lookup))
    }

    /// Inspect both sides and decide, without transferring.
    pub async fn plan(mut self) -> Result<SyncPlan> {
        let key = match self.request.key() {
            Ok(key) => key,
            Err(e) => return self.fail(e).await,
        };
        let (decision, lookup) = self.decide(&key).await?;
        Ok(SyncPlan {
            action: decision.kind(),
            remote_name: lookup.remote.name,
            local: LocalSummary::from(decision.local()),
            remote: decision.remote().clone(),
        })
    }

    /// Full reconciliation: decide and execute.
    pub async fn run(mut self) -> Result<SyncOutcome> {
        let key = match self.request.key() {
            Ok(key) => key,
            Err(e) => return self.fail(e).await,
        };
        let (decision, lookup) = self.decide(&key).await?;
        let local = Some(LocalSummary::from(decision.local()));
        let remote_name = lookup.remote.name.clone();
        let executor = TransferExecutor::new(lookup.store, self.policy);

        match decision {
            SyncDecision::NoOp { remote, .. } => {
                self.transition(ReconcileState::NoOp).await;
                Ok(SyncOutcome {
                    action: DecisionKind::NoOp,
                    remote_name,
                    local,
                    remote: Some(remote),
                    bytes: 0,
                    version: None,
                    written_to: None,
                    kept_as: None,
                })
            }
            SyncDecision::Push { local: record, remote } => match executor.push(record).await {
                Ok(report) => {
                    self.transition(ReconcileState::Pushed).await;
                    Ok(SyncOutcome::from_report(DecisionKind::Push, remote_name, local, Some(remote), report))
                }
                Err(e) => self.fail(e).await,
            },
            SyncDecision::Pull { local: record, remote } => {
                let destination = record.path.clone();
                match executor.pull(&destination, Some(record), &remote).await {
                    Ok(report) => {
                        self.transition(ReconcileState::Pulled).await;
                        Ok(SyncOutcome::from_report(DecisionKind::Pull, remote_name, local, Some(remote), report))
                    }
                    Err(e) => self.fail(e).await,
                }
            }
        }
    }

    /// Push the newest local file regardless of timestamps.
    ///
    /// An empty remote is accepted (first upload).
    pub async fn push_forced(mut self) -> Result<SyncOutcome> {
        let key = match self.request.key() {
            Ok(key) => key,
            Err(e) => return self.fail(e).await,
        };
        let (local, remote) = self.lookups(&key).await;
        let (record, lookup) = match Self::join_errors(local, remote) {
            Ok(found) => found,
            Err(e) => return self.fail(e).await,
        };
        self.transition(ReconcileState::Decided(DecisionKind::Push)).await;

        let summary = Some(LocalSummary::from(&record));
        let executor = TransferExecutor::new(lookup.store, self.policy);
        match executor.push(record).await {
            Ok(report) => {
                self.transition(ReconcileState::Pushed).await;
                Ok(SyncOutcome::from_report(
                    DecisionKind::Push,
                    lookup.remote.name,
                    summary,
                    lookup.latest,
                    report,
                ))
            }
            Err(e) => self.fail(e).await,
        }
    }

    /// Pull the latest remote version regardless of timestamps.
    ///
    /// A missing local file is not an error: the version is written to
    /// `<directory>/<key>`.
    pub async fn pull_forced(mut self) -> Result<SyncOutcome> {
        let key = match self.request.key() {
            Ok(key) => key,
            Err(e) => return self.fail(e).await,
        };
        let (local, remote) = self.lookups(&key).await;
        let local = match local {
            Ok(record) => Ok(Some(record)),
            Err(SyncError::NotFound { .. }) | Err(SyncError::NoCandidates { .. }) => Ok(None),
            Err(e) => Err(e),
        };
        let remote = remote.and_then(RemoteLookup::require_latest);
        let (record, (lookup, latest)) = match Self::join_errors(local, remote) {
            Ok(found) => found,
            Err(e) => return self.fail(e).await,
        };
        self.transition(ReconcileState::Decided(DecisionKind::Pull)).await;

        let summary = record.as_ref().map(LocalSummary::from);
        let destination = match &record {
            Some(r) => r.path.clone(),
            None => self.request.directory.join(&key),
        };
        let executor = TransferExecutor::new(lookup.store, self.policy);
        match executor.pull(&destination, record, &latest).await {
            Ok(report) => {
                self.transition(ReconcileState::Pulled).await;
                Ok(SyncOutcome::from_report(
                    DecisionKind::Pull,
                    lookup.remote.name,
                    summary,
                    Some(latest),
                    report,
                ))
            }
            Err(e) => self.fail(e).await,
        }
    }
}

/// Push the newest local file to every configured remote, one after another.
///
/// Each remote gets a single attempt; a failure does not stop the others.
pub async fn sync_all(
    request: &SyncRequest,
    remotes: &[RemoteConfig],
    factory: Arc<dyn StoreFactory>,
) -> Vec<(String, Result<SyncOutcome>)> {
    let mut results = Vec::with_capacity(remotes.len());
    for remote in remotes {
        let outcome = Reconciler::new(request.clone(), remotes.to_vec(), Arc::clone(&factory))
            .with_selection(RemoteSelection::Named(remote.name.clone()))
            .push_forced()
            .await;
        results.push((remote.name.clone(), outcome));
    }
    results
}
