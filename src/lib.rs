// Library module for keepsync
// Re-exports modules for use in integration tests and the CLI binary

pub mod config;
pub mod error;
pub mod fs;
pub mod remote;
pub mod sync;

pub use config::{default_remote, RemoteConfig, SyncConfigFile};
pub use error::{ConfigError, ErrorKind, Result, SyncError};
pub use fs::{DatabaseSelector, LocalFileRecord, LocalInspector};
pub use remote::{RemoteInspector, RemoteObjectRecord, RemoteSelection, RemoteStore, StoreFactory, VersionId};
pub use sync::{DecisionKind, PullPolicy, Reconciler, SyncDecision, SyncOutcome, SyncPlan, SyncRequest};
