// Centralized error handling module
// One taxonomy for every failure a reconciliation run can report

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Direction of a transfer, used to label transfer failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Push,
    Pull,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Push => write!(f, "push"),
            Direction::Pull => write!(f, "pull"),
        }
    }
}

/// Configuration faults detected before or during the lookups.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no remote is marked as default")]
    NoDefaultRemote,

    #[error("more than one remote is marked as default: {}", names.join(", "))]
    MultipleDefaultRemotes { names: Vec<String> },

    #[error("no remote named '{name}' is configured")]
    UnknownRemote { name: String },

    #[error("a remote named '{name}' already exists")]
    DuplicateRemote { name: String },

    #[error("invalid database pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("database name is required to locate the remote object when scanning by pattern")]
    MissingDatabaseName,

    #[error("config file {}: {reason}", path.display())]
    ConfigFile { path: PathBuf, reason: String },
}

/// Main error type for the reconciliation engine.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("database file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("no database files matching '{pattern}' found in {}", dir.display())]
    NoCandidates { dir: PathBuf, pattern: String },

    #[error("no version of '{key}' found on {location}")]
    NoVersionFound { key: String, location: String },

    #[error("remote {location} unavailable: {reason}")]
    RemoteUnavailable { location: String, reason: String },

    #[error("I/O error while {operation}{}: {source}", path_suffix(path))]
    Io {
        path: Option<PathBuf>,
        operation: String,
        #[source]
        source: io::Error,
    },

    #[error("{direction} failed: {reason}")]
    Transfer { direction: Direction, reason: String },

    #[error("local lookup failed ({local}); remote lookup failed ({remote})")]
    BothLookupsFailed {
        local: Box<SyncError>,
        remote: Box<SyncError>,
    },
}

fn path_suffix(path: &Option<PathBuf>) -> String {
    match path {
        Some(p) => format!(" {}", p.display()),
        None => String::new(),
    }
}

/// Coarse error classification, stable for matching and exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Config,
    NotFound,
    NoCandidates,
    NoVersionFound,
    RemoteUnavailable,
    Io,
    Transfer,
    BothLookupsFailed,
}

impl SyncError {
    /// Io error on a directory. A missing directory is not a missing database.
    pub fn directory_error(err: io::Error, operation: &str, path: PathBuf) -> Self {
        SyncError::Io {
            path: Some(path),
            operation: operation.to_string(),
            source: err,
        }
    }

    /// Create an Io error with context, mapping a missing file to `NotFound`.
    pub fn from_io_error(err: io::Error, operation: &str, path: Option<PathBuf>) -> Self {
        match (err.kind(), path) {
            (io::ErrorKind::NotFound, Some(path)) => SyncError::NotFound { path },
            (_, path) => SyncError::Io {
                path,
                operation: operation.to_string(),
                source: err,
            },
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Config(_) => ErrorKind::Config,
            SyncError::NotFound { .. } => ErrorKind::NotFound,
            SyncError::NoCandidates { .. } => ErrorKind::NoCandidates,
            SyncError::NoVersionFound { .. } => ErrorKind::NoVersionFound,
            SyncError::RemoteUnavailable { .. } => ErrorKind::RemoteUnavailable,
            SyncError::Io { .. } => ErrorKind::Io,
            SyncError::Transfer { .. } => ErrorKind::Transfer,
            SyncError::BothLookupsFailed { .. } => ErrorKind::BothLookupsFailed,
        }
    }

    /// One-line hint for the user, printed under the error by the CLI.
    pub fn suggestion(&self) -> &'static str {
        match self {
            SyncError::Config(ConfigError::NoDefaultRemote) => {
                "Mark one remote as default with 'keepsync remote set-default <name>'"
            }
            SyncError::Config(ConfigError::MultipleDefaultRemotes { .. }) => {
                "Edit the config so that exactly one remote has 'default: true'"
            }
            SyncError::Config(ConfigError::MissingDatabaseName) => {
                "Set 'db_name' in the config or pass --file with the exact database name"
            }
            SyncError::Config(_) => "Check the config file and command line arguments",
            SyncError::NotFound { .. } => "Check that the database file name is correct",
            SyncError::NoCandidates { .. } => {
                "Check the directory and pattern, or pass --file with an exact name"
            }
            SyncError::NoVersionFound { .. } => {
                "Run 'keepsync push' to upload the first version of the database"
            }
            SyncError::RemoteUnavailable { .. } => {
                "Check the endpoint, network connectivity and the remote credentials"
            }
            SyncError::Io { .. } => "Check file permissions and disk space",
            SyncError::Transfer { .. } => "Nothing was retried; run the sync again",
            SyncError::BothLookupsFailed { .. } => "Fix the local and the remote errors above",
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
