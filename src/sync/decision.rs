//! Latest-timestamp-wins decision between the local file and the remote version.

use chrono::{DateTime, Utc};
use std::cmp::Ordering;

use crate::fs::LocalFileRecord;
use crate::remote::RemoteObjectRecord;

/// What a reconciliation decided, without the records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionKind {
    /// Local is newer: upload it as a new remote version.
    Push,
    /// Remote is newer: download its latest version.
    Pull,
    /// Same instant on both sides: already synchronized.
    NoOp,
}

impl DecisionKind {
    /// Compare modification instants at full (nanosecond) resolution.
    pub fn from_times(local: DateTime<Utc>, remote: DateTime<Utc>) -> Self {
        match local.cmp(&remote) {
            Ordering::Greater => Self::Push,
            Ordering::Less => Self::Pull,
            Ordering::Equal => Self::NoOp,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Push => "local copy is newer, pushing to remote",
            Self::Pull => "remote copy is newer, pulling to local",
            Self::NoOp => "already synchronized",
        }
    }
}

impl std::fmt::Display for DecisionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Push => write!(f, "push"),
            Self::Pull => write!(f, "pull"),
            Self::NoOp => write!(f, "no-op"),
        }
    }
}

/// A decision carrying the records needed to execute it.
#[derive(Debug)]
pub enum SyncDecision {
    Push {
        local: LocalFileRecord,
        remote: RemoteObjectRecord,
    },
    Pull {
        local: LocalFileRecord,
        remote: RemoteObjectRecord,
    },
    NoOp {
        local: LocalFileRecord,
        remote: RemoteObjectRecord,
    },
}

impl SyncDecision {
    pub fn decide(local: LocalFileRecord, remote: RemoteObjectRecord) -> Self {
        match DecisionKind::from_times(local.modified_at, remote.last_modified) {
            DecisionKind::Push => Self::Push { local, remote },
            DecisionKind::Pull => Self::Pull { local, remote },
            DecisionKind::NoOp => Self::NoOp { local, remote },
        }
    }

    pub fn kind(&self) -> DecisionKind {
        match self {
            Self::Push { .. } => DecisionKind::Push,
            Self::Pull { .. } => DecisionKind::Pull,
            Self::NoOp { .. } => DecisionKind::NoOp,
        }
    }

    pub fn local(&self) -> &LocalFileRecord {
        match self {
            Self::Push { local, .. } | Self::Pull { local, .. } | Self::NoOp { local, .. } => local,
        }
    }

    pub fn remote(&self) -> &RemoteObjectRecord {
        match self {
            Self::Push { remote, .. } | Self::Pull { remote, .. } | Self::NoOp { remote, .. } => remote,
        }
    }
}
