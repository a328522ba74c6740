use chrono::{DateTime, Utc};
use globset::{Glob, GlobMatcher};
use regex::Regex;
use std::path::PathBuf;

use crate::error::ConfigError;

/// Canonical extension of KeePass databases.
pub const DATABASE_EXTENSION: &str = "kdbx";

/// How the local database file is chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseSelector {
    /// Open exactly this file name; no directory scan.
    Exact(String),
    /// Scan the directory for names matching a regular expression.
    Pattern(String),
    /// Scan the directory for names matching a glob (`*.kdbx`).
    Glob(String),
    /// Scan the directory for any file with the canonical extension.
    Any,
}

impl DatabaseSelector {
    /// Literal file name, if the selector names one.
    pub fn exact_name(&self) -> Option<&str> {
        match self {
            Self::Exact(name) => Some(name),
            _ => None,
        }
    }

    /// Compile the scanning selectors. `Exact` has no matcher.
    pub fn matcher(&self) -> Result<Option<NameMatcher>, ConfigError> {
        let invalid = |pattern: &str, reason: String| ConfigError::InvalidPattern {
            pattern: pattern.to_string(),
            reason,
        };
        match self {
            Self::Exact(_) => Ok(None),
            Self::Pattern(p) => Regex::new(p)
                .map(|r| Some(NameMatcher::Regex(r)))
                .map_err(|e| invalid(p, e.to_string())),
            Self::Glob(g) => Glob::new(g)
                .map(|g| Some(NameMatcher::Glob(g.compile_matcher())))
                .map_err(|e| invalid(g, e.to_string())),
            Self::Any => {
                let pattern = format!("*.{}", DATABASE_EXTENSION);
                Glob::new(&pattern)
                    .map(|g| Some(NameMatcher::Glob(g.compile_matcher())))
                    .map_err(|e| invalid(&pattern, e.to_string()))
            }
        }
    }

    /// Display form used in error messages.
    pub fn describe(&self) -> String {
        match self {
            Self::Exact(name) => name.clone(),
            Self::Pattern(p) => p.clone(),
            Self::Glob(g) => g.clone(),
            Self::Any => format!("*.{}", DATABASE_EXTENSION),
        }
    }
}

/// Compiled file name filter.
#[derive(Debug, Clone)]
pub enum NameMatcher {
    Regex(Regex),
    Glob(GlobMatcher),
}

impl NameMatcher {
    pub fn is_match(&self, name: &str) -> bool {
        match self {
            Self::Regex(r) => r.is_match(name),
            Self::Glob(g) => g.is_match(name),
        }
    }
}

/// The newest local database file, with an open handle to it.
///
/// `modified_at` is the last-write time observed during inspection; it is
/// not refreshed afterwards. The handle is owned by whoever holds the record
/// and is closed when the record is dropped.
#[derive(Debug)]
pub struct LocalFileRecord {
    pub name: String,
    pub path: PathBuf,
    pub modified_at: DateTime<Utc>,
    pub handle: tokio::fs::File,
}

/// Local file seen during a directory scan, before it is opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub name: String,
    pub path: PathBuf,
    pub modified: DateTime<Utc>,
}
