//! Remote and database configuration.
//!
//! The options file is JSON or YAML (picked by extension) and carries the
//! database name/pattern plus the list of configured remotes. Exactly one
//! remote is expected to be the default one; the engine refuses to guess when
//! there is none or several.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::fs::types::DatabaseSelector;
use crate::remote::s3::S3Provider;
use crate::sync::transfer::PullPolicy;

/// A configured, credentialed versioned object-storage endpoint.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub name: String,
    /// Endpoint URL; empty means the provider default (AWS).
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub region: String,
    pub bucket: String,
    #[serde(rename = "api_id", default)]
    pub credential_id: String,
    #[serde(rename = "api_key", default)]
    pub credential_secret: String,
    #[serde(rename = "default", default)]
    pub is_default: bool,
}

impl fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("name", &self.name)
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("bucket", &self.bucket)
            .field("credential_id", &self.credential_id)
            .field("credential_secret", &"<redacted>")
            .field("is_default", &self.is_default)
            .finish()
    }
}

impl RemoteConfig {
    pub fn new(name: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            endpoint: String::new(),
            region: String::new(),
            bucket: bucket.into(),
            credential_id: String::new(),
            credential_secret: String::new(),
            is_default: false,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn with_credentials(mut self, id: impl Into<String>, secret: impl Into<String>) -> Self {
        self.credential_id = id.into();
        self.credential_secret = secret.into();
        self
    }

    pub fn as_default(mut self) -> Self {
        self.is_default = true;
        self
    }

    /// S3-compatible provider implied by the endpoint.
    pub fn provider(&self) -> S3Provider {
        if self.endpoint.is_empty() {
            S3Provider::Aws
        } else {
            S3Provider::Custom {
                name: self.name.clone(),
                endpoint: self.endpoint.clone(),
            }
        }
    }

    /// Region to hand to the SDK; S3-compatible services accept any value.
    pub fn effective_region(&self) -> &str {
        if self.region.is_empty() {
            "us-east-1"
        } else {
            &self.region
        }
    }

    /// Human-readable location, never containing credentials.
    pub fn location(&self) -> String {
        format!("{} (s3://{})", self.name, self.bucket)
    }
}

/// Pick the single remote marked as default.
pub fn default_remote(remotes: &[RemoteConfig]) -> Result<&RemoteConfig, ConfigError> {
    let defaults: Vec<&RemoteConfig> = remotes.iter().filter(|r| r.is_default).collect();
    match defaults.as_slice() {
        [] => Err(ConfigError::NoDefaultRemote),
        [only] => Ok(only),
        many => Err(ConfigError::MultipleDefaultRemotes {
            names: many.iter().map(|r| r.name.clone()).collect(),
        }),
    }
}

/// Pick a remote by name, regardless of its default flag.
pub fn remote_by_name<'a>(remotes: &'a [RemoteConfig], name: &str) -> Result<&'a RemoteConfig, ConfigError> {
    remotes
        .iter()
        .find(|r| r.name == name)
        .ok_or_else(|| ConfigError::UnknownRemote { name: name.to_string() })
}

/// Serialization format of the options file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Yaml,
}

impl ConfigFormat {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Ok(Self::Json),
            Some("yaml") | Some("yml") => Ok(Self::Yaml),
            _ => Err(ConfigError::ConfigFile {
                path: path.to_path_buf(),
                reason: "extension must be .json, .yaml or .yml".to_string(),
            }),
        }
    }
}

/// Options file contents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfigFile {
    /// Logical database name; also the remote object key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_name: Option<String>,
    /// Regular expression used to scan for local candidates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_regex: Option<String>,
    /// Glob used to scan for local candidates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_glob: Option<String>,
    /// Directory holding the database; defaults to the working directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
    #[serde(default)]
    pub pull_policy: PullPolicy,
    #[serde(default)]
    pub remotes: Vec<RemoteConfig>,

    #[serde(skip)]
    path: PathBuf,
}

impl SyncConfigFile {
    /// Default location: `<config dir>/keepsync/config.yaml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("keepsync").join("config.yaml"))
    }

    /// Empty config bound to `path`, for first-time setup.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let format = ConfigFormat::from_path(path)?;
        let data = std::fs::read_to_string(path).map_err(|e| ConfigError::ConfigFile {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let mut config = Self::parse(&data, format).map_err(|reason| ConfigError::ConfigFile {
            path: path.to_path_buf(),
            reason,
        })?;
        config.path = path.to_path_buf();
        Ok(config)
    }

    pub fn parse(data: &str, format: ConfigFormat) -> Result<Self, String> {
        match format {
            ConfigFormat::Json => serde_json::from_str(data).map_err(|e| e.to_string()),
            ConfigFormat::Yaml => serde_yaml::from_str(data).map_err(|e| e.to_string()),
        }
    }

    /// Write the config back to the file it was loaded from, same format.
    pub fn save(&self) -> Result<(), ConfigError> {
        let format = ConfigFormat::from_path(&self.path)?;
        let file_error = |reason: String| ConfigError::ConfigFile {
            path: self.path.clone(),
            reason,
        };
        let data = match format {
            ConfigFormat::Json => serde_json::to_string_pretty(self).map_err(|e| file_error(e.to_string()))?,
            ConfigFormat::Yaml => serde_yaml::to_string(self).map_err(|e| file_error(e.to_string()))?,
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| file_error(e.to_string()))?;
        }
        std::fs::write(&self.path, data).map_err(|e| file_error(e.to_string()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Selector described by the file: regex first, then glob, then any `.kdbx`.
    pub fn selector(&self) -> DatabaseSelector {
        if let Some(regex) = &self.db_regex {
            DatabaseSelector::Pattern(regex.clone())
        } else if let Some(glob) = &self.db_glob {
            DatabaseSelector::Glob(glob.clone())
        } else if let Some(name) = &self.db_name {
            DatabaseSelector::Exact(name.clone())
        } else {
            DatabaseSelector::Any
        }
    }

    pub fn add_remote(&mut self, remote: RemoteConfig) -> Result<(), ConfigError> {
        if self.remotes.iter().any(|r| r.name == remote.name) {
            return Err(ConfigError::DuplicateRemote { name: remote.name });
        }
        if remote.is_default {
            for r in &mut self.remotes {
                r.is_default = false;
            }
        }
        self.remotes.push(remote);
        Ok(())
    }

    pub fn remove_remote(&mut self, name: &str) -> Result<RemoteConfig, ConfigError> {
        let idx = self
            .remotes
            .iter()
            .position(|r| r.name == name)
            .ok_or_else(|| ConfigError::UnknownRemote { name: name.to_string() })?;
        Ok(self.remotes.remove(idx))
    }

    /// Make `name` the only default remote.
    pub fn set_default(&mut self, name: &str) -> Result<(), ConfigError> {
        remote_by_name(&self.remotes, name)?;
        for r in &mut self.remotes {
            r.is_default = r.name == name;
        }
        Ok(())
    }
}
