//! Configuration for the bookmark service
//!
//! Configuration can come from a YAML/JSON file, from environment variables, or be built in
//! code:
//!
//! ```yaml
//! resume_mode: fan_out        # or: first
//! strict_registry: true
//! snapshot:
//!   path: /var/lib/engine/bookmarks.snapshot
//!   format: bincode           # or: json
//! stimuli:
//!   - name: OrderPaid
//!     correlation:
//!       fields: [orderId]
//!   - name: Approval
//!     correlation:
//!       excluded: [requestedAt]
//!       unordered: [approvers]
//! ```
//!
//! Environment variables (`<PREFIX>_RESUME_MODE`, `<PREFIX>_STRICT_REGISTRY`,
//! `<PREFIX>_SNAPSHOT_PATH`, `<PREFIX>_SNAPSHOT_FORMAT`) override defaults through
//! [`BookmarkConfig::from_env`].

use crate::error::{BookmarkError, Result};
use crate::registry::{StimulusDescriptor, StimulusRegistry};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// How many matches a stimulus resumes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResumeMode {
    /// Consume and resume every match
    #[default]
    FanOut,
    /// Stop after the first match that is actually consumed
    First,
}

impl FromStr for ResumeMode {
    type Err = BookmarkError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "fan_out" | "fanout" | "all" => Ok(Self::FanOut),
            "first" => Ok(Self::First),
            other => Err(BookmarkError::Config(format!("Invalid resume mode: {}", other))),
        }
    }
}

/// Encoding used for snapshot files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotFormat {
    #[default]
    Json,
    Bincode,
}

impl FromStr for SnapshotFormat {
    type Err = BookmarkError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "bincode" | "binary" => Ok(Self::Bincode),
            other => Err(BookmarkError::Config(format!("Invalid snapshot format: {}", other))),
        }
    }
}

/// Where and how snapshots are written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotConfig {
    pub path: PathBuf,

    #[serde(default)]
    pub format: SnapshotFormat,
}

impl SnapshotConfig {
    pub fn new(path: impl Into<PathBuf>, format: SnapshotFormat) -> Self {
        Self {
            path: path.into(),
            format,
        }
    }
}

/// Bookmark service configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookmarkConfig {
    /// Resumption strategy for `resume`
    #[serde(default)]
    pub resume_mode: ResumeMode,

    /// Reject stimulus names not listed in `stimuli`
    #[serde(default)]
    pub strict_registry: bool,

    /// Snapshot location, if the store is persisted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<SnapshotConfig>,

    /// Known stimuli and their correlation policies
    #[serde(default)]
    pub stimuli: Vec<StimulusDescriptor>,
}

impl BookmarkConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resume_mode(mut self, resume_mode: ResumeMode) -> Self {
        self.resume_mode = resume_mode;
        self
    }

    pub fn with_strict_registry(mut self, strict: bool) -> Self {
        self.strict_registry = strict;
        self
    }

    pub fn with_snapshot(mut self, snapshot: SnapshotConfig) -> Self {
        self.snapshot = Some(snapshot);
        self
    }

    pub fn with_stimulus(mut self, descriptor: StimulusDescriptor) -> Self {
        self.stimuli.push(descriptor);
        self
    }

    /// Load from a `.yaml`/`.yml` or `.json` file
    pub fn load_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| {
                BookmarkError::Config(format!("Unable to determine file extension for {:?}", path))
            })?;

        let config: Self = match extension.to_lowercase().as_str() {
            "yaml" | "yml" => parse_file(path, |content| {
                serde_yaml::from_str(content).map_err(|e| e.to_string())
            })?,
            "json" => parse_file(path, |content| {
                serde_json::from_str(content).map_err(|e| e.to_string())
            })?,
            _ => {
                return Err(BookmarkError::Config(format!(
                    "Unsupported config file extension: {}",
                    extension
                )))
            }
        };

        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by `<PREFIX>_*` environment variables
    pub fn from_env(prefix: &str) -> Result<Self> {
        let mut config = Self::default();

        if let Some(mode) = get_env(prefix, "RESUME_MODE") {
            config.resume_mode = mode.parse()?;
        }
        if let Some(strict) = get_env(prefix, "STRICT_REGISTRY") {
            config.strict_registry = parse_bool(&format!("{}_STRICT_REGISTRY", prefix), &strict)?;
        }
        if let Some(path) = get_env(prefix, "SNAPSHOT_PATH") {
            let format = match get_env(prefix, "SNAPSHOT_FORMAT") {
                Some(format) => format.parse()?,
                None => SnapshotFormat::default(),
            };
            config.snapshot = Some(SnapshotConfig::new(path, format));
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject empty or duplicate stimulus names and empty snapshot paths
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for descriptor in &self.stimuli {
            if descriptor.name.trim().is_empty() {
                return Err(BookmarkError::Config("stimulus name must not be empty".to_string()));
            }
            if !seen.insert(descriptor.name.as_str()) {
                return Err(BookmarkError::Config(format!(
                    "stimulus '{}' listed twice",
                    descriptor.name
                )));
            }
        }

        if let Some(snapshot) = &self.snapshot {
            if snapshot.path.as_os_str().is_empty() {
                return Err(BookmarkError::Config("snapshot path must not be empty".to_string()));
            }
        }

        Ok(())
    }

    /// Registry described by this configuration
    pub fn registry(&self) -> Result<StimulusRegistry> {
        StimulusRegistry::from_descriptors(self.stimuli.iter().cloned(), self.strict_registry)
    }
}

fn parse_file<T: DeserializeOwned>(
    path: &Path,
    parse: impl FnOnce(&str) -> std::result::Result<T, String>,
) -> Result<T> {
    let content = std::fs::read_to_string(path)?;
    parse(&content).map_err(|e| {
        BookmarkError::Config(format!("Failed to parse config from {:?}: {}", path, e))
    })
}

fn get_env(prefix: &str, key: &str) -> Option<String> {
    std::env::var(format!("{}_{}", prefix, key)).ok()
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(BookmarkError::Config(format!(
            "Invalid boolean value for '{}': {}",
            key, value
        ))),
    }
}
