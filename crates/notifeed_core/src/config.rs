//! Engine configuration.
//!
//! # Responsibility
//! - Collect the policy knobs of one engine instance.
//! - Load them from a JSON document where every field is optional.

use crate::diagnostics::DEFAULT_DIAGNOSTICS_CAPACITY;
use crate::reconcile::priority::PriorityTable;
use crate::reconcile::retention::RetentionPolicy;
use crate::store::worker::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

/// Configuration of one notification engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub priorities: PriorityTable,
    pub retention: RetentionPolicy,
    pub persist_retry: RetryPolicy,
    pub diagnostics_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            priorities: PriorityTable::default(),
            retention: RetentionPolicy::default(),
            persist_retry: RetryPolicy::default(),
            diagnostics_capacity: DEFAULT_DIAGNOSTICS_CAPACITY,
        }
    }
}

impl EngineConfig {
    /// Parses a configuration document.
    ///
    /// # Errors
    /// - Returns `ConfigError::Parse` for malformed JSON or invalid policy.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Reads and parses a configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|err| ConfigError::Io {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        Self::from_json_str(&text)
    }
}

/// Configuration loading errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Io { path: PathBuf, message: String },
    Parse(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, message } => {
                write!(f, "failed to read config `{}`: {message}", path.display())
            }
            Self::Parse(message) => write!(f, "invalid engine config: {message}"),
        }
    }
}

impl Error for ConfigError {}
