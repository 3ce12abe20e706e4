//! Errors from settings and local state files

use std::fmt::Display;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Settings could not be loaded or failed validation
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    /// A state file could not be read or written
    #[error("Cannot access {}: {message}", path.display())]
    StateFile { path: PathBuf, message: String },

    /// A state file exists but does not hold valid JSON for its type
    #[error("Malformed {}: {message}", path.display())]
    Malformed { path: PathBuf, message: String },
}

impl CoreError {
    pub fn invalid_settings(message: impl Into<String>) -> Self {
        Self::InvalidSettings(message.into())
    }

    pub fn state_file(path: &Path, err: impl Display) -> Self {
        Self::StateFile {
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }

    pub fn malformed(path: &Path, err: impl Display) -> Self {
        Self::Malformed {
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }
}

impl From<config::ConfigError> for CoreError {
    fn from(err: config::ConfigError) -> Self {
        Self::invalid_settings(err.to_string())
    }
}

/// Write `content` to `path`, creating parent directories as needed
pub(crate) fn write_state_file(path: &Path, content: &str) -> CoreResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| CoreError::state_file(parent, e))?;
    }
    std::fs::write(path, content).map_err(|e| CoreError::state_file(path, e))
}
