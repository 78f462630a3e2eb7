//! Error types for CLI operations.

use std::path::Path;
use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Configuration invalid after command-line overrides
    #[error("Configuration validation failed: {message}")]
    ConfigValidation { message: String },

    /// Batch file encoding could not be inferred
    #[error("Cannot infer batch format of {path}; pass --format json|xml")]
    UnknownBatchFormat { path: String },

    /// No matching index sink in the configuration
    #[error("No index sink{name} in configuration")]
    SinkNotFound { name: String },

    /// Import stopped before writing anything
    #[error("Batch rejected: {message}")]
    BatchRejected { message: String },
}

impl CliError {
    pub fn config_not_found(path: &Path) -> Self {
        Self::ConfigNotFound {
            path: path.display().to_string(),
        }
    }

    pub fn config_validation(message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            message: message.into(),
        }
    }

    pub fn unknown_batch_format(path: &Path) -> Self {
        Self::UnknownBatchFormat {
            path: path.display().to_string(),
        }
    }

    pub fn sink_not_found(name: Option<&str>) -> Self {
        Self::SinkNotFound {
            name: name.map(|n| format!(" '{}'", n)).unwrap_or_default(),
        }
    }

    pub fn batch_rejected(message: impl Into<String>) -> Self {
        Self::BatchRejected {
            message: message.into(),
        }
    }
}
