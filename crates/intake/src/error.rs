//! Intake error types

use thiserror::Error;

use crate::BatchFormat;

/// Reasons a single submission is rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Required field absent or blank
    #[error("&{field} must be filled")]
    MissingField {
        /// Field name
        field: &'static str,
    },

    /// Non-empty url that does not parse as an absolute URL
    #[error("the informed &url is not a valid one: '{value}'")]
    MalformedUrl {
        /// Submitted value
        value: String,
    },

    /// Offset that is not a non-negative integer
    #[error("&offset must be a non-negative integer, got '{value}'")]
    InvalidOffset {
        /// Submitted value
        value: String,
    },

    /// Verdict outside the closed set
    #[error("&feedback must be one of [correct, incorrect], got '{value}'")]
    InvalidFeedbackValue {
        /// Submitted value
        value: String,
    },

    /// Boolean field with an unrecognized value
    #[error("&{field} must be a boolean, got '{value}'")]
    InvalidFlag {
        /// Field name
        field: &'static str,
        /// Submitted value
        value: String,
    },
}

impl ValidationError {
    /// Short machine-readable reason (metric label)
    pub fn reason(&self) -> &'static str {
        match self {
            Self::MissingField { .. } => "missing_field",
            Self::MalformedUrl { .. } => "malformed_url",
            Self::InvalidOffset { .. } => "invalid_offset",
            Self::InvalidFeedbackValue { .. } => "invalid_feedback_value",
            Self::InvalidFlag { .. } => "invalid_flag",
        }
    }
}

/// Reasons a whole batch is rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchError {
    /// Payload could not be decoded
    #[error("failed to parse {format} batch: {message}")]
    Parse {
        /// Payload encoding
        format: BatchFormat,
        /// Decoder message
        message: String,
    },

    /// Payload decoded to zero items
    #[error("batch contains no feedback items")]
    Empty,

    /// One item failed validation; the batch is rejected as a whole
    #[error("batch item {index} is invalid: {source}")]
    Item {
        /// Zero-based item position
        index: usize,
        /// Validation failure of that item
        #[source]
        source: ValidationError,
    },
}

impl BatchError {
    pub(crate) fn json(message: impl Into<String>) -> Self {
        Self::Parse {
            format: BatchFormat::Json,
            message: message.into(),
        }
    }

    pub(crate) fn xml(message: impl Into<String>) -> Self {
        Self::Parse {
            format: BatchFormat::Xml,
            message: message.into(),
        }
    }

    /// Short machine-readable reason (metric label)
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Parse { .. } => "batch_parse",
            Self::Empty => "batch_empty",
            Self::Item { .. } => "batch_item",
        }
    }
}
