//! Endpoint error types
//!
//! Every failure is turned into a client response here; nothing reaches the
//! transport as a 5xx.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use std::error::Error as StdError;
use std::fmt::Write as _;
use thiserror::Error;

use intake::{BatchError, ValidationError};

use crate::endpoint::RecordFailure;

/// Reasons a submission is not accepted
#[derive(Debug, Error)]
pub enum EndpointError {
    /// Missing or unknown API key
    #[error("unauthorized: {reason}")]
    Unauthorized { reason: String },

    /// Single submission failed validation
    #[error("invalid feedback: {0}")]
    Validation(#[from] ValidationError),

    /// Batch payload rejected as a whole
    #[error("invalid batch: {0}")]
    Batch(#[from] BatchError),

    /// Sinks could not store the feedback as the delivery policy requires
    #[error(
        "feedback not stored as required: {not_stored} of {total} record(s) reached no sink, {} sink failure(s)",
        .failures.len()
    )]
    Delivery {
        total: usize,
        not_stored: usize,
        failures: Vec<RecordFailure>,
    },

    /// Anything else; the message carries the full error chain
    #[error("unexpected error: {0}")]
    Unknown(String),
}

impl EndpointError {
    /// Wrap an arbitrary error, keeping its source chain for diagnosis
    pub fn unknown(err: &(dyn StdError + 'static)) -> Self {
        Self::Unknown(error_chain(err))
    }

    /// Short machine-readable reason (metric label)
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Unauthorized { .. } => "unauthorized",
            Self::Validation(e) => e.reason(),
            Self::Batch(e) => e.reason(),
            Self::Delivery { .. } => "delivery",
            Self::Unknown(_) => "unknown",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    /// Human-readable body: the message plus one line per sink failure
    pub fn body(&self) -> String {
        let mut body = self.to_string();
        if let Self::Delivery { failures, .. } = self {
            for failure in failures {
                let _ = write!(body, "\n  {}", failure);
            }
        }
        body
    }
}

/// `outer: inner: root` rendering of an error and its sources
pub fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut chain = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let _ = write!(chain, ": {}", cause);
        source = cause.source();
    }
    chain
}

impl IntoResponse for EndpointError {
    fn into_response(self) -> Response {
        (
            self.status(),
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            self.body(),
        )
            .into_response()
    }
}

/// Failures while starting or running the HTTP service
#[derive(Debug, Error)]
pub enum ServerError {
    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(#[from] contracts::ContractError),

    /// Sinks could not be created
    #[error("dispatcher error: {0}")]
    Dispatcher(#[from] dispatcher::DispatcherError),

    /// Bind / accept failure
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
