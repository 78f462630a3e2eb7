//! # Endpoint
//!
//! Feedback intake endpoint.
//!
//! Responsibilities:
//! - Authenticate the submitting client (fails closed)
//! - Validate discrete fields or a JSON/XML batch into `FeedbackRecord`s
//! - Fan every record out to the long-lived sinks and apply the partial-failure policy
//! - Expose the whole thing over HTTP (`POST /feedback`, `GET /health`)

pub mod auth;
pub mod endpoint;
pub mod error;
pub mod http;
pub mod server;

pub use auth::{Authenticator, KeyAuthenticator};
pub use endpoint::{Accepted, FeedbackEndpoint, RecordFailure};
pub use error::{EndpointError, ServerError};
pub use http::{build_router, AppState, WARNINGS_HEADER};
pub use server::FeedbackServer;
