//! # Intake
//!
//! Feedback intake module.
//!
//! Responsibilities:
//! - Turn untrusted `RawFeedback` into a validated `FeedbackRecord`
//! - Synthesize a deterministic document URL when none is supplied
//! - Decode JSON / XML batch payloads, all-or-nothing
//!
//! No I/O and no logging happens here; callers decide what to do with errors.
//!
//! ## Usage Example
//!
//! ```
//! use contracts::{RawFeedback, ValidationConfig};
//! use intake::Validator;
//!
//! let validator = Validator::new(&ValidationConfig::default()).unwrap();
//! let raw = RawFeedback::new()
//!     .with("text", "Barack Obama was president")
//!     .with("entity_uri", "http://dbpedia.org/resource/Barack_Obama")
//!     .with("surface_form", "Barack Obama")
//!     .with("feedback", "correct");
//!
//! let record = validator.validate(&raw).unwrap();
//! assert!(record.doc_url.as_str().starts_with("http://spotlight.dbpedia.org/id/"));
//! ```

mod batch;
mod error;
mod validator;

pub use batch::{parse_batch, BatchFormat};
pub use contracts::{FeedbackRecord, RawFeedback};
pub use error::{BatchError, ValidationError};
pub use validator::{placeholder_url, text_hash, Validator};
