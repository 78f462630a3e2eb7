//! # Contracts
//!
//! Frozen interface contracts shared by every crate in the feedback warehouse.
//! Business crates depend on this crate only; reverse dependencies are prohibited.
//!
//! ## Record lifecycle
//! - `RawFeedback` is untrusted input straight from the request
//! - `FeedbackRecord` is built exactly once by the validator and never mutated
//! - sinks receive the record by reference and keep no identity for it

mod blueprint;
mod error;
mod raw;
mod record;
mod sink;

pub use blueprint::*;
pub use error::*;
pub use raw::{fields, RawFeedback};
pub use record::*;
pub use sink::*;
