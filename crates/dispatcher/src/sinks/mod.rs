//! Sink implementations
//!
//! Contains LogSink, DelimitedFileSink, and IndexSink.

mod delimited;
mod index;
mod log;

pub use self::delimited::{DelimitedFileSink, DelimitedSinkConfig, COLUMNS};
pub use self::index::{FeedbackIndexReader, IndexQuery, IndexSink, IndexSinkConfig, IndexedFeedback};
pub use self::log::LogSink;
