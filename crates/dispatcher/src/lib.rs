//! # Dispatcher
//!
//! Feedback fan-out module.
//!
//! Responsibilities:
//! - Own every configured sink behind a single-writer worker
//! - Fan out each accepted `FeedbackRecord` to all sinks, in registration order
//! - Attempt every sink and report partial failures instead of short-circuiting

pub mod error;
pub mod fanout;
pub mod handle;
pub mod metrics;
pub mod report;
pub mod sinks;

pub use contracts::{FeedbackRecord, FeedbackSink};
pub use error::DispatcherError;
pub use fanout::{create_fanout, FanoutBuilder, FeedbackFanout};
pub use handle::SinkHandle;
pub use metrics::{MetricsSnapshot, SinkMetrics};
pub use report::{FanoutReport, SinkError};
pub use sinks::{
    DelimitedFileSink, DelimitedSinkConfig, FeedbackIndexReader, IndexQuery, IndexSink,
    IndexSinkConfig, IndexedFeedback, LogSink, COLUMNS,
};
