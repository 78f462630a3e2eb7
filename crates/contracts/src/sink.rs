//! FeedbackSink trait - persistence interface for the fan-out
//!
//! Defines the abstract interface for feedback stores.

use crate::{ContractError, FeedbackRecord};

/// Durable feedback store
///
/// All store implementations must implement this trait. Each implementation
/// documents when a write becomes durable.
#[trait_variant::make(FeedbackSink: Send)]
pub trait LocalFeedbackSink {
    /// Sink name (used for logging/metrics and error attribution)
    fn name(&self) -> &str;

    /// Persist one feedback record
    ///
    /// # Errors
    /// Returns write error (should include context)
    async fn write(&mut self, record: &FeedbackRecord) -> Result<(), ContractError>;

    /// Flush buffer (if any)
    async fn flush(&mut self) -> Result<(), ContractError>;

    /// Close sink and release held resources
    async fn close(&mut self) -> Result<(), ContractError>;
}
