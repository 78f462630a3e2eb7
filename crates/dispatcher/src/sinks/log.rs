//! LogSink - logs a feedback summary via tracing

use contracts::{ContractError, FeedbackRecord, FeedbackSink};
use tracing::{info, instrument};

/// Sink that logs record summaries for debugging
pub struct LogSink {
    name: String,
}

impl LogSink {
    /// Create a new LogSink with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    fn log_summary(&self, record: &FeedbackRecord) {
        info!(
            sink = %self.name,
            doc_url = %record.doc_url,
            entity = %record.entity_uri,
            surface_form = %record.surface_form,
            offset = record.offset_or_sentinel(),
            verdict = %record.verdict,
            manual = record.is_manual,
            systems = record.systems.len(),
            "Feedback received"
        );
    }
}

impl FeedbackSink for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(name = "log_sink_write", skip(self, record), fields(sink = %self.name))]
    async fn write(&mut self, record: &FeedbackRecord) -> Result<(), ContractError> {
        self.log_summary(record);
        Ok(())
    }

    #[instrument(name = "log_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        // Nothing to flush for log sink
        Ok(())
    }

    #[instrument(name = "log_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        info!(sink = %self.name, "LogSink closed");
        Ok(())
    }
}
