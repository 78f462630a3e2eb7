//! Fan-out outcome reporting

use contracts::ContractError;
use thiserror::Error;

/// One sink's failure for one record
#[derive(Debug, Error)]
#[error("sink '{sink}' failed: {cause}")]
pub struct SinkError {
    /// Name of the failing sink
    pub sink: String,
    /// What went wrong
    #[source]
    pub cause: ContractError,
}

/// Outcome of offering one record to every registered sink
#[derive(Debug, Default)]
pub struct FanoutReport {
    attempted: Vec<String>,
    succeeded: Vec<String>,
    failures: Vec<SinkError>,
}

impl FanoutReport {
    /// Record one sink's result
    pub fn record(&mut self, sink: &str, result: Result<(), ContractError>) {
        self.attempted.push(sink.to_string());
        match result {
            Ok(()) => self.succeeded.push(sink.to_string()),
            Err(cause) => self.failures.push(SinkError {
                sink: sink.to_string(),
                cause,
            }),
        }
    }

    /// Sinks offered the record, in write order
    pub fn attempted(&self) -> &[String] {
        &self.attempted
    }

    /// Sinks that stored the record
    pub fn succeeded(&self) -> &[String] {
        &self.succeeded
    }

    pub fn failures(&self) -> &[SinkError] {
        &self.failures
    }

    pub fn into_failures(self) -> Vec<SinkError> {
        self.failures
    }

    /// At least one sink was offered the record and none failed
    pub fn is_success(&self) -> bool {
        !self.attempted.is_empty() && self.failures.is_empty()
    }

    /// Some sinks stored the record, some did not
    pub fn is_partial(&self) -> bool {
        !self.succeeded.is_empty() && !self.failures.is_empty()
    }

    /// The record is stored nowhere
    pub fn all_failed(&self) -> bool {
        self.succeeded.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        let mut report = FanoutReport::default();
        assert!(!report.is_success());
        assert!(report.all_failed());

        report.record("tsv", Ok(()));
        assert!(report.is_success());
        assert!(!report.is_partial());

        report.record("index", Err(ContractError::sink_write("index", "LockBusy")));
        assert!(!report.is_success());
        assert!(report.is_partial());
        assert!(!report.all_failed());
        assert_eq!(report.attempted(), ["tsv", "index"]);
        assert_eq!(report.failures()[0].sink, "index");
        assert!(report.failures()[0].to_string().contains("LockBusy"));
    }
}
