//! FeedbackFanout - offers every accepted record to all sinks

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

use contracts::{FeedbackRecord, FeedbackSink, SinkConfig, SinkType, WarehouseConfig};

use crate::error::DispatcherError;
use crate::handle::SinkHandle;
use crate::metrics::MetricsSnapshot;
use crate::report::FanoutReport;
use crate::sinks::{DelimitedFileSink, IndexSink, LogSink};

/// Builder for creating a FeedbackFanout from configuration
pub struct FanoutBuilder {
    sinks: Vec<SinkConfig>,
    warehouse: WarehouseConfig,
}

impl FanoutBuilder {
    /// Create a new FanoutBuilder
    pub fn new(sinks: Vec<SinkConfig>, warehouse: WarehouseConfig) -> Self {
        Self { sinks, warehouse }
    }

    /// Build the fan-out and start one worker per sink
    ///
    /// Must be called inside a tokio runtime.
    #[instrument(
        name = "fanout_builder_build",
        skip(self),
        fields(sink_count = self.sinks.len())
    )]
    pub fn build(self) -> Result<FeedbackFanout, DispatcherError> {
        let mut fanout = FeedbackFanout::new();
        for config in &self.sinks {
            fanout.register(create_sink_handle(config, &self.warehouse)?);
        }
        info!(sinks = ?fanout.sink_names(), "Fan-out ready");
        Ok(fanout)
    }
}

/// Create a SinkHandle from configuration
#[instrument(
    name = "fanout_create_sink_handle",
    skip(config, warehouse),
    fields(sink = %config.name, sink_type = ?config.sink_type)
)]
fn create_sink_handle(
    config: &SinkConfig,
    warehouse: &WarehouseConfig,
) -> Result<SinkHandle, DispatcherError> {
    match config.sink_type {
        SinkType::Log => Ok(spawn(LogSink::new(&config.name), config)),
        SinkType::Delimited => {
            let sink = DelimitedFileSink::from_config(config, warehouse)?;
            Ok(spawn(sink, config))
        }
        SinkType::Index => {
            let sink = IndexSink::from_config(config, warehouse)?;
            Ok(spawn(sink, config))
        }
    }
}

fn spawn<S: FeedbackSink + 'static>(sink: S, config: &SinkConfig) -> SinkHandle {
    SinkHandle::spawn(sink, config.queue_capacity)
}

/// Fans each record out to every registered sink
///
/// Registration order is write order. Shared across requests behind an `Arc`;
/// per-sink serialization is handled by the handles.
#[derive(Default)]
pub struct FeedbackFanout {
    handles: Vec<SinkHandle>,
}

impl FeedbackFanout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sink handle
    pub fn register(&mut self, handle: SinkHandle) {
        debug!(sink = %handle.name(), position = self.handles.len(), "Sink registered");
        self.handles.push(handle);
    }

    /// Spawn a worker for `sink` and register it
    pub fn register_sink<S: FeedbackSink + 'static>(&mut self, sink: S, queue_capacity: usize) {
        self.register(SinkHandle::spawn(sink, queue_capacity));
    }

    pub fn sink_names(&self) -> Vec<&str> {
        self.handles.iter().map(SinkHandle::name).collect()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Sinks whose worker is no longer running
    pub fn stopped_sinks(&self) -> Vec<&str> {
        self.handles
            .iter()
            .filter(|h| h.is_stopped())
            .map(SinkHandle::name)
            .collect()
    }

    /// Get metrics for all sinks
    pub fn metrics(&self) -> Vec<(String, MetricsSnapshot)> {
        self.handles
            .iter()
            .map(|h| (h.name().to_string(), h.metrics().snapshot()))
            .collect()
    }

    /// Offer a record to every sink, in order
    ///
    /// Every sink is attempted even after a failure; the report says which
    /// ones stored the record.
    #[instrument(name = "fanout_write", skip_all, fields(sinks = self.handles.len()))]
    pub async fn write(&self, record: &Arc<FeedbackRecord>) -> FanoutReport {
        let started = Instant::now();
        let mut report = FanoutReport::default();

        for handle in &self.handles {
            let result = handle.write(Arc::clone(record)).await;
            report.record(handle.name(), result);
        }

        observability::record_fanout_latency(started.elapsed());
        if report.is_partial() {
            observability::record_fanout_partial();
        }
        if !report.failures().is_empty() {
            warn!(
                stored = report.succeeded().len(),
                failed = report.failures().len(),
                "Record not stored by every sink"
            );
        }
        report
    }

    /// Close every sink regardless of earlier failures
    #[instrument(name = "fanout_close_all", skip(self))]
    pub async fn close_all(&self) -> FanoutReport {
        let mut report = FanoutReport::default();
        for handle in &self.handles {
            let result = handle.close().await;
            if let Err(e) = &result {
                warn!(sink = %handle.name(), error = %e, "Sink did not close cleanly");
            }
            report.record(handle.name(), result);
        }
        info!(
            closed = report.succeeded().len(),
            failed = report.failures().len(),
            "Fan-out closed"
        );
        report
    }
}

/// Convenience function to create a fan-out from sink configs
pub fn create_fanout(
    sink_configs: Vec<SinkConfig>,
    warehouse: WarehouseConfig,
) -> Result<FeedbackFanout, DispatcherError> {
    FanoutBuilder::new(sink_configs, warehouse).build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::tests::{record, MockSink};
    use contracts::ContractError;
    use std::collections::HashMap;
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn test_fanout_attempts_every_sink() {
        let first = MockSink::new("first");
        let last = MockSink::new("last");
        let first_count = Arc::clone(&first.write_count);
        let last_count = Arc::clone(&last.write_count);

        let mut fanout = FeedbackFanout::new();
        fanout.register_sink(first, 10);
        fanout.register_sink(MockSink::failing("broken"), 10);
        fanout.register_sink(last, 10);

        let report = fanout.write(&record("Berlin")).await;

        assert_eq!(report.attempted(), ["first", "broken", "last"]);
        assert_eq!(report.succeeded(), ["first", "last"]);
        assert!(report.is_partial());
        assert_eq!(report.failures()[0].sink, "broken");
        assert_eq!(first_count.load(Ordering::Relaxed), 1);
        assert_eq!(last_count.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_fanout_all_failed() {
        let mut fanout = FeedbackFanout::new();
        fanout.register_sink(MockSink::failing("a"), 4);
        fanout.register_sink(MockSink::failing("b"), 4);

        let report = fanout.write(&record("x")).await;
        assert!(report.all_failed());
        assert_eq!(report.failures().len(), 2);

        let metrics = fanout.metrics();
        assert_eq!(metrics[1].0, "b");
        assert_eq!(metrics[1].1.failed, 1);
    }

    #[tokio::test]
    async fn test_close_all_then_write() {
        let mut fanout = FeedbackFanout::new();
        fanout.register_sink(MockSink::new("a"), 4);
        fanout.register_sink(MockSink::new("b"), 4);

        assert!(fanout.close_all().await.is_success());

        let report = fanout.write(&record("late")).await;
        assert!(report.all_failed());
        assert!(report
            .failures()
            .iter()
            .all(|f| matches!(f.cause, ContractError::SinkClosed { .. })));

        // A second close reports the already-stopped workers
        assert!(fanout.close_all().await.all_failed());
    }

    #[tokio::test]
    async fn test_create_fanout_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let configs = vec![
            SinkConfig {
                name: "log".to_string(),
                sink_type: SinkType::Log,
                queue_capacity: 50,
                params: HashMap::new(),
            },
            SinkConfig {
                name: "tsv".to_string(),
                sink_type: SinkType::Delimited,
                queue_capacity: 50,
                params: HashMap::from([("path".to_string(), "feedback.tsv".to_string())]),
            },
        ];
        let warehouse = WarehouseConfig {
            root: dir.path().to_path_buf(),
        };

        let fanout = create_fanout(configs, warehouse).unwrap();
        assert_eq!(fanout.sink_names(), ["log", "tsv"]);

        assert!(fanout.write(&record("Berlin")).await.is_success());
        assert!(fanout.close_all().await.is_success());
        assert!(dir.path().join("feedback.tsv").exists());
    }

    #[tokio::test]
    async fn test_missing_path_fails_build() {
        let configs = vec![SinkConfig {
            name: "index".to_string(),
            sink_type: SinkType::Index,
            queue_capacity: 10,
            params: HashMap::new(),
        }];
        let err = create_fanout(configs, WarehouseConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, DispatcherError::SinkCreation { .. }));
    }
}
