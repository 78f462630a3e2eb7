//! FeedbackEndpoint - authenticate, validate, fan out, decide

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use contracts::{
    fields, ContractError, DeliveryPolicy, PartialFailurePolicy, RawFeedback, ServiceBlueprint,
};
use dispatcher::{FeedbackFanout, SinkError};
use intake::{parse_batch, BatchFormat, FeedbackRecord, Validator};

use crate::auth::{Authenticator, KeyAuthenticator};
use crate::error::EndpointError;

/// A sink failure attributed to one record of the request
#[derive(Debug)]
pub struct RecordFailure {
    /// Zero-based position of the record in the request
    pub record: usize,
    pub error: SinkError,
}

impl fmt::Display for RecordFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "record {}: {}", self.record, self.error)
    }
}

/// Successful outcome of one request
#[derive(Debug)]
pub struct Accepted {
    /// Records fanned out
    pub records: usize,
    /// Sink failures tolerated under `PartialFailurePolicy::Accept`
    pub warnings: Vec<RecordFailure>,
}

/// Request handler shared by every connection
///
/// Holds no per-request state; the sinks behind the fan-out stay open for the
/// lifetime of the service.
pub struct FeedbackEndpoint {
    authenticator: Arc<dyn Authenticator>,
    validator: Validator,
    fanout: Arc<FeedbackFanout>,
    delivery: DeliveryPolicy,
}

impl FeedbackEndpoint {
    pub fn new(
        authenticator: Arc<dyn Authenticator>,
        validator: Validator,
        fanout: Arc<FeedbackFanout>,
        delivery: DeliveryPolicy,
    ) -> Self {
        Self {
            authenticator,
            validator,
            fanout,
            delivery,
        }
    }

    /// Key authentication, validation and delivery policy from a blueprint
    pub fn from_blueprint(
        blueprint: &ServiceBlueprint,
        fanout: Arc<FeedbackFanout>,
    ) -> Result<Self, ContractError> {
        Ok(Self::new(
            Arc::new(KeyAuthenticator::from_config(&blueprint.auth)),
            Validator::new(&blueprint.validation)?,
            fanout,
            blueprint.delivery,
        ))
    }

    pub fn fanout(&self) -> &Arc<FeedbackFanout> {
        &self.fanout
    }

    /// Process one submission (discrete fields or a batch)
    #[instrument(name = "endpoint_handle", skip(self, raw), fields(client = ?client))]
    pub async fn handle(
        &self,
        raw: RawFeedback,
        client: Option<SocketAddr>,
    ) -> Result<Accepted, EndpointError> {
        let result = self.process(raw, client).await;
        match &result {
            Ok(accepted) if accepted.warnings.is_empty() => {
                info!(records = accepted.records, "Feedback accepted");
            }
            Ok(accepted) => {
                warn!(
                    records = accepted.records,
                    warnings = accepted.warnings.len(),
                    "Feedback accepted with sink failures"
                );
            }
            Err(e) => {
                observability::record_feedback_rejected(e.reason());
                warn!(reason = e.reason(), error = %e, "Feedback rejected");
            }
        }
        result
    }

    async fn process(
        &self,
        mut raw: RawFeedback,
        client: Option<SocketAddr>,
    ) -> Result<Accepted, EndpointError> {
        self.authenticator
            .authenticate(raw.get(fields::KEY), client)
            .map_err(|reason| EndpointError::Unauthorized { reason })?;
        raw.remove(fields::KEY);

        let (mode, records) = self.decode(&raw)?;
        observability::record_feedback_received(mode, records.len());
        self.deliver(records).await
    }

    /// Batch fields win over discrete fields; JSON wins over XML
    fn decode(&self, raw: &RawFeedback) -> Result<(&'static str, Vec<FeedbackRecord>), EndpointError> {
        for format in [BatchFormat::Json, BatchFormat::Xml] {
            if let Some(payload) = raw.get(format.field()) {
                let items = parse_batch(payload, format)?;
                let records = self.validator.validate_batch(&items)?;
                return Ok((format.field(), records));
            }
        }
        Ok(("single", vec![self.validator.validate(raw)?]))
    }

    /// Fan out every record, then apply the partial-failure policy
    pub async fn deliver(&self, records: Vec<FeedbackRecord>) -> Result<Accepted, EndpointError> {
        let total = records.len();
        let mut not_stored = 0;
        let mut failures = Vec::new();

        for (index, record) in records.into_iter().enumerate() {
            let report = self.fanout.write(&Arc::new(record)).await;
            if report.all_failed() {
                not_stored += 1;
            }
            failures.extend(
                report
                    .into_failures()
                    .into_iter()
                    .map(|error| RecordFailure { record: index, error }),
            );
        }

        let strict = self.delivery.partial_failure == PartialFailurePolicy::Reject;
        if not_stored > 0 || (strict && !failures.is_empty()) {
            return Err(EndpointError::Delivery {
                total,
                not_stored,
                failures,
            });
        }

        Ok(Accepted {
            records: total,
            warnings: failures,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use contracts::{FeedbackSink, ValidationConfig};
    use intake::ValidationError;
    use std::sync::Mutex;

    /// In-memory sink that can be told to fail
    pub(crate) struct MemorySink {
        pub name: String,
        pub records: Arc<Mutex<Vec<FeedbackRecord>>>,
        pub fail: bool,
    }

    impl MemorySink {
        pub fn new(name: &str) -> (Self, Arc<Mutex<Vec<FeedbackRecord>>>) {
            let records = Arc::new(Mutex::new(Vec::new()));
            let sink = Self {
                name: name.to_string(),
                records: Arc::clone(&records),
                fail: false,
            };
            (sink, records)
        }

        pub fn failing(name: &str) -> Self {
            Self {
                fail: true,
                ..Self::new(name).0
            }
        }
    }

    impl FeedbackSink for MemorySink {
        fn name(&self) -> &str {
            &self.name
        }

        async fn write(&mut self, record: &FeedbackRecord) -> Result<(), ContractError> {
            if self.fail {
                return Err(ContractError::sink_write(&self.name, "LockBusy"));
            }
            self.records.lock().unwrap().push(record.clone());
            Ok(())
        }

        async fn flush(&mut self) -> Result<(), ContractError> {
            Ok(())
        }

        async fn close(&mut self) -> Result<(), ContractError> {
            Ok(())
        }
    }

    pub(crate) fn endpoint_with(
        fanout: FeedbackFanout,
        partial_failure: PartialFailurePolicy,
    ) -> FeedbackEndpoint {
        FeedbackEndpoint::new(
            Arc::new(KeyAuthenticator::new(["secret"])),
            Validator::new(&ValidationConfig::default()).unwrap(),
            Arc::new(fanout),
            DeliveryPolicy { partial_failure },
        )
    }

    pub(crate) fn obama() -> RawFeedback {
        RawFeedback::new()
            .with("key", "secret")
            .with("text", "Barack Obama was president")
            .with("entity_uri", "http://dbpedia.org/resource/Barack_Obama")
            .with("surface_form", "Barack Obama")
            .with("feedback", "correct")
    }

    #[tokio::test]
    async fn single_submission_reaches_every_sink() {
        let (a, a_records) = MemorySink::new("a");
        let (b, b_records) = MemorySink::new("b");
        let mut fanout = FeedbackFanout::new();
        fanout.register_sink(a, 8);
        fanout.register_sink(b, 8);
        let endpoint = endpoint_with(fanout, PartialFailurePolicy::Accept);

        let accepted = endpoint.handle(obama(), None).await.unwrap();
        assert_eq!(accepted.records, 1);
        assert!(accepted.warnings.is_empty());
        assert_eq!(a_records.lock().unwrap().len(), 1);
        assert_eq!(b_records.lock().unwrap()[0].surface_form, "Barack Obama");
    }

    #[tokio::test]
    async fn missing_key_touches_no_sink() {
        let (a, records) = MemorySink::new("a");
        let mut fanout = FeedbackFanout::new();
        fanout.register_sink(a, 8);
        let endpoint = endpoint_with(fanout, PartialFailurePolicy::Accept);

        let mut raw = obama();
        raw.remove("key");
        let err = endpoint.handle(raw, None).await.unwrap_err();
        assert!(matches!(err, EndpointError::Unauthorized { .. }));

        let mut raw = obama();
        raw.remove("key");
        let err = endpoint.handle(raw.with("key", "wrong"), None).await.unwrap_err();
        assert_eq!(err.status().as_u16(), 401);

        assert!(records.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_text_is_a_validation_failure() {
        let (a, records) = MemorySink::new("a");
        let mut fanout = FeedbackFanout::new();
        fanout.register_sink(a, 8);
        let endpoint = endpoint_with(fanout, PartialFailurePolicy::Accept);

        let raw = RawFeedback::new()
            .with("key", "secret")
            .with("text", "")
            .with("feedback", "correct");
        let err = endpoint.handle(raw, None).await.unwrap_err();
        assert!(matches!(
            err,
            EndpointError::Validation(ValidationError::MissingField { field: "text" })
        ));
        assert!(records.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn partial_failure_policies() {
        let build = |policy| {
            let (good, records) = MemorySink::new("tsv");
            let mut fanout = FeedbackFanout::new();
            fanout.register_sink(MemorySink::failing("index"), 8);
            fanout.register_sink(good, 8);
            (endpoint_with(fanout, policy), records)
        };

        let (lenient, records) = build(PartialFailurePolicy::Accept);
        let accepted = lenient.handle(obama(), None).await.unwrap();
        assert_eq!(accepted.warnings.len(), 1);
        assert_eq!(accepted.warnings[0].error.sink, "index");
        assert_eq!(records.lock().unwrap().len(), 1);

        let (strict, records) = build(PartialFailurePolicy::Reject);
        match strict.handle(obama(), None).await.unwrap_err() {
            EndpointError::Delivery {
                total,
                not_stored,
                failures,
            } => {
                assert_eq!((total, not_stored, failures.len()), (1, 0, 1));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        // The healthy sink still stored it
        assert_eq!(records.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn stored_nowhere_is_always_an_error() {
        let mut fanout = FeedbackFanout::new();
        fanout.register_sink(MemorySink::failing("a"), 8);
        fanout.register_sink(MemorySink::failing("b"), 8);
        let endpoint = endpoint_with(fanout, PartialFailurePolicy::Accept);

        let err = endpoint.handle(obama(), None).await.unwrap_err();
        assert!(matches!(err, EndpointError::Delivery { not_stored: 1, .. }));
        assert!(err.body().contains("record 0: sink 'b' failed"));

        // No sinks at all
        let endpoint = endpoint_with(FeedbackFanout::new(), PartialFailurePolicy::Accept);
        assert!(endpoint.handle(obama(), None).await.is_err());
    }

    #[tokio::test]
    async fn batch_takes_precedence_and_is_all_or_nothing() {
        let (a, records) = MemorySink::new("a");
        let mut fanout = FeedbackFanout::new();
        fanout.register_sink(a, 8);
        let endpoint = endpoint_with(fanout, PartialFailurePolicy::Accept);

        let mut items: Vec<String> = (0..9)
            .map(|i| format!(r#"{{"text": "item {i}", "feedback": "correct"}}"#))
            .collect();
        let good = format!("[{}]", items.join(","));
        items.insert(3, r#"{"text": "bad", "feedback": "maybe"}"#.to_string());
        let bad = format!("[{}]", items.join(","));

        let err = endpoint
            .handle(obama().with("json_batch", bad), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EndpointError::Batch(intake::BatchError::Item { index: 3, .. })
        ));
        assert!(records.lock().unwrap().is_empty());

        let xml = "<feedbacks><feedback text=\"xml\" feedback=\"correct\"/></feedbacks>";
        let accepted = endpoint
            .handle(
                obama().with("json_batch", good).with("xml_batch", xml),
                None,
            )
            .await
            .unwrap();
        assert_eq!(accepted.records, 9);
        let stored = records.lock().unwrap();
        assert_eq!(stored.len(), 9);
        assert!(stored.iter().all(|r| r.text.starts_with("item ")));
    }

    #[tokio::test]
    async fn xml_batch_without_json() {
        let (a, records) = MemorySink::new("a");
        let mut fanout = FeedbackFanout::new();
        fanout.register_sink(a, 8);
        let endpoint = endpoint_with(fanout, PartialFailurePolicy::Accept);

        let xml = r#"<feedbacks>
            <feedback><text>one</text><feedback>correct</feedback></feedback>
            <feedback><text>two</text><feedback>incorrect</feedback><offset>4</offset></feedback>
        </feedbacks>"#;
        let raw = RawFeedback::new().with("key", "secret").with("xml_batch", xml);
        assert_eq!(endpoint.handle(raw, None).await.unwrap().records, 2);
        assert_eq!(records.lock().unwrap()[1].offset, Some(4));
    }
}
