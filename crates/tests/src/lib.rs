//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 配置 -> sinks -> HTTP 端点的完整链路
//! - 部分失败策略与批量全有或全无语义
//! - 写入后从 TSV 文件和索引读回验证

#[cfg(test)]
mod support {
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use axum::response::Response;
    use contracts::{ContractError, FeedbackRecord, FeedbackSink, ServiceBlueprint};

    pub const KEY: &str = "integration-key";

    /// Blueprint with a TSV sink and an index sink under `root`
    pub fn blueprint(root: &Path, policy: &str) -> ServiceBlueprint {
        let toml = format!(
            r#"
[auth]
api_keys = ["{KEY}"]

[delivery]
partial_failure = "{policy}"

[warehouse]
root = "{root}"

[[sinks]]
name = "tsv"
sink_type = "delimited"
params = {{ path = "feedback.tsv" }}

[[sinks]]
name = "index"
sink_type = "index"
params = {{ path = "index", writer_memory_mb = "15" }}
"#,
            root = root.display().to_string().replace('\\', "/"),
        );
        config_loader::ConfigLoader::load_from_str(&toml, config_loader::ConfigFormat::Toml)
            .unwrap()
    }

    pub fn form(pairs: &[(&str, &str)]) -> Request<Body> {
        let encoded = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs)
            .finish();
        Request::builder()
            .method("POST")
            .uri("/feedback")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(encoded))
            .unwrap()
    }

    pub fn obama() -> Vec<(&'static str, &'static str)> {
        vec![
            ("key", KEY),
            ("text", "Barack Obama was president"),
            ("entity_uri", "http://dbpedia.org/resource/Barack_Obama"),
            ("surface_form", "Barack Obama"),
            ("feedback", "correct"),
        ]
    }

    pub async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    /// Lines of a TSV file, or none when the file was never created
    pub fn tsv_lines(path: &Path) -> Vec<Vec<String>> {
        match std::fs::read_to_string(path) {
            Ok(content) => content
                .lines()
                .map(|line| line.split('\t').map(str::to_string).collect())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Sink that appends its name to a shared log, optionally failing
    pub struct JournalSink {
        pub name: String,
        pub journal: Arc<Mutex<Vec<String>>>,
        pub fail: bool,
    }

    impl FeedbackSink for JournalSink {
        fn name(&self) -> &str {
            &self.name
        }

        async fn write(&mut self, _record: &FeedbackRecord) -> Result<(), ContractError> {
            self.journal.lock().unwrap().push(self.name.clone());
            if self.fail {
                Err(ContractError::sink_write(&self.name, "disk full"))
            } else {
                Ok(())
            }
        }

        async fn flush(&mut self) -> Result<(), ContractError> {
            Ok(())
        }

        async fn close(&mut self) -> Result<(), ContractError> {
            Ok(())
        }
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::sync::{Arc, Mutex};

    use axum::http::StatusCode;
    use axum::Router;
    use contracts::{AuthConfig, DeliveryPolicy, PartialFailurePolicy, ValidationConfig};
    use dispatcher::{FeedbackFanout, FeedbackIndexReader, IndexQuery};
    use endpoint::{build_router, AppState, FeedbackEndpoint, FeedbackServer, KeyAuthenticator, WARNINGS_HEADER};
    use intake::{text_hash, Validator};
    use tower::util::ServiceExt;

    use crate::support::*;

    fn journal_router(
        sinks: &[(&str, bool)],
        policy: PartialFailurePolicy,
    ) -> (Router, Arc<Mutex<Vec<String>>>) {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let mut fanout = FeedbackFanout::new();
        for (name, fail) in sinks {
            fanout.register_sink(
                JournalSink {
                    name: name.to_string(),
                    journal: Arc::clone(&journal),
                    fail: *fail,
                },
                8,
            );
        }
        let endpoint = FeedbackEndpoint::new(
            Arc::new(KeyAuthenticator::from_config(&AuthConfig {
                api_keys: vec![KEY.to_string()],
            })),
            Validator::new(&ValidationConfig::default()).unwrap(),
            Arc::new(fanout),
            DeliveryPolicy {
                partial_failure: policy,
            },
        );
        (
            build_router(AppState::new(Arc::new(endpoint)), 64 * 1024),
            journal,
        )
    }

    /// Obama submission ends up in the TSV file and the index
    #[tokio::test]
    async fn test_e2e_single_submission_reaches_every_sink() {
        let dir = tempfile::tempdir().unwrap();
        let server = FeedbackServer::from_blueprint(&blueprint(dir.path(), "accept")).unwrap();

        let response = server.router().oneshot(form(&obama())).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(WARNINGS_HEADER).is_none());

        let lines = tsv_lines(&dir.path().join("feedback.tsv"));
        assert_eq!(lines.len(), 1);
        let line = &lines[0];
        assert_eq!(line.len(), dispatcher::COLUMNS.len());
        assert!(!line[1].is_empty());
        assert_eq!(line[2], "Barack Obama was president");
        assert_eq!(line[3], "http://dbpedia.org/resource/Barack_Obama");
        assert_eq!(line[4], "Barack Obama");
        assert_eq!(line[5], "-1");
        assert_eq!(line[6], "correct");

        let reader = FeedbackIndexReader::open(&dir.path().join("index")).unwrap();
        let hits = reader
            .search(&IndexQuery::SurfaceForm("Barack Obama".into()), 10)
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].doc_url, line[1]);

        let close = server.endpoint().fanout().close_all().await;
        assert!(close.is_success());
    }

    #[tokio::test]
    async fn test_e2e_missing_url_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let server = FeedbackServer::from_blueprint(&blueprint(dir.path(), "accept")).unwrap();
        let router = server.router();

        for _ in 0..2 {
            let response = router.clone().oneshot(form(&obama())).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let lines = tsv_lines(&dir.path().join("feedback.tsv"));
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0][1], lines[1][1]);
        assert_eq!(
            lines[0][1],
            format!(
                "http://spotlight.dbpedia.org/id/{}",
                text_hash("Barack Obama was president")
            )
        );

        let reader = FeedbackIndexReader::open(&dir.path().join("index")).unwrap();
        let hits = reader
            .search(&IndexQuery::DocUrl(lines[0][1].clone()), 10)
            .unwrap();
        assert_eq!(hits.len(), 2);
        server.endpoint().fanout().close_all().await;
    }

    #[tokio::test]
    async fn test_e2e_rejections_write_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let server = FeedbackServer::from_blueprint(&blueprint(dir.path(), "accept")).unwrap();
        let router = server.router();

        // Missing key
        let mut fields = obama();
        fields.retain(|(name, _)| *name != "key");
        let response = router.clone().oneshot(form(&fields)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        // Malformed URL
        let mut fields = obama();
        fields.push(("url", "not a url"));
        let response = router.clone().oneshot(form(&fields)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_text(response).await.contains("not a url"));

        // Empty text
        let mut fields = obama();
        fields.retain(|(name, _)| *name != "text");
        fields.push(("text", ""));
        let response = router.clone().oneshot(form(&fields)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_text(response).await.contains("text"));

        assert!(tsv_lines(&dir.path().join("feedback.tsv")).is_empty());
        assert_eq!(server.endpoint().fanout().metrics()[0].1.stored, 0);
        server.endpoint().fanout().close_all().await;
    }

    #[tokio::test]
    async fn test_e2e_batch_with_one_bad_item_persists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let server = FeedbackServer::from_blueprint(&blueprint(dir.path(), "accept")).unwrap();
        let router = server.router();

        let mut items: Vec<serde_json::Value> = (0..10)
            .map(|i| {
                serde_json::json!({
                    "text": format!("Document number {i}"),
                    "entity_uri": "http://dbpedia.org/resource/Number",
                    "surface_form": "number",
                    "feedback": "incorrect",
                    "offset": i,
                })
            })
            .collect();
        items[6]["url"] = serde_json::json!("::bad::");
        let batch = serde_json::Value::Array(items.clone()).to_string();

        let response = router
            .clone()
            .oneshot(form(&[("key", KEY), ("json_batch", &batch)]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_text(response).await.contains("item 6"));
        assert!(tsv_lines(&dir.path().join("feedback.tsv")).is_empty());

        // The same batch without the broken item goes through whole
        items.remove(6);
        let batch = serde_json::Value::Array(items).to_string();
        let response = router
            .oneshot(form(&[("key", KEY), ("json_batch", &batch)]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let lines = tsv_lines(&dir.path().join("feedback.tsv"));
        assert_eq!(lines.len(), 9);
        assert_eq!(lines[8][5], "9");

        let reader = FeedbackIndexReader::open(&dir.path().join("index")).unwrap();
        assert_eq!(reader.count().unwrap(), 9);
        server.endpoint().fanout().close_all().await;
    }

    #[tokio::test]
    async fn test_e2e_xml_batch() {
        let dir = tempfile::tempdir().unwrap();
        let server = FeedbackServer::from_blueprint(&blueprint(dir.path(), "accept")).unwrap();

        let xml = r#"<feedbacks>
  <feedback><text>Berlin is big</text><surface_form>Berlin</surface_form><feedback>correct</feedback></feedback>
  <feedback text="Paris in spring" surface_form="Paris" feedback="incorrect" url="http://example.org/paris"/>
</feedbacks>"#;
        let response = server
            .router()
            .oneshot(form(&[("key", KEY), ("xml_batch", xml)]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let lines = tsv_lines(&dir.path().join("feedback.tsv"));
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1][1], "http://example.org/paris");
        assert_eq!(lines[1][6], "incorrect");
        server.endpoint().fanout().close_all().await;
    }

    #[tokio::test]
    async fn test_e2e_every_sink_attempted_in_order() {
        let (router, journal) = journal_router(
            &[("a", true), ("b", false), ("c", true)],
            PartialFailurePolicy::Accept,
        );

        let response = router.oneshot(form(&obama())).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[WARNINGS_HEADER], "2");
        assert_eq!(*journal.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_e2e_partial_failure_policies() {
        // A fails, B stores: accepted with a warning
        let (router, journal) =
            journal_router(&[("a", true), ("b", false)], PartialFailurePolicy::Accept);
        let response = router.oneshot(form(&obama())).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[WARNINGS_HEADER], "1");
        assert_eq!(journal.lock().unwrap().len(), 2);

        // Same sinks, strict policy: B still stored it, but the client sees the failure
        let (router, journal) =
            journal_router(&[("a", true), ("b", false)], PartialFailurePolicy::Reject);
        let response = router.oneshot(form(&obama())).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_text(response).await;
        assert!(body.contains("sink 'a'"), "{body}");
        assert_eq!(*journal.lock().unwrap(), vec!["a", "b"]);

        // Nothing stored anywhere fails under either policy
        let (router, _) =
            journal_router(&[("a", true), ("b", true)], PartialFailurePolicy::Accept);
        let response = router.oneshot(form(&obama())).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_e2e_health_reports_sinks() {
        let dir = tempfile::tempdir().unwrap();
        let server = FeedbackServer::from_blueprint(&blueprint(dir.path(), "reject")).unwrap();

        let request = axum::http::Request::builder()
            .uri("/health")
            .body(axum::body::Body::empty())
            .unwrap();
        let response = server.router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let health: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(health["status"], "ok");
        let names: Vec<_> = health["sinks"]
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["tsv", "index"]);
        server.endpoint().fanout().close_all().await;
    }
}
