//! IndexSink - stores feedback as documents in a tantivy index
//!
//! One document per record, committed before the write returns. The index
//! directory allows a single writer; a second one fails with `LockBusy`.

use chrono::Utc;
use contracts::{
    ContractError, FeedbackRecord, FeedbackSink, FeedbackVerdict, SinkConfig, WarehouseConfig,
};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tantivy::collector::DocSetCollector;
use tantivy::directory::MmapDirectory;
use tantivy::query::{AllQuery, Query, TermQuery};
use tantivy::schema::{
    Field, IndexRecordOption, Schema, Value, FAST, INDEXED, STORED, STRING, TEXT,
};
use tantivy::{Index, IndexReader, IndexWriter, TantivyDocument, Term};
use tracing::{debug, info, instrument, warn};

use crate::error::DispatcherError;

/// Writer memory budget when none is configured
const DEFAULT_WRITER_MEMORY_MB: usize = 50;
/// tantivy refuses budgets below this
const MIN_WRITER_MEMORY_MB: usize = 15;
/// ... and above roughly 4 GB per indexing thread
const MAX_WRITER_MEMORY_MB: usize = 4_000;

/// Schema handles shared by the sink and the reader
#[derive(Debug, Clone)]
struct FeedbackFields {
    schema: Schema,
    received_at: Field,
    doc_url: Field,
    text: Field,
    entity_uri: Field,
    surface_form: Field,
    offset: Field,
    verdict: Field,
    systems: Field,
    is_manual: Field,
    language: Field,
    discourse_type: Field,
    right_entity: Field,
}

impl FeedbackFields {
    fn build() -> Self {
        let mut builder = Schema::builder();
        let received_at = builder.add_i64_field("received_at", INDEXED | STORED | FAST);
        let doc_url = builder.add_text_field("doc_url", STRING | STORED);
        let text = builder.add_text_field("text", TEXT | STORED);
        let entity_uri = builder.add_text_field("entity_uri", STRING | STORED);
        let surface_form = builder.add_text_field("surface_form", STRING | STORED);
        let offset = builder.add_i64_field("offset", INDEXED | STORED);
        let verdict = builder.add_text_field("verdict", STRING | STORED);
        let systems = builder.add_text_field("systems", STRING | STORED);
        let is_manual = builder.add_text_field("is_manual", STRING | STORED);
        let language = builder.add_text_field("language", STRING | STORED);
        let discourse_type = builder.add_text_field("discourse_type", STRING | STORED);
        let right_entity = builder.add_text_field("right_entity", STRING | STORED);
        Self {
            schema: builder.build(),
            received_at,
            doc_url,
            text,
            entity_uri,
            surface_form,
            offset,
            verdict,
            systems,
            is_manual,
            language,
            discourse_type,
            right_entity,
        }
    }

    /// Resolve fields of an index created earlier
    fn from_schema(schema: Schema) -> tantivy::Result<Self> {
        Ok(Self {
            received_at: schema.get_field("received_at")?,
            doc_url: schema.get_field("doc_url")?,
            text: schema.get_field("text")?,
            entity_uri: schema.get_field("entity_uri")?,
            surface_form: schema.get_field("surface_form")?,
            offset: schema.get_field("offset")?,
            verdict: schema.get_field("verdict")?,
            systems: schema.get_field("systems")?,
            is_manual: schema.get_field("is_manual")?,
            language: schema.get_field("language")?,
            discourse_type: schema.get_field("discourse_type")?,
            right_entity: schema.get_field("right_entity")?,
            schema,
        })
    }

    fn document(&self, record: &FeedbackRecord, received_at: i64) -> TantivyDocument {
        let mut document = TantivyDocument::default();
        document.add_i64(self.received_at, received_at);
        document.add_text(self.doc_url, record.doc_url.as_str());
        document.add_text(self.text, &record.text);
        document.add_text(self.entity_uri, &record.entity_uri);
        document.add_text(self.surface_form, &record.surface_form);
        document.add_i64(self.offset, record.offset_or_sentinel());
        document.add_text(self.verdict, record.verdict.as_str());
        for system in &record.systems {
            document.add_text(self.systems, system);
        }
        document.add_text(self.is_manual, if record.is_manual { "true" } else { "false" });
        for (field, value) in [
            (self.language, &record.language),
            (self.discourse_type, &record.discourse_type),
            (self.right_entity, &record.right_entity),
        ] {
            if let Some(value) = value {
                document.add_text(field, value);
            }
        }
        document
    }

    fn read(&self, document: &TantivyDocument) -> IndexedFeedback {
        let text = |field: Field| {
            document
                .get_first(field)
                .and_then(|v| v.as_str())
                .map(str::to_string)
        };
        IndexedFeedback {
            received_at: document
                .get_first(self.received_at)
                .and_then(|v| v.as_i64())
                .unwrap_or_default(),
            doc_url: text(self.doc_url).unwrap_or_default(),
            text: text(self.text).unwrap_or_default(),
            entity_uri: text(self.entity_uri).unwrap_or_default(),
            surface_form: text(self.surface_form).unwrap_or_default(),
            offset: document
                .get_first(self.offset)
                .and_then(|v| v.as_i64())
                .unwrap_or(-1),
            verdict: text(self.verdict).unwrap_or_default(),
            systems: document
                .get_all(self.systems)
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            is_manual: text(self.is_manual).as_deref() == Some("true"),
            language: text(self.language),
            discourse_type: text(self.discourse_type),
            right_entity: text(self.right_entity),
        }
    }
}

/// Configuration for IndexSink
#[derive(Debug, Clone)]
pub struct IndexSinkConfig {
    /// Index directory
    pub path: PathBuf,
    /// Writer heap budget in megabytes
    pub writer_memory_mb: usize,
}

impl IndexSinkConfig {
    /// Create config from a sink entry; relative paths resolve against the warehouse
    pub fn from_sink_config(
        config: &SinkConfig,
        warehouse: &WarehouseConfig,
    ) -> Result<Self, DispatcherError> {
        let path = config
            .param("path")
            .map(|p| warehouse.resolve(p))
            .ok_or_else(|| DispatcherError::sink_creation(&config.name, "missing 'path' param"))?;

        let writer_memory_mb = match config.param("writer_memory_mb") {
            Some(value) => value
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|mb| (MIN_WRITER_MEMORY_MB..=MAX_WRITER_MEMORY_MB).contains(mb))
                .ok_or_else(|| {
                    DispatcherError::sink_creation(
                        &config.name,
                        format!(
                            "'writer_memory_mb' must be an integer in {}..={}, got '{}'",
                            MIN_WRITER_MEMORY_MB, MAX_WRITER_MEMORY_MB, value
                        ),
                    )
                })?,
            None => DEFAULT_WRITER_MEMORY_MB,
        };

        Ok(Self {
            path,
            writer_memory_mb,
        })
    }
}

/// Sink that indexes feedback for later lookup
///
/// The index is opened on first write so a busy directory is reported per
/// write (and retried on the next one) instead of failing startup.
pub struct IndexSink {
    name: String,
    config: IndexSinkConfig,
    fields: FeedbackFields,
    writer: Option<IndexWriter>,
}

impl IndexSink {
    /// Create a new IndexSink
    pub fn new(name: impl Into<String>, config: IndexSinkConfig) -> Self {
        Self {
            name: name.into(),
            config,
            fields: FeedbackFields::build(),
            writer: None,
        }
    }

    /// Create from a sink entry (for factory)
    pub fn from_config(
        config: &SinkConfig,
        warehouse: &WarehouseConfig,
    ) -> Result<Self, DispatcherError> {
        Ok(Self::new(
            &config.name,
            IndexSinkConfig::from_sink_config(config, warehouse)?,
        ))
    }

    fn open_writer(&self) -> Result<IndexWriter, ContractError> {
        let open_err = |e: &dyn std::fmt::Display| {
            ContractError::sink_open(
                &self.name,
                format!("{}: {}", self.config.path.display(), e),
            )
        };

        let budget = self
            .config
            .writer_memory_mb
            .checked_mul(1_000_000)
            .ok_or_else(|| open_err(&"writer memory budget overflows"))?;

        fs::create_dir_all(&self.config.path).map_err(|e| open_err(&e))?;
        let directory = MmapDirectory::open(&self.config.path).map_err(|e| open_err(&e))?;
        let index =
            Index::open_or_create(directory, self.fields.schema.clone()).map_err(|e| open_err(&e))?;
        let writer = index
            .writer_with_num_threads(1, budget)
            .map_err(|e| open_err(&e))?;

        info!(sink = %self.name, path = %self.config.path.display(), "Index writer opened");
        Ok(writer)
    }

    fn writer(&mut self) -> Result<&mut IndexWriter, ContractError> {
        let writer = match self.writer.take() {
            Some(writer) => writer,
            None => self.open_writer()?,
        };
        Ok(self.writer.insert(writer))
    }

    /// Drop a writer after a failed add or commit
    ///
    /// Its uncommitted documents go with it; the next write opens a fresh
    /// writer on the last committed state.
    fn discard_writer(&mut self) {
        if self.writer.take().is_some() {
            warn!(sink = %self.name, "Index writer discarded after failed write");
        }
    }
}

impl FeedbackSink for IndexSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "index_sink_write",
        skip(self, record),
        fields(sink = %self.name, path = %self.config.path.display())
    )]
    async fn write(&mut self, record: &FeedbackRecord) -> Result<(), ContractError> {
        let document = self
            .fields
            .document(record, Utc::now().timestamp_millis());
        let writer = self.writer()?;
        let stored = writer
            .add_document(document)
            .and_then(|_| writer.commit());

        match stored {
            Ok(_) => Ok(()),
            Err(e) => {
                self.discard_writer();
                Err(ContractError::sink_write(&self.name, e.to_string()))
            }
        }
    }

    #[instrument(name = "index_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        // Every write commits
        Ok(())
    }

    #[instrument(name = "index_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        if let Some(writer) = self.writer.take() {
            writer
                .wait_merging_threads()
                .map_err(|e| ContractError::sink_write(&self.name, e.to_string()))?;
        }
        debug!(sink = %self.name, "IndexSink closed");
        Ok(())
    }
}

/// Exact-match lookups over stored feedback
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexQuery {
    All,
    EntityUri(String),
    SurfaceForm(String),
    Verdict(FeedbackVerdict),
    DocUrl(String),
}

/// Feedback document as read back from the index
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexedFeedback {
    /// Milliseconds since the Unix epoch
    pub received_at: i64,
    pub doc_url: String,
    pub text: String,
    pub entity_uri: String,
    pub surface_form: String,
    /// `-1` when unspecified
    pub offset: i64,
    pub verdict: String,
    pub systems: Vec<String>,
    pub is_manual: bool,
    pub language: Option<String>,
    pub discourse_type: Option<String>,
    pub right_entity: Option<String>,
}

/// Read-only view over an index written by `IndexSink`
///
/// Needs no writer lock, so it can run next to a live service.
pub struct FeedbackIndexReader {
    fields: FeedbackFields,
    reader: IndexReader,
}

impl FeedbackIndexReader {
    /// Open an existing index directory
    pub fn open(path: &Path) -> Result<Self, DispatcherError> {
        let index = Index::open_in_dir(path)?;
        let fields = FeedbackFields::from_schema(index.schema())?;
        let reader = index.reader()?;
        Ok(Self { fields, reader })
    }

    /// Number of stored documents
    pub fn count(&self) -> Result<u64, DispatcherError> {
        self.reader.reload()?;
        Ok(self.reader.searcher().num_docs())
    }

    /// Matching documents, newest first, at most `limit`
    pub fn search(
        &self,
        query: &IndexQuery,
        limit: usize,
    ) -> Result<Vec<IndexedFeedback>, DispatcherError> {
        self.reader.reload()?;
        let searcher = self.reader.searcher();

        let query = self.to_query(query);
        let addresses = searcher.search(query.as_ref(), &DocSetCollector)?;

        let mut hits = addresses
            .into_iter()
            .map(|address| {
                let document: TantivyDocument = searcher.doc(address)?;
                Ok(self.fields.read(&document))
            })
            .collect::<tantivy::Result<Vec<_>>>()?;

        hits.sort_by(|a, b| b.received_at.cmp(&a.received_at));
        hits.truncate(limit);
        Ok(hits)
    }

    fn to_query(&self, query: &IndexQuery) -> Box<dyn Query> {
        let (field, value) = match query {
            IndexQuery::All => return Box::new(AllQuery),
            IndexQuery::EntityUri(v) => (self.fields.entity_uri, v.as_str()),
            IndexQuery::SurfaceForm(v) => (self.fields.surface_form, v.as_str()),
            IndexQuery::Verdict(v) => (self.fields.verdict, v.as_str()),
            IndexQuery::DocUrl(v) => (self.fields.doc_url, v.as_str()),
        };
        Box::new(TermQuery::new(
            Term::from_field_text(field, value),
            IndexRecordOption::Basic,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::tests::record;
    use tempfile::tempdir;

    fn config(path: &Path) -> IndexSinkConfig {
        IndexSinkConfig {
            path: path.to_path_buf(),
            writer_memory_mb: MIN_WRITER_MEMORY_MB,
        }
    }

    #[tokio::test]
    async fn test_index_write_and_query() {
        let dir = tempdir().unwrap();
        let mut sink = IndexSink::new("index", config(dir.path()));

        let mut paris = (*record("Paris is nice")).clone();
        paris.entity_uri = "http://dbpedia.org/resource/Paris".into();
        paris.surface_form = "Paris".into();
        paris.verdict = FeedbackVerdict::Incorrect;
        paris.offset = None;
        paris.language = Some("en".into());

        sink.write(&record("Berlin is big")).await.unwrap();
        sink.write(&paris).await.unwrap();

        // Committed on return: visible without closing the writer
        let reader = FeedbackIndexReader::open(dir.path()).unwrap();
        assert_eq!(reader.count().unwrap(), 2);

        let hits = reader
            .search(&IndexQuery::Verdict(FeedbackVerdict::Incorrect), 10)
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].surface_form, "Paris");
        assert_eq!(hits[0].offset, -1);
        assert_eq!(hits[0].language.as_deref(), Some("en"));
        assert_eq!(hits[0].systems, vec!["spotlight"]);

        let hits = reader
            .search(
                &IndexQuery::EntityUri("http://dbpedia.org/resource/Berlin".into()),
                10,
            )
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "Berlin is big");
        assert_eq!(hits[0].offset, 0);

        assert_eq!(reader.search(&IndexQuery::All, 1).unwrap().len(), 1);
        sink.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_second_writer_is_lock_busy() {
        let dir = tempdir().unwrap();
        let mut first = IndexSink::new("first", config(dir.path()));
        let mut second = IndexSink::new("second", config(dir.path()));

        first.write(&record("a")).await.unwrap();
        let err = second.write(&record("b")).await.unwrap_err();
        assert!(matches!(err, ContractError::SinkOpen { .. }), "{err:?}");

        // Once the lock is released the second sink recovers
        first.close().await.unwrap();
        second.write(&record("b")).await.unwrap();
        second.close().await.unwrap();

        let reader = FeedbackIndexReader::open(dir.path()).unwrap();
        assert_eq!(reader.count().unwrap(), 2);
    }

    #[test]
    fn test_memory_budget_param() {
        let mut sink_config = SinkConfig {
            name: "index".into(),
            sink_type: contracts::SinkType::Index,
            queue_capacity: 10,
            params: [("path".to_string(), "idx".to_string())].into(),
        };
        let warehouse = WarehouseConfig {
            root: PathBuf::from("/srv"),
        };
        let parsed = IndexSinkConfig::from_sink_config(&sink_config, &warehouse).unwrap();
        assert_eq!(parsed.path, PathBuf::from("/srv/idx"));
        assert_eq!(parsed.writer_memory_mb, DEFAULT_WRITER_MEMORY_MB);

        for out_of_range in ["1", "4001", "18446744073709551615"] {
            sink_config
                .params
                .insert("writer_memory_mb".into(), out_of_range.into());
            assert!(
                IndexSinkConfig::from_sink_config(&sink_config, &warehouse).is_err(),
                "{out_of_range}"
            );
        }
    }

    #[tokio::test]
    async fn test_oversized_budget_is_an_open_error() {
        let dir = tempdir().unwrap();
        let mut sink = IndexSink::new(
            "index",
            IndexSinkConfig {
                path: dir.path().to_path_buf(),
                writer_memory_mb: usize::MAX,
            },
        );
        let err = sink.write(&record("a")).await.unwrap_err();
        assert!(matches!(err, ContractError::SinkOpen { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn test_failed_commit_does_not_poison_later_writes() {
        let root = tempdir().unwrap();
        let path = root.path().join("index");
        let moved = root.path().join("moved");
        let mut sink = IndexSink::new("index", config(&path));

        sink.write(&record("A")).await.unwrap();

        // Index directory vanishes under the open writer
        fs::rename(&path, &moved).unwrap();
        let err = sink.write(&record("B")).await.unwrap_err();
        assert!(matches!(err, ContractError::SinkWrite { .. }), "{err:?}");
        fs::rename(&moved, &path).unwrap();

        sink.write(&record("C")).await.unwrap();
        sink.write(&record("D")).await.unwrap();
        sink.close().await.unwrap();

        let reader = FeedbackIndexReader::open(&path).unwrap();
        let mut texts: Vec<String> = reader
            .search(&IndexQuery::All, 10)
            .unwrap()
            .into_iter()
            .map(|hit| hit.text)
            .collect();
        texts.sort();
        assert_eq!(texts, vec!["A", "C", "D"]);
    }

    #[test]
    fn test_missing_index_cannot_be_opened() {
        let dir = tempdir().unwrap();
        assert!(FeedbackIndexReader::open(&dir.path().join("nope")).is_err());
    }
}
