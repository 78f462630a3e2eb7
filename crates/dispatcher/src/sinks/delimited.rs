//! DelimitedFileSink - appends one line per record to a TSV/CSV file

use chrono::{SecondsFormat, Utc};
use contracts::{
    parse_delimiter, ContractError, FeedbackRecord, FeedbackSink, SinkConfig, WarehouseConfig,
};
use std::borrow::Cow;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, instrument};

use crate::error::DispatcherError;

/// Column order of every written line
pub const COLUMNS: [&str; 12] = [
    "received_at",
    "doc_url",
    "text",
    "entity_uri",
    "surface_form",
    "offset",
    "feedback",
    "systems",
    "is_manual",
    "language",
    "discourse_type",
    "right_entity",
];

/// Configuration for DelimitedFileSink
#[derive(Debug, Clone)]
pub struct DelimitedSinkConfig {
    /// Primary output file
    pub path: PathBuf,
    /// Optional second copy of every line
    pub backup_path: Option<PathBuf>,
    /// Field delimiter
    pub delimiter: u8,
    /// Write a header row when a file is created
    pub header: bool,
    /// `sync_data` after every write instead of just flushing to the OS
    pub fsync: bool,
}

impl DelimitedSinkConfig {
    /// Create config from a sink entry; relative paths resolve against the warehouse
    pub fn from_sink_config(
        config: &SinkConfig,
        warehouse: &WarehouseConfig,
    ) -> Result<Self, DispatcherError> {
        let path = config
            .param("path")
            .map(|p| warehouse.resolve(p))
            .ok_or_else(|| DispatcherError::sink_creation(&config.name, "missing 'path' param"))?;

        let delimiter = match config.param("delimiter") {
            Some(value) => parse_delimiter(value).ok_or_else(|| {
                DispatcherError::sink_creation(
                    &config.name,
                    format!("unsupported delimiter '{}'", value),
                )
            })?,
            None => b'\t',
        };

        Ok(Self {
            path,
            backup_path: config.param("backup_path").map(|p| warehouse.resolve(p)),
            delimiter,
            header: flag(config, "header")?,
            fsync: flag(config, "fsync")?,
        })
    }
}

fn flag(config: &SinkConfig, key: &str) -> Result<bool, DispatcherError> {
    match config.param(key) {
        None => Ok(false),
        Some(value) => value.trim().parse::<bool>().map_err(|_| {
            DispatcherError::sink_creation(
                &config.name,
                format!("'{}' must be true or false, got '{}'", key, value),
            )
        }),
    }
}

/// One output file, opened on first use
struct Target {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl Target {
    fn new(path: PathBuf) -> Self {
        Self { path, writer: None }
    }

    fn append(&mut self, line: &str, header: Option<&str>, fsync: bool) -> io::Result<()> {
        let path = &self.path;
        append_line(
            &mut self.writer,
            line,
            || open_append(path, header),
            |file| if fsync { file.sync_data() } else { Ok(()) },
        )
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.writer.as_mut() {
            Some(writer) => writer.flush(),
            None => Ok(()),
        }
    }
}

/// Write and flush one line through `slot`, opening it first if empty
///
/// On failure the writer is dropped together with its unflushed bytes, so a
/// rejected line is never written later and the next append reopens.
fn append_line<W: Write>(
    slot: &mut Option<BufWriter<W>>,
    line: &str,
    open: impl FnOnce() -> io::Result<BufWriter<W>>,
    sync: impl FnOnce(&W) -> io::Result<()>,
) -> io::Result<()> {
    let mut writer = match slot.take() {
        Some(writer) => writer,
        None => open()?,
    };
    let written = writer
        .write_all(line.as_bytes())
        .and_then(|_| writer.flush())
        .and_then(|_| sync(writer.get_ref()));

    match written {
        Ok(()) => {
            *slot = Some(writer);
            Ok(())
        }
        Err(e) => {
            let (_file, _unflushed) = writer.into_parts();
            Err(e)
        }
    }
}

fn open_append(path: &Path, header: Option<&str>) -> io::Result<BufWriter<File>> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)?;
    let len = file.metadata()?.len();

    // A torn last line gets terminated so the next record starts fresh
    let mut last = [0u8; 1];
    if len > 0 {
        file.seek(SeekFrom::End(-1))?;
        file.read_exact(&mut last)?;
    }

    let mut writer = BufWriter::new(file);
    if len == 0 {
        if let Some(header) = header {
            writer.write_all(header.as_bytes())?;
        }
    } else if last[0] != b'\n' {
        writer.write_all(b"\n")?;
    }
    Ok(writer)
}

/// Sink that appends delimited lines to a primary and optional backup file
///
/// A write is durable once it returns: the line has been flushed to the OS
/// (and synced to disk with `fsync = true`).
pub struct DelimitedFileSink {
    name: String,
    config: DelimitedSinkConfig,
    primary: Target,
    backup: Option<Target>,
}

impl DelimitedFileSink {
    /// Create a new DelimitedFileSink; files are created on first write
    pub fn new(name: impl Into<String>, config: DelimitedSinkConfig) -> Self {
        let primary = Target::new(config.path.clone());
        let backup = config.backup_path.clone().map(Target::new);
        Self {
            name: name.into(),
            config,
            primary,
            backup,
        }
    }

    /// Create from a sink entry (for factory)
    pub fn from_config(
        config: &SinkConfig,
        warehouse: &WarehouseConfig,
    ) -> Result<Self, DispatcherError> {
        Ok(Self::new(
            &config.name,
            DelimitedSinkConfig::from_sink_config(config, warehouse)?,
        ))
    }

    fn header_line(&self) -> Option<String> {
        self.config
            .header
            .then(|| join_line(COLUMNS.iter().map(|c| Cow::Borrowed(*c)), self.config.delimiter))
    }

    fn persist(&mut self, line: &str) -> Result<(), ContractError> {
        let header = self.header_line();
        let fsync = self.config.fsync;

        // Backup is attempted even when the primary fails
        let primary = self.primary.append(line, header.as_deref(), fsync);
        let backup = match self.backup.as_mut() {
            Some(target) => target.append(line, header.as_deref(), fsync),
            None => Ok(()),
        };

        let mut problems = Vec::new();
        if let Err(e) = primary {
            error!(sink = %self.name, path = %self.primary.path.display(), error = %e, "Append failed");
            problems.push(format!("{}: {}", self.primary.path.display(), e));
        }
        if let (Err(e), Some(target)) = (backup, self.backup.as_ref()) {
            error!(sink = %self.name, path = %target.path.display(), error = %e, "Backup append failed");
            problems.push(format!("{}: {}", target.path.display(), e));
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ContractError::sink_write(&self.name, problems.join("; ")))
        }
    }
}

/// Render one record as a line (including the trailing newline)
pub(crate) fn format_line(record: &FeedbackRecord, received_at: &str, delimiter: u8) -> String {
    let offset = record.offset_or_sentinel().to_string();
    let systems = record.systems_joined();
    let values: [&str; 12] = [
        received_at,
        record.doc_url.as_str(),
        &record.text,
        &record.entity_uri,
        &record.surface_form,
        &offset,
        record.verdict.as_str(),
        &systems,
        if record.is_manual { "true" } else { "false" },
        record.language.as_deref().unwrap_or(""),
        record.discourse_type.as_deref().unwrap_or(""),
        record.right_entity.as_deref().unwrap_or(""),
    ];
    join_line(values.iter().map(|v| escape_field(v, delimiter)), delimiter)
}

fn join_line<'a>(values: impl Iterator<Item = Cow<'a, str>>, delimiter: u8) -> String {
    let separator = char::from(delimiter).to_string();
    let mut line = values.collect::<Vec<_>>().join(&separator);
    line.push('\n');
    line
}

/// TSV: line breaks and tabs become spaces. Other delimiters: RFC 4180 quoting.
fn escape_field(value: &str, delimiter: u8) -> Cow<'_, str> {
    let delimiter = char::from(delimiter);
    if delimiter == '\t' {
        if value.contains(['\t', '\n', '\r']) {
            return Cow::Owned(value.replace(['\t', '\n', '\r'], " "));
        }
        return Cow::Borrowed(value);
    }

    if value.contains(|c: char| c == delimiter || c == '"' || c == '\n' || c == '\r') {
        Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(value)
    }
}

impl FeedbackSink for DelimitedFileSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "delimited_sink_write",
        skip(self, record),
        fields(sink = %self.name, path = %self.config.path.display())
    )]
    async fn write(&mut self, record: &FeedbackRecord) -> Result<(), ContractError> {
        let received_at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let line = format_line(record, &received_at, self.config.delimiter);
        self.persist(&line)
    }

    #[instrument(name = "delimited_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        self.primary
            .flush()
            .map_err(|e| ContractError::sink_write(&self.name, e.to_string()))?;
        if let Some(backup) = self.backup.as_mut() {
            backup
                .flush()
                .map_err(|e| ContractError::sink_write(&self.name, e.to_string()))?;
        }
        Ok(())
    }

    #[instrument(name = "delimited_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        self.flush().await?;
        self.primary.writer = None;
        if let Some(backup) = self.backup.as_mut() {
            backup.writer = None;
        }
        debug!(sink = %self.name, "DelimitedFileSink closed");
        Ok(())
    }
}
