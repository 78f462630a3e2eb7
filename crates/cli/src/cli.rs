//! CLI argument definitions using clap.

use clap::{ArgGroup, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Feedback Warehouse - stores user judgments about entity annotations
#[derive(Parser, Debug)]
#[command(
    name = "feedback-warehouse",
    author,
    version,
    about = "Entity-annotation feedback endpoint and warehouse",
    long_about = "Collects user feedback on entity annotations over HTTP.\n\n\
                  Validates each submission (or JSON/XML batch), then writes it to \n\
                  every configured store: delimited files, a search index and logs."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "FEEDBACK_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "FEEDBACK_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP feedback endpoint
    Serve(ServeArgs),

    /// Import a JSON/XML batch file into the configured sinks
    Import(ImportArgs),

    /// Look up feedback stored in a search index
    Query(QueryArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display configuration information
    Info(InfoArgs),
}

/// Arguments for the `serve` command
#[derive(Parser, Debug, Clone)]
pub struct ServeArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(short, long, default_value = "feedback.toml", env = "FEEDBACK_CONFIG")]
    pub config: PathBuf,

    /// Override listen address from configuration
    #[arg(long, env = "FEEDBACK_BIND")]
    pub bind: Option<String>,

    /// Override warehouse root directory from configuration
    #[arg(long, env = "FEEDBACK_WAREHOUSE")]
    pub warehouse: Option<PathBuf>,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "FEEDBACK_METRICS_PORT")]
    pub metrics_port: u16,

    /// Validate configuration and exit without serving
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for the `import` command
#[derive(Parser, Debug, Clone)]
pub struct ImportArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(short, long, default_value = "feedback.toml", env = "FEEDBACK_CONFIG")]
    pub config: PathBuf,

    /// Batch file to import
    pub file: PathBuf,

    /// Batch encoding (default: from file extension)
    #[arg(long, value_enum)]
    pub format: Option<BatchFormatArg>,

    /// Override warehouse root directory from configuration
    #[arg(long, env = "FEEDBACK_WAREHOUSE")]
    pub warehouse: Option<PathBuf>,
}

/// Arguments for the `query` command
#[derive(Parser, Debug, Clone)]
#[command(group(
    ArgGroup::new("filter")
        .args(["entity", "surface_form", "verdict", "doc_url"])
        .multiple(false)
))]
pub struct QueryArgs {
    /// Path to configuration file (used to locate the index sink)
    #[arg(short, long, default_value = "feedback.toml", env = "FEEDBACK_CONFIG")]
    pub config: PathBuf,

    /// Index sink name (default: the first index sink)
    #[arg(long)]
    pub sink: Option<String>,

    /// Index directory; skips the configuration file
    #[arg(long)]
    pub index: Option<PathBuf>,

    /// Match entity URI exactly
    #[arg(long)]
    pub entity: Option<String>,

    /// Match surface form exactly
    #[arg(long)]
    pub surface_form: Option<String>,

    /// Match verdict
    #[arg(long, value_enum)]
    pub verdict: Option<VerdictArg>,

    /// Match document URL exactly
    #[arg(long)]
    pub doc_url: Option<String>,

    /// Maximum number of results (newest first)
    #[arg(long, default_value = "20")]
    pub limit: usize,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "feedback.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "feedback.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Show sink parameters
    #[arg(long)]
    pub sinks: bool,

    /// Print the configuration with every default filled in (TOML)
    #[arg(long, conflicts_with = "json")]
    pub effective: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}

/// Batch file encoding
#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum BatchFormatArg {
    Json,
    Xml,
}

impl From<BatchFormatArg> for intake::BatchFormat {
    fn from(format: BatchFormatArg) -> Self {
        match format {
            BatchFormatArg::Json => Self::Json,
            BatchFormatArg::Xml => Self::Xml,
        }
    }
}

/// Feedback verdict filter
#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum VerdictArg {
    Correct,
    Incorrect,
}

impl From<VerdictArg> for contracts::FeedbackVerdict {
    fn from(verdict: VerdictArg) -> Self {
        match verdict {
            VerdictArg::Correct => Self::Correct,
            VerdictArg::Incorrect => Self::Incorrect,
        }
    }
}
