//! `import` command implementation.
//!
//! Offline counterpart of a batch POST: the whole file is validated before
//! anything is written, then every record is fanned out to the configured sinks.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use contracts::PartialFailurePolicy;
use dispatcher::create_fanout;
use intake::{parse_batch, BatchFormat, Validator};
use observability::{DeliveryAggregator, DeliverySummary};

use super::{load_blueprint, revalidate};
use crate::cli::ImportArgs;
use crate::error::CliError;

/// Execute the `import` command
pub async fn run_import(args: &ImportArgs) -> Result<()> {
    let mut blueprint = load_blueprint(&args.config)?;
    if let Some(ref root) = args.warehouse {
        info!(root = %root.display(), "Overriding warehouse root from CLI");
        blueprint.warehouse.root = root.clone();
    }
    revalidate(&blueprint)?;

    let format = match args.format {
        Some(format) => format.into(),
        None => infer_format(&args.file)?,
    };

    let payload = std::fs::read_to_string(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;

    let validator = Validator::new(&blueprint.validation)?;
    let items =
        parse_batch(&payload, format).map_err(|e| CliError::batch_rejected(e.to_string()))?;
    let records = validator
        .validate_batch(&items)
        .map_err(|e| CliError::batch_rejected(e.to_string()))?;
    observability::record_feedback_received("import", records.len());

    info!(
        file = %args.file.display(),
        format = %format,
        records = records.len(),
        "Batch validated"
    );

    std::fs::create_dir_all(&blueprint.warehouse.root).with_context(|| {
        format!(
            "Failed to create warehouse directory {}",
            blueprint.warehouse.root.display()
        )
    })?;
    let fanout = create_fanout(blueprint.sinks.clone(), blueprint.warehouse.clone())
        .context("Failed to open sinks")?;

    let mut aggregator = DeliveryAggregator::new();
    for record in records {
        let record = Arc::new(record);
        let started = Instant::now();
        let report = fanout.write(&record).await;
        for failure in report.failures() {
            warn!(sink = %failure.sink, error = %failure.cause, "Sink write failed");
        }
        aggregator.update(
            report.succeeded().len(),
            report.failures().iter().map(|f| f.sink.as_str()),
            started.elapsed(),
        );
    }

    let close = fanout.close_all().await;
    for failure in close.failures() {
        warn!(sink = %failure.sink, error = %failure.cause, "Sink close failed");
    }

    let summary = aggregator.summary();
    println!("{}", summary);

    check_delivery(&summary, blueprint.delivery.partial_failure)
}

/// Outcome of an import under the configured partial-failure policy
fn check_delivery(summary: &DeliverySummary, policy: PartialFailurePolicy) -> Result<()> {
    if summary.not_stored > 0 {
        anyhow::bail!("{} record(s) were not stored by any sink", summary.not_stored);
    }
    if policy == PartialFailurePolicy::Reject && summary.partially_stored > 0 {
        anyhow::bail!(
            "{} record(s) were missed by at least one sink",
            summary.partially_stored
        );
    }
    Ok(())
}

fn infer_format(path: &Path) -> Result<BatchFormat> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .and_then(BatchFormat::from_extension)
        .ok_or_else(|| CliError::unknown_batch_format(path).into())
}
