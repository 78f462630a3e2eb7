//! `serve` command implementation.

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use contracts::ServiceBlueprint;
use endpoint::FeedbackServer;

use super::{load_blueprint, revalidate};
use crate::cli::ServeArgs;

/// Execute the `serve` command
pub async fn run_serve(args: &ServeArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    let mut blueprint = load_blueprint(&args.config)?;

    // Apply CLI overrides
    if let Some(ref bind) = args.bind {
        info!(bind = %bind, "Overriding listen address from CLI");
        blueprint.server.bind = bind.clone();
    }
    if let Some(ref root) = args.warehouse {
        info!(root = %root.display(), "Overriding warehouse root from CLI");
        blueprint.warehouse.root = root.clone();
    }
    revalidate(&blueprint)?;

    info!(
        bind = %blueprint.server.bind,
        warehouse = %blueprint.warehouse.root.display(),
        api_keys = blueprint.auth.api_keys.len(),
        sinks = blueprint.sinks.len(),
        "Configuration loaded"
    );

    // Dry run - just validate and exit
    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&blueprint);
        return Ok(());
    }

    if args.metrics_port != 0 {
        observability::init_metrics_only(args.metrics_port)?;
    }

    std::fs::create_dir_all(&blueprint.warehouse.root).with_context(|| {
        format!(
            "Failed to create warehouse directory {}",
            blueprint.warehouse.root.display()
        )
    })?;

    let server = FeedbackServer::from_blueprint(&blueprint).context("Failed to open sinks")?;
    let listener = TcpListener::bind(&blueprint.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", blueprint.server.bind))?;

    let report = server
        .run(listener, shutdown_signal())
        .await
        .context("Feedback server failed")?;

    if report.is_success() {
        info!(sinks = report.succeeded().len(), "All sinks closed cleanly");
    } else {
        warn!(failed = report.failures().len(), "Some sinks failed to close");
    }

    info!("Feedback warehouse finished");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
///
/// A handler that cannot be installed is logged and never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {}
            Err(e) => {
                error!(error = %e, "Failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    warn!("Received shutdown signal, draining requests...");
}

/// Print configuration summary for dry-run mode
fn print_config_summary(blueprint: &ServiceBlueprint) {
    println!("\n=== Configuration Summary ===\n");
    println!("Server:");
    println!("  Bind: {}", blueprint.server.bind);
    println!("  Max body: {} bytes", blueprint.server.max_body_bytes);
    println!("  API keys: {}", blueprint.auth.api_keys.len());
    println!(
        "  Partial failures: {:?}",
        blueprint.delivery.partial_failure
    );
    println!("\nWarehouse: {}", blueprint.warehouse.root.display());
    println!("\nSinks ({}):", blueprint.sinks.len());
    for sink in &blueprint.sinks {
        match sink.param("path") {
            Some(path) => println!(
                "  - {} ({:?}) -> {}",
                sink.name,
                sink.sink_type,
                blueprint.warehouse.resolve(path).display()
            ),
            None => println!("  - {} ({:?})", sink.name, sink.sink_type),
        }
    }
    println!();
}
