//! `info` command implementation.

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::HashMap;
use tracing::info;

use contracts::ServiceBlueprint;

use super::load_blueprint;
use crate::cli::InfoArgs;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    server: ServerInfo,
    validation: ValidationInfo,
    partial_failure: String,
    warehouse: String,
    sinks: Vec<SinkInfo>,
}

#[derive(Serialize)]
struct ServerInfo {
    bind: String,
    max_body_bytes: usize,
    api_key_count: usize,
}

#[derive(Serialize)]
struct ValidationInfo {
    placeholder_url_base: String,
    offset_policy: String,
}

#[derive(Serialize)]
struct SinkInfo {
    name: String,
    sink_type: String,
    queue_capacity: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    params: HashMap<String, String>,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    let blueprint = load_blueprint(&args.config)?;

    if args.effective {
        let toml = config_loader::ConfigLoader::to_toml(&blueprint)
            .context("Failed to serialize configuration")?;
        print!("{}", toml);
    } else if args.json {
        let info = build_config_info(&blueprint, args);
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&blueprint, args);
    }

    Ok(())
}

fn build_config_info(blueprint: &ServiceBlueprint, args: &InfoArgs) -> ConfigInfo {
    let sinks = blueprint
        .sinks
        .iter()
        .map(|s| SinkInfo {
            name: s.name.clone(),
            sink_type: format!("{:?}", s.sink_type),
            queue_capacity: s.queue_capacity,
            path: s
                .param("path")
                .map(|p| blueprint.warehouse.resolve(p).display().to_string()),
            params: if args.sinks {
                s.params.clone()
            } else {
                HashMap::new()
            },
        })
        .collect();

    ConfigInfo {
        version: format!("{:?}", blueprint.version),
        server: ServerInfo {
            bind: blueprint.server.bind.clone(),
            max_body_bytes: blueprint.server.max_body_bytes,
            api_key_count: blueprint.auth.api_keys.len(),
        },
        validation: ValidationInfo {
            placeholder_url_base: blueprint.validation.placeholder_url_base.clone(),
            offset_policy: format!("{:?}", blueprint.validation.offset_policy),
        },
        partial_failure: format!("{:?}", blueprint.delivery.partial_failure),
        warehouse: blueprint.warehouse.root.display().to_string(),
        sinks,
    }
}

fn print_config_info(blueprint: &ServiceBlueprint, args: &InfoArgs) {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║               Feedback Warehouse Configuration               ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    println!("🌐 Server");
    println!("   ├─ Version: {:?}", blueprint.version);
    println!("   ├─ Bind: {}", blueprint.server.bind);
    println!("   ├─ Max body: {} bytes", blueprint.server.max_body_bytes);
    println!("   └─ API keys: {}", blueprint.auth.api_keys.len());

    println!("\n✅ Validation");
    println!(
        "   ├─ Placeholder URL base: {}",
        blueprint.validation.placeholder_url_base
    );
    println!(
        "   ├─ Offset policy: {:?}",
        blueprint.validation.offset_policy
    );
    println!(
        "   └─ Partial failures: {:?}",
        blueprint.delivery.partial_failure
    );

    println!("\n📦 Warehouse: {}", blueprint.warehouse.root.display());

    if !blueprint.sinks.is_empty() {
        println!("\n📤 Sinks ({})", blueprint.sinks.len());
        for (i, sink) in blueprint.sinks.iter().enumerate() {
            let is_last = i == blueprint.sinks.len() - 1;
            let prefix = if is_last { "└─" } else { "├─" };
            let child_prefix = if is_last { "   " } else { "│  " };
            println!("   {} {} ({:?})", prefix, sink.name, sink.sink_type);

            if args.sinks {
                let mut params: Vec<_> = sink.params.iter().collect();
                params.sort();
                for (key, value) in params {
                    println!("   {}  {} = {}", child_prefix, key, value);
                }
            }
        }
    }

    println!();
}
