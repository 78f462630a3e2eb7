//! `query` command implementation.

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::info;

use contracts::{ServiceBlueprint, SinkType};
use dispatcher::{FeedbackIndexReader, IndexQuery, IndexedFeedback};

use super::load_blueprint;
use crate::cli::QueryArgs;
use crate::error::CliError;

/// Execute the `query` command
pub fn run_query(args: &QueryArgs) -> Result<()> {
    let path = match args.index {
        Some(ref path) => path.clone(),
        None => {
            let blueprint = load_blueprint(&args.config)?;
            index_path(&blueprint, args.sink.as_deref())?
        }
    };

    let query = build_query(args);
    info!(index = %path.display(), query = ?query, limit = args.limit, "Querying feedback index");

    let reader = FeedbackIndexReader::open(&path)
        .with_context(|| format!("Failed to open index at {}", path.display()))?;
    let total = reader.count()?;
    let hits = reader.search(&query, args.limit)?;

    if args.json {
        let json = serde_json::to_string_pretty(&hits).context("Failed to serialize results")?;
        println!("{}", json);
    } else {
        print_hits(&hits, total);
    }
    Ok(())
}

/// Directory of the named index sink, or of the first one
fn index_path(blueprint: &ServiceBlueprint, sink: Option<&str>) -> Result<PathBuf> {
    let config = blueprint
        .sinks
        .iter()
        .filter(|s| s.sink_type == SinkType::Index)
        .find(|s| sink.map_or(true, |name| s.name == name))
        .ok_or_else(|| CliError::sink_not_found(sink))?;

    let path = config
        .param("path")
        .ok_or_else(|| CliError::config_validation(format!("sink '{}' has no path", config.name)))?;
    Ok(blueprint.warehouse.resolve(path))
}

fn build_query(args: &QueryArgs) -> IndexQuery {
    if let Some(ref uri) = args.entity {
        IndexQuery::EntityUri(uri.clone())
    } else if let Some(ref form) = args.surface_form {
        IndexQuery::SurfaceForm(form.clone())
    } else if let Some(verdict) = args.verdict {
        IndexQuery::Verdict(verdict.into())
    } else if let Some(ref url) = args.doc_url {
        IndexQuery::DocUrl(url.clone())
    } else {
        IndexQuery::All
    }
}

fn print_hits(hits: &[IndexedFeedback], total: u64) {
    println!("{} of {} stored feedback record(s)\n", hits.len(), total);
    for hit in hits {
        let offset = if hit.offset < 0 {
            "-".to_string()
        } else {
            hit.offset.to_string()
        };
        println!(
            "[{}] {} @ {} -> {}",
            hit.verdict, hit.surface_form, offset, hit.entity_uri
        );
        println!("    url:  {}", hit.doc_url);
        println!("    text: {}", hit.text);
        if !hit.systems.is_empty() {
            println!("    systems: {}", hit.systems.join(", "));
        }
        if let Some(ref right) = hit.right_entity {
            println!("    right entity: {}", right);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;

    fn query_args(argv: &[&str]) -> QueryArgs {
        let mut full = vec!["feedback-warehouse", "query"];
        full.extend_from_slice(argv);
        match Cli::try_parse_from(full).unwrap().command {
            Commands::Query(args) => args,
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn filters_map_to_index_queries() {
        assert_eq!(build_query(&query_args(&[])), IndexQuery::All);
        assert_eq!(
            build_query(&query_args(&["--verdict", "incorrect"])),
            IndexQuery::Verdict(contracts::FeedbackVerdict::Incorrect)
        );
        assert_eq!(
            build_query(&query_args(&["--doc-url", "http://example.org/a"])),
            IndexQuery::DocUrl("http://example.org/a".into())
        );
    }

    #[test]
    fn index_sink_is_located_in_configuration() {
        let blueprint = config_loader::ConfigLoader::load_from_str(
            r#"
[auth]
api_keys = ["k"]

[warehouse]
root = "/srv/feedback"

[[sinks]]
name = "tsv"
sink_type = "delimited"
params = { path = "feedback.tsv" }

[[sinks]]
name = "search"
sink_type = "index"
params = { path = "index" }
"#,
            config_loader::ConfigFormat::Toml,
        )
        .unwrap();

        assert_eq!(
            index_path(&blueprint, None).unwrap(),
            PathBuf::from("/srv/feedback/index")
        );
        assert_eq!(
            index_path(&blueprint, Some("search")).unwrap(),
            PathBuf::from("/srv/feedback/index")
        );
        assert!(index_path(&blueprint, Some("tsv")).is_err());
    }
}
