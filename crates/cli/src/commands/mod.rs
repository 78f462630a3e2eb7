//! Command implementations.

mod import;
mod info;
mod query;
mod serve;
mod validate;

pub use import::run_import;
pub use info::run_info;
pub use query::run_query;
pub use serve::run_serve;
pub use validate::run_validate;

use anyhow::{Context, Result};
use std::path::Path;

use contracts::ServiceBlueprint;

use crate::error::CliError;

/// Load a configuration file, failing early when it does not exist
fn load_blueprint(path: &Path) -> Result<ServiceBlueprint> {
    if !path.exists() {
        return Err(CliError::config_not_found(path).into());
    }
    config_loader::ConfigLoader::load_from_path(path)
        .with_context(|| format!("Failed to load config from {}", path.display()))
}

/// Re-run validation after command-line overrides were applied
fn revalidate(blueprint: &ServiceBlueprint) -> Result<()> {
    config_loader::ConfigLoader::validate(blueprint)
        .map_err(|e| CliError::config_validation(e.to_string()).into())
}
