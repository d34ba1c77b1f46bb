//! `solarweb once`: login, discovery, one sweep, print the tree.

use std::sync::Arc;

use clap::ValueEnum;
use tracing::info;

use solarweb_core::{Scheduler, TreeStore};

use crate::cli::{GlobalOpts, OnceArgs, OutputFormat};
use crate::error::CliError;

pub async fn handle(args: &OnceArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let resolved = super::resolve(global)?;
    let format = match args.output {
        Some(format) => format,
        None => OutputFormat::from_str(&resolved.config.defaults.output, true).map_err(
            |reason| CliError::Validation {
                field: "defaults.output".into(),
                reason,
            },
        )?,
    };

    let mirror = resolved.mirror_config()?;
    let url = mirror.base_url.to_string();
    let store = Arc::new(TreeStore::new());
    let scheduler = Scheduler::new(mirror, store.clone())
        .map_err(|e| CliError::from_core(e, &resolved.name, &url))?;

    let report = scheduler
        .run_once()
        .await
        .map_err(|e| CliError::from_core(e, &resolved.name, &url))?;
    info!(
        requests = report.requests,
        projected = report.projected,
        failed = report.failed,
        disabled = ?report.disabled,
        "sweep finished"
    );

    let tree = store.to_json();
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&tree)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(&tree)?),
    }
    Ok(())
}
