//! CLI command implementations

pub mod build;
pub mod clean;
pub mod compile;
pub mod init;
pub mod status;
pub mod validate;

use anyhow::{Context, Result};
use std::sync::Arc;

use kiln_codegen::adapters_from_config;
use kiln_core::{CancelToken, Config};
use kiln_pipeline::{Mode, Pipeline, RunReport};

/// Load the configuration behind `config_path`
pub fn load_config(config_path: &str) -> Result<Arc<Config>> {
    tracing::debug!("Loading configuration from {}", config_path);
    let config = Config::load(config_path).context("Failed to load configuration")?;
    Ok(Arc::new(config))
}

/// Build a pipeline with the process-backed adapters
pub fn pipeline(config: Arc<Config>) -> Result<Pipeline> {
    let adapters = adapters_from_config(&config);
    Pipeline::new(config, adapters).context("Failed to set up pipeline")
}

/// Run the pipeline once, cancelling on Ctrl+C
pub async fn execute(config_path: &str, mode: Mode, force: bool, json: bool) -> Result<()> {
    let config = load_config(config_path)?;
    tracing::info!("Project: {}", config.pipeline.name);

    let pipeline = pipeline(config)?;
    if force {
        pipeline.clear_cache().context("Failed to clear cache")?;
    }

    let cancel = CancelToken::new();
    let run = pipeline.run(mode, &cancel);
    tokio::pin!(run);

    let report = tokio::select! {
        report = &mut run => report,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received interrupt, cancelling");
            cancel.cancel();
            run.await
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report_json(&report))?);
    }
    conclude(&report)
}

fn report_json(report: &RunReport) -> serde_json::Value {
    serde_json::json!({
        "id": report.id.to_string(),
        "state": report.state,
        "history": report.history,
        "compiled": report.compiled,
        "cache_hits": report.cache_hits,
        "descriptors": report.descriptors,
        "bindings": report.bindings,
        "generate_skipped": report.generate_skipped,
        "errors": report.errors.iter().map(|e| e.to_string()).collect::<Vec<_>>(),
    })
}

/// Summarize a report; a failed run lists every error and returns `Err`
fn conclude(report: &RunReport) -> Result<()> {
    if report.is_success() {
        tracing::info!(
            "✓ {} compiled, {} cached, {} descriptors, {} bindings",
            report.compiled.len(),
            report.cache_hits.len(),
            report.descriptors.len(),
            report.bindings.len()
        );
        return Ok(());
    }

    eprintln!("Build failed with {} error(s):", report.errors.len());
    for error in &report.errors {
        eprintln!("  ✗ {}", error);
    }
    anyhow::bail!("run {} ended in state {}", report.id, report.state)
}
