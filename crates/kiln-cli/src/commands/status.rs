//! Show project status command

use anyhow::{Context, Result};

/// Run the status command
pub async fn run(config_path: &str) -> Result<()> {
    let config = super::load_config(config_path)?;
    println!("Project: {} ({})", config.pipeline.name, config.pipeline.version);

    let pipeline = super::pipeline(config)?;
    let statuses = pipeline.status().context("Failed to read source status")?;

    if statuses.is_empty() {
        println!("No contract sources found");
        return Ok(());
    }

    for unit in &statuses {
        println!(
            "  {:<28} {:<9} {}",
            unit.name,
            unit.language.to_string(),
            unit.freshness
        );
    }

    let cached = pipeline.store().names().len();
    println!("{} source units, {} cached artifacts", statuses.len(), cached);
    Ok(())
}
