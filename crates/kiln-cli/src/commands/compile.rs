//! Compile contracts

use anyhow::Result;
use kiln_pipeline::Mode;

/// Run the compile command
///
/// Extraction and generation follow `interfaces.run_on_compile`.
pub async fn run(config_path: &str, force: bool, json: bool) -> Result<()> {
    super::execute(config_path, Mode::Auto, force, json).await
}
