//! Compile, extract and generate

use anyhow::Result;
use kiln_pipeline::Mode;

/// Run the build command
pub async fn run(config_path: &str, force: bool, json: bool) -> Result<()> {
    super::execute(config_path, Mode::Full, force, json).await
}
