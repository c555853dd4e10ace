//! Remove cached artifacts and generated output

use anyhow::{Context, Result};
use std::fs;

/// Run the clean command
pub async fn run(config_path: &str) -> Result<()> {
    let config = super::load_config(config_path)?;

    let targets = [
        config.cache_dir(),
        config.scratch_dir(),
        config.interfaces_dir(),
        config.bindings_dir(),
    ];

    for dir in targets {
        if !dir.exists() {
            continue;
        }
        let files = walkdir::WalkDir::new(&dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .count();
        fs::remove_dir_all(&dir).with_context(|| format!("Failed to remove {}", dir.display()))?;
        tracing::info!("Removed {} ({} files)", dir.display(), files);
    }

    tracing::info!("✓ Clean");
    Ok(())
}
