//! Validate configuration command

use anyhow::{Context, Result};
use std::collections::{BTreeMap, HashSet};

use kiln_core::{Language, SourceUnit};

/// Run the validate command
pub async fn run(config_path: &str) -> Result<()> {
    tracing::info!("Validating configuration: {}", config_path);

    let config = super::load_config(config_path)?;
    let p = &config.pipeline;

    tracing::info!("✓ Project: {}", p.name);
    tracing::info!("✓ Version: {}", p.version);
    for language in Language::ALL {
        if let Ok(compiler) = config.compiler(language) {
            tracing::info!("✓ {} {}", language, compiler.version);
        }
    }
    tracing::info!("✓ Bindings: {}", p.bindings.target.as_str());

    let sources = config
        .discover_sources()
        .context("Failed to discover sources")?;
    let mut by_language: BTreeMap<Language, usize> = BTreeMap::new();
    let mut names = HashSet::new();
    for path in &sources {
        let unit = SourceUnit::read(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        *by_language.entry(unit.language).or_default() += 1;
        names.insert(unit.artifact_name().to_string());
    }
    tracing::info!("✓ {} source units in {}", sources.len(), config.sources_dir().display());

    let missing: Vec<Language> = by_language
        .keys()
        .copied()
        .filter(|language| config.compiler(*language).is_err())
        .collect();

    for name in &p.interfaces.only {
        if !names.contains(name) {
            tracing::warn!(
                "Selected artifact '{}' has no source; extraction will fail with a selection error",
                name
            );
        }
    }

    if !missing.is_empty() {
        for language in &missing {
            eprintln!(
                "  ✗ {} {} source(s) but no compilers.{} section",
                by_language[language], language, language
            );
        }
        anyhow::bail!("{} language(s) lack a compiler", missing.len());
    }

    tracing::info!("✓ Configuration is valid");
    Ok(())
}
