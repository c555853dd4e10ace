//! Initialize a new Kiln project

use anyhow::Result;
use std::fs;
use std::path::Path;

use kiln_core::config::CONFIG_FILE;

/// Run the init command
pub async fn run(path: &str, name: Option<&str>) -> Result<()> {
    let project_dir = Path::new(path);

    if !project_dir.exists() {
        fs::create_dir_all(project_dir)?;
    }

    let abs_path = project_dir.canonicalize()?;

    let project_name = match name {
        Some(n) => n.to_string(),
        None => abs_path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("Could not determine project name from path"))?,
    };

    if project_dir.join(CONFIG_FILE).exists() {
        anyhow::bail!(
            "Directory '{}' already contains a {}",
            project_dir.display(),
            CONFIG_FILE
        );
    }

    tracing::info!("Creating new Kiln project: {}", project_name);

    fs::create_dir_all(project_dir.join("contracts"))?;

    let config = format!(
        r#"# Kiln project configuration
name: {project_name}
version: "0.1.0"
sources: contracts

compilers:
  vyper:
    version: "0.3.1"
  solidity:
    version: "0.8.9"
    optimizer_runs: 200

build:
  cache_dir: .kiln/cache
  concurrency: 4

# Interface descriptors for the listed artifacts
interfaces:
  path: abis
  run_on_compile: true
  clear: true
  flat: false
  only: []

# Typed client bindings
bindings:
  out_dir: bindings
  target: ethers-v5
  always_generate_overloads: false
"#
    );
    fs::write(project_dir.join(CONFIG_FILE), config)?;

    let gitignore = r#"# Kiln cache and scratch output
.kiln/

# IDE
.idea/
.vscode/
*.swp
"#;
    fs::write(project_dir.join(".gitignore"), gitignore)?;

    tracing::info!(
        "✓ Created project '{}' at {}",
        project_name,
        abs_path.display()
    );
    tracing::info!("");
    tracing::info!("Next steps:");
    if path != "." {
        tracing::info!("  cd {}", project_dir.display());
    }
    tracing::info!("  kiln validate    # Check configuration");
    tracing::info!("  kiln build       # Compile, export interfaces, generate bindings");

    Ok(())
}
