//! Kiln CLI
//!
//! Developer tool for compiling contracts, exporting their interfaces and
//! generating typed bindings.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

/// Kiln - contract build pipeline
#[derive(Parser)]
#[command(name = "kiln")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file or project directory
    #[arg(short, long, default_value = "kiln.yaml", env = "KILN_CONFIG")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new Kiln project
    Init {
        /// Directory to initialize (defaults to current directory)
        #[arg(default_value = ".")]
        path: String,

        /// Project name (defaults to directory name)
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Compile contracts; extract and generate when run_on_compile is set
    Compile {
        /// Force recompile (ignore cache)
        #[arg(long)]
        force: bool,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Compile, extract interfaces and generate bindings
    Build {
        /// Force recompile (ignore cache)
        #[arg(long)]
        force: bool,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Remove cached artifacts and generated output
    Clean,

    /// Validate configuration and sources without compiling
    Validate,

    /// Show cache state of every source unit
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Init { path, name } => {
            commands::init::run(&path, name.as_deref()).await?;
        }
        Commands::Compile { force, json } => {
            commands::compile::run(&cli.config, force, json).await?;
        }
        Commands::Build { force, json } => {
            commands::build::run(&cli.config, force, json).await?;
        }
        Commands::Clean => {
            commands::clean::run(&cli.config).await?;
        }
        Commands::Validate => {
            commands::validate::run(&cli.config).await?;
        }
        Commands::Status => {
            commands::status::run(&cli.config).await?;
        }
    }

    Ok(())
}
