//! Configuration parsing and validation
//!
//! This module handles loading and validating the Kiln pipeline configuration.
//! The configuration is loaded once per run and never mutated afterwards;
//! components receive it behind an `Arc`.
//!
//! # Configuration File
//!
//! `kiln.yaml` at the project root:
//!
//! ```yaml
//! name: shibui-dao
//! sources: contracts
//! compilers:
//!   vyper:
//!     version: "0.3.1"
//! interfaces:
//!   path: abis
//!   run_on_compile: true
//!   clear: true
//!   flat: false
//!   only: [VotingEscrow, RewardsOnlyGauge, RewardDripper]
//! bindings:
//!   out_dir: bindings
//!   target: ethers-v5
//!   always_generate_overloads: true
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::source::{self, Language};

/// File name looked up when a directory is given to [`Config::load`]
pub const CONFIG_FILE: &str = "kiln.yaml";

/// Pipeline configuration from `kiln.yaml`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Project name
    pub name: String,

    /// Project version
    #[serde(default = "default_version")]
    pub version: String,

    /// Directory scanned for contract sources
    #[serde(default = "default_sources")]
    pub sources: String,

    /// Compiler selection per language
    #[serde(default)]
    pub compilers: CompilersConfig,

    /// Build settings (cache, scratch, concurrency)
    #[serde(default)]
    pub build: BuildConfig,

    /// Interface descriptor export
    #[serde(default, alias = "abi_exporter", alias = "abiExporter")]
    pub interfaces: InterfaceConfig,

    /// Typed binding generation
    #[serde(default, alias = "typechain")]
    pub bindings: BindingConfig,
}

fn default_version() -> String {
    "0.1.0".to_string()
}

fn default_sources() -> String {
    "contracts".to_string()
}

fn default_true() -> bool {
    true
}

/// Compilers, one optional section per language
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CompilersConfig {
    /// solc settings
    #[serde(default)]
    pub solidity: Option<CompilerConfig>,

    /// vyper settings
    #[serde(default)]
    pub vyper: Option<CompilerConfig>,
}

/// Settings for one compiler
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompilerConfig {
    /// Required compiler version, e.g. `0.3.1`
    #[serde(alias = "compilerVersion")]
    pub version: String,

    /// Executable to invoke (defaults to `solc` / `vyper`)
    #[serde(default)]
    pub command: Option<String>,

    /// Enable the optimizer
    #[serde(default = "default_true")]
    pub optimize: bool,

    /// Optimizer runs (solc only)
    #[serde(default = "default_optimizer_runs")]
    pub optimizer_runs: u32,

    /// Target EVM version
    #[serde(default)]
    pub evm_version: Option<String>,

    /// Additional arguments passed verbatim
    #[serde(default)]
    pub extra_args: Vec<String>,
}

fn default_optimizer_runs() -> u32 {
    200
}

impl CompilerConfig {
    /// Create settings for the given version with defaults elsewhere
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            command: None,
            optimize: true,
            optimizer_runs: default_optimizer_runs(),
            evm_version: None,
            extra_args: vec![],
        }
    }

    /// Executable name, falling back to `default`
    pub fn command_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.command.as_deref().unwrap_or(default)
    }
}

/// Build-wide settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Artifact store directory
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,

    /// Directory for intermediate compiler output
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: String,

    /// Keep raw compiler output in the scratch directory
    #[serde(default)]
    pub keep_scratch: bool,

    /// Maximum concurrent compiler processes
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Per-invocation compiler timeout
    #[serde(default)]
    pub compiler_timeout_secs: Option<u64>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            scratch_dir: default_scratch_dir(),
            keep_scratch: false,
            concurrency: default_concurrency(),
            compiler_timeout_secs: None,
        }
    }
}

impl BuildConfig {
    /// Compiler timeout as a duration
    pub fn compiler_timeout(&self) -> Option<Duration> {
        self.compiler_timeout_secs.map(Duration::from_secs)
    }
}

fn default_cache_dir() -> String {
    ".kiln/cache".to_string()
}

fn default_scratch_dir() -> String {
    ".kiln/scratch".to_string()
}

fn default_concurrency() -> usize {
    4
}

/// Interface descriptor export settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceConfig {
    /// Output directory for descriptors
    #[serde(default = "default_interfaces_dir", alias = "outputPath")]
    pub path: String,

    /// Run extraction and generation after every compile
    #[serde(default, alias = "runOnCompile")]
    pub run_on_compile: bool,

    /// Purge descriptors no longer in scope
    #[serde(default, alias = "clearStale")]
    pub clear: bool,

    /// Merge all descriptors into one namespace
    #[serde(default, alias = "flatten")]
    pub flat: bool,

    /// File stem of the merged descriptor
    #[serde(default = "default_flat_name")]
    pub flat_name: String,

    /// Artifact names to export; empty exports nothing
    #[serde(default, alias = "selection")]
    pub only: Vec<String>,

    /// JSON indentation (0 = compact)
    #[serde(default = "default_spacing")]
    pub spacing: usize,
}

impl Default for InterfaceConfig {
    fn default() -> Self {
        Self {
            path: default_interfaces_dir(),
            run_on_compile: false,
            clear: false,
            flat: false,
            flat_name: default_flat_name(),
            only: vec![],
            spacing: default_spacing(),
        }
    }
}

fn default_interfaces_dir() -> String {
    "abis".to_string()
}

fn default_flat_name() -> String {
    "Interface".to_string()
}

fn default_spacing() -> usize {
    2
}

/// Binding flavor to emit
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Dialect {
    /// TypeScript bindings for ethers v5
    #[default]
    EthersV5,
    /// Rust bindings over alloy primitives
    Rust,
}

impl Dialect {
    /// Config spelling of the dialect
    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::EthersV5 => "ethers-v5",
            Dialect::Rust => "rust",
        }
    }
}

/// Typed binding generation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindingConfig {
    /// Output directory for bindings
    #[serde(default = "default_bindings_dir", alias = "outDir")]
    pub out_dir: String,

    /// Binding dialect
    #[serde(default)]
    pub target: Dialect,

    /// Emit a variant per overload signature
    #[serde(default, alias = "alwaysGenerateOverloads")]
    pub always_generate_overloads: bool,

    /// Glob patterns of pre-built descriptor files to include
    #[serde(default, alias = "externalArtifacts")]
    pub external_artifacts: Vec<String>,
}

impl Default for BindingConfig {
    fn default() -> Self {
        Self {
            out_dir: default_bindings_dir(),
            target: Dialect::default(),
            always_generate_overloads: false,
            external_artifacts: vec![],
        }
    }
}

fn default_bindings_dir() -> String {
    "bindings".to_string()
}

/// Loaded configuration: the parsed file plus the project root it lives in
#[derive(Debug, Clone)]
pub struct Config {
    /// Parsed pipeline configuration
    pub pipeline: PipelineConfig,

    /// Base path of the project
    pub base_path: PathBuf,
}

impl Config {
    /// Load configuration from a directory or a `kiln.yaml` file
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let config = Config::load("./my-project")?;
    /// println!("Project: {}", config.pipeline.name);
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let (config_path, base_path) = if path.is_dir() {
            (path.join(CONFIG_FILE), path.to_path_buf())
        } else {
            (
                path.to_path_buf(),
                path.parent().unwrap_or(Path::new(".")).to_path_buf(),
            )
        };

        if !config_path.exists() {
            return Err(Error::ConfigNotFound {
                path: config_path.display().to_string(),
            });
        }

        tracing::debug!("Loading configuration from {}", config_path.display());
        let contents = std::fs::read_to_string(&config_path)?;
        Self::from_yaml(&contents, base_path)
    }

    /// Parse and validate configuration text rooted at `base_path`
    pub fn from_yaml(yaml: &str, base_path: impl Into<PathBuf>) -> Result<Self> {
        let pipeline: PipelineConfig = serde_yaml::from_str(yaml)?;
        let config = Self {
            pipeline,
            base_path: base_path.into(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Check invariants serde cannot express
    pub fn validate(&self) -> Result<()> {
        let p = &self.pipeline;

        if p.build.concurrency == 0 {
            return Err(Error::invalid("build.concurrency must be at least 1"));
        }

        for language in Language::ALL {
            if let Some(compiler) = self.compiler_section(language)
                && compiler.version.trim().is_empty()
            {
                return Err(Error::invalid(format!(
                    "compilers.{}.version must not be empty",
                    language
                )));
            }
        }

        let mut seen = HashSet::new();
        for name in &p.interfaces.only {
            if !seen.insert(name.as_str()) {
                return Err(Error::invalid(format!(
                    "interfaces.only lists '{}' more than once",
                    name
                )));
            }
        }

        if p.interfaces.spacing > 16 {
            return Err(Error::invalid("interfaces.spacing must be at most 16"));
        }

        if p.interfaces.flat && p.interfaces.flat_name.trim().is_empty() {
            return Err(Error::invalid(
                "interfaces.flat_name must not be empty when flat is enabled",
            ));
        }

        Ok(())
    }

    fn compiler_section(&self, language: Language) -> Option<&CompilerConfig> {
        match language {
            Language::Solidity => self.pipeline.compilers.solidity.as_ref(),
            Language::Vyper => self.pipeline.compilers.vyper.as_ref(),
        }
    }

    /// Compiler settings for a language
    pub fn compiler(&self, language: Language) -> Result<&CompilerConfig> {
        self.compiler_section(language).ok_or_else(|| {
            Error::invalid(format!(
                "no compiler configured for {} (add compilers.{}.version)",
                language, language
            ))
        })
    }

    /// Resolve a configured path against the project root
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_path.join(path)
        }
    }

    /// Contract source root
    pub fn sources_dir(&self) -> PathBuf {
        self.resolve(&self.pipeline.sources)
    }

    /// Artifact store directory
    pub fn cache_dir(&self) -> PathBuf {
        self.resolve(&self.pipeline.build.cache_dir)
    }

    /// Scratch directory for compiler output
    pub fn scratch_dir(&self) -> PathBuf {
        self.resolve(&self.pipeline.build.scratch_dir)
    }

    /// Interface descriptor output directory
    pub fn interfaces_dir(&self) -> PathBuf {
        self.resolve(&self.pipeline.interfaces.path)
    }

    /// Binding output directory
    pub fn bindings_dir(&self) -> PathBuf {
        self.resolve(&self.pipeline.bindings.out_dir)
    }

    /// All contract source files under the source root, sorted
    pub fn discover_sources(&self) -> Result<Vec<PathBuf>> {
        source::discover_sources(&self.sources_dir())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_parse_minimal_config() {
        let config = Config::from_yaml("name: test-project\n", ".").unwrap();
        let p = &config.pipeline;
        assert_eq!(p.name, "test-project");
        assert_eq!(p.version, "0.1.0");
        assert_eq!(p.sources, "contracts");
        assert_eq!(p.build.concurrency, 4);
        assert!(!p.interfaces.run_on_compile);
        assert!(p.interfaces.only.is_empty());
        assert_eq!(p.bindings.target, Dialect::EthersV5);
        assert!(p.compilers.vyper.is_none());
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
name: shibui
sources: src/contracts
compilers:
  vyper:
    version: "0.3.1"
  solidity:
    version: "0.8.9"
    command: solc-0.8.9
    optimizer_runs: 1000
build:
  concurrency: 2
  compiler_timeout_secs: 30
interfaces:
  path: ./abis
  run_on_compile: true
  clear: true
  flat: true
  only: [VotingEscrow, RewardsOnlyGauge, RewardDripper]
  spacing: 4
bindings:
  out_dir: typechain
  target: rust
  always_generate_overloads: true
  external_artifacts: ["vendor/*.json"]
"#;
        let config = Config::from_yaml(yaml, "/project").unwrap();
        let p = &config.pipeline;
        assert_eq!(p.compilers.vyper.as_ref().unwrap().version, "0.3.1");
        let solc = config.compiler(Language::Solidity).unwrap();
        assert_eq!(solc.command_or("solc"), "solc-0.8.9");
        assert_eq!(solc.optimizer_runs, 1000);
        assert_eq!(p.build.compiler_timeout(), Some(Duration::from_secs(30)));
        assert!(p.interfaces.flat);
        assert_eq!(p.interfaces.only.len(), 3);
        assert_eq!(p.bindings.target, Dialect::Rust);
        assert_eq!(config.sources_dir(), PathBuf::from("/project/src/contracts"));
        assert_eq!(config.bindings_dir(), PathBuf::from("/project/typechain"));
    }

    #[test]
    fn test_parse_hardhat_style_aliases() {
        let yaml = r#"
name: shibui
abiExporter:
  outputPath: ./abis
  runOnCompile: true
  clearStale: true
  flatten: true
  selection: [VotingEscrow]
typechain:
  outDir: typechain
  alwaysGenerateOverloads: true
  externalArtifacts: ["abis/*.json"]
"#;
        let config = Config::from_yaml(yaml, ".").unwrap();
        let p = &config.pipeline;
        assert!(p.interfaces.run_on_compile);
        assert!(p.interfaces.clear);
        assert!(p.interfaces.flat);
        assert_eq!(p.interfaces.only, vec!["VotingEscrow"]);
        assert_eq!(p.bindings.out_dir, "typechain");
        assert!(p.bindings.always_generate_overloads);
        assert_eq!(p.bindings.external_artifacts, vec!["abis/*.json"]);
    }

    #[rstest]
    #[case("name: x\nbuild:\n  concurrency: 0\n")]
    #[case("name: x\ncompilers:\n  vyper:\n    version: \" \"\n")]
    #[case("name: x\ninterfaces:\n  only: [A, B, A]\n")]
    #[case("name: x\ninterfaces:\n  spacing: 40\n")]
    #[case("name: x\ninterfaces:\n  flat: true\n  flat_name: \"\"\n")]
    fn test_invalid_configs(#[case] yaml: &str) {
        let err = Config::from_yaml(yaml, ".").unwrap_err();
        assert!(matches!(err, Error::ConfigInvalid { .. }), "got {err:?}");
    }

    #[test]
    fn test_unknown_dialect_is_parse_error() {
        let err = Config::from_yaml("name: x\nbindings:\n  target: web3-v1\n", ".").unwrap_err();
        assert!(matches!(err, Error::ConfigParse(_)));
    }

    #[test]
    fn test_missing_compiler_section() {
        let config = Config::from_yaml("name: x\n", ".").unwrap();
        let err = config.compiler(Language::Vyper).unwrap_err();
        assert!(err.to_string().contains("vyper"));
    }

    #[test]
    fn test_resolve_keeps_absolute_paths() {
        let config = Config::from_yaml("name: x\n", "/project").unwrap();
        assert_eq!(config.resolve("/tmp/out"), PathBuf::from("/tmp/out"));
        assert_eq!(config.resolve("out"), PathBuf::from("/project/out"));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(dir.path()).unwrap_err();
        assert!(matches!(err, Error::ConfigNotFound { .. }));
    }

    #[test]
    fn test_load_from_dir_and_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "name: loaded\n").unwrap();

        let from_dir = Config::load(dir.path()).unwrap();
        assert_eq!(from_dir.pipeline.name, "loaded");
        assert_eq!(from_dir.base_path, dir.path());

        let from_file = Config::load(dir.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(from_file.base_path, dir.path());
    }
}
