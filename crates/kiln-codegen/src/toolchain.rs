//! Toolchain adapters
//!
//! One adapter per source language wraps an external compiler and
//! normalizes its output into a [`CompiledArtifact`]. The orchestrator is
//! handed an explicit [`AdapterRegistry`]; tests substitute their own adapters.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;

use kiln_core::config::CompilerConfig;
use kiln_core::{CancelToken, CompiledArtifact, Config, Language, SourceUnit};

use crate::compiler::{self, Invocation};
use crate::error::{Error, Result};
use crate::parser;

/// A compiler for one source language
#[async_trait]
pub trait ToolchainAdapter: Send + Sync {
    /// Language this adapter compiles
    fn language(&self) -> Language;

    /// Output-affecting flags, folded into artifact fingerprints
    fn flags(&self) -> Vec<String>;

    /// Compile one unit with the requested compiler version
    async fn compile(
        &self,
        unit: &SourceUnit,
        version: &str,
        cancel: &CancelToken,
    ) -> Result<CompiledArtifact>;
}

/// Explicit language → adapter mapping
pub type AdapterRegistry = BTreeMap<Language, Arc<dyn ToolchainAdapter>>;

/// Settings shared by the process-backed adapters
#[derive(Debug, Clone)]
pub struct AdapterOptions {
    /// Source root, used as the compiler's import base path
    pub base_path: PathBuf,
    /// Where to keep raw compiler output, if anywhere
    pub scratch_dir: Option<PathBuf>,
    /// Per-invocation timeout
    pub timeout: Option<Duration>,
}

impl AdapterOptions {
    /// Derive adapter options from the pipeline configuration
    pub fn from_config(config: &Config) -> Self {
        let build = &config.pipeline.build;
        Self {
            base_path: config.sources_dir(),
            scratch_dir: build.keep_scratch.then(|| config.scratch_dir()),
            timeout: build.compiler_timeout(),
        }
    }
}

/// Build adapters for every language that has a compiler section
pub fn adapters_from_config(config: &Config) -> AdapterRegistry {
    let options = AdapterOptions::from_config(config);
    let compilers = &config.pipeline.compilers;
    let mut registry = AdapterRegistry::new();

    if let Some(settings) = &compilers.solidity {
        registry.insert(
            Language::Solidity,
            Arc::new(SolcAdapter::new(settings.clone(), options.clone())),
        );
    }
    if let Some(settings) = &compilers.vyper {
        registry.insert(
            Language::Vyper,
            Arc::new(VyperAdapter::new(settings.clone(), options)),
        );
    }
    registry
}

/// Extract the bare version from `--version` output
///
/// `Version: 0.8.9+commit.e5eed63a.Linux.g++` → `0.8.9`; `0.3.1+commit.0463ea4c` → `0.3.1`.
pub fn installed_version(output: &str) -> Option<String> {
    output
        .split(|c: char| c.is_whitespace() || c == ':' || c == ',')
        .find(|token| {
            token.starts_with(|c: char| c.is_ascii_digit()) && token.matches('.').count() >= 2
        })
        .map(|token| {
            token
                .split(['+', '-'])
                .next()
                .unwrap_or(token)
                .trim_end_matches('.')
                .to_string()
        })
}

/// Probes the installed compiler version once per adapter
///
/// A check interrupted by cancellation or a timeout is not remembered.
#[derive(Debug, Default)]
struct VersionProbe {
    installed: OnceCell<std::result::Result<String, String>>,
}

impl VersionProbe {
    async fn ensure(
        &self,
        language: Language,
        program: &str,
        requested: &str,
        options: &AdapterOptions,
        cancel: &CancelToken,
    ) -> Result<()> {
        let installed = self
            .installed
            .get_or_try_init(|| async {
                match compiler::probe_version(language, program, options.timeout, cancel).await {
                    Ok(output) => Ok(installed_version(&output).ok_or_else(|| {
                        format!("unrecognized `{} --version` output: {}", program, output)
                    })),
                    Err(e @ (Error::Cancelled | Error::Timeout { .. })) => Err(e),
                    Err(Error::Toolchain { message, .. }) => Ok(Err(message)),
                    Err(e) => Ok(Err(e.to_string())),
                }
            })
            .await?;

        match installed {
            Ok(version) if version == requested => Ok(()),
            Ok(version) => Err(Error::Toolchain {
                language,
                message: format!(
                    "{} is version {}, but {} is required",
                    program, version, requested
                ),
            }),
            Err(message) => Err(Error::Toolchain {
                language,
                message: message.clone(),
            }),
        }
    }
}

/// Parse `major.minor.patch`, ignoring any pre-release or build suffix
fn semver(version: &str) -> Option<(u64, u64, u64)> {
    let core = version.split(['+', '-', 'b', 'r']).next()?;
    let mut parts = core.split('.').map(|p| p.parse::<u64>().ok());
    let major = parts.next()??;
    let minor = parts.next()??;
    let patch = parts.next().flatten().unwrap_or(0);
    Some((major, minor, patch))
}

/// First vyper release accepting `--no-optimize`
const VYPER_NO_OPTIMIZE_SINCE: (u64, u64, u64) = (0, 3, 4);

fn source_key(unit: &Path, base: &Path) -> String {
    let relative = unit.strip_prefix(base).unwrap_or(unit);
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// solc via `--standard-json`
#[derive(Debug)]
pub struct SolcAdapter {
    settings: CompilerConfig,
    options: AdapterOptions,
    probe: VersionProbe,
}

impl SolcAdapter {
    /// Create an adapter for the given settings
    pub fn new(settings: CompilerConfig, options: AdapterOptions) -> Self {
        Self {
            settings,
            options,
            probe: VersionProbe::default(),
        }
    }

    fn program(&self) -> &str {
        self.settings.command_or("solc")
    }
}

#[async_trait]
impl ToolchainAdapter for SolcAdapter {
    fn language(&self) -> Language {
        Language::Solidity
    }

    fn flags(&self) -> Vec<String> {
        let mut flags = vec![
            format!("optimize={}", self.settings.optimize),
            format!("runs={}", self.settings.optimizer_runs),
            format!(
                "evm={}",
                self.settings.evm_version.as_deref().unwrap_or("default")
            ),
        ];
        flags.extend(self.settings.extra_args.iter().cloned());
        flags
    }

    async fn compile(
        &self,
        unit: &SourceUnit,
        version: &str,
        cancel: &CancelToken,
    ) -> Result<CompiledArtifact> {
        self.probe
            .ensure(Language::Solidity, self.program(), version, &self.options, cancel)
            .await?;

        let key = source_key(&unit.path, &self.options.base_path);
        let input = parser::solc_standard_input(&key, &unit.content, &self.settings);
        let base = self.options.base_path.display().to_string();

        let invocation = Invocation::new(Language::Solidity, self.program(), &unit.path)
            .args(["--standard-json", "--base-path", base.as_str(), "--allow-paths", base.as_str()])
            .args(self.settings.extra_args.iter().cloned())
            .with_stdin(serde_json::to_vec(&input)?)
            .with_timeout(self.options.timeout);

        let output = compiler::run(invocation, cancel).await?;
        if let Some(dir) = &self.options.scratch_dir {
            compiler::write_scratch(dir, unit.artifact_name(), Language::Solidity, &output.stdout)?;
        }

        if output.stdout.trim().is_empty() {
            return Err(Error::Compile {
                unit: unit.path.clone(),
                diagnostics: parser::stderr_diagnostics(self.program(), &output.stderr, output.code),
            });
        }

        let normalized = parser::parse_solc_output(&output.stdout, &key, unit.artifact_name())
            .map_err(|diagnostics| Error::Compile {
                unit: unit.path.clone(),
                diagnostics,
            })?;

        Ok(CompiledArtifact::new(unit, version, &self.flags(), normalized))
    }
}

/// vyper via `-f abi,bytecode`
#[derive(Debug)]
pub struct VyperAdapter {
    settings: CompilerConfig,
    options: AdapterOptions,
    probe: VersionProbe,
}

impl VyperAdapter {
    /// Create an adapter for the given settings
    pub fn new(settings: CompilerConfig, options: AdapterOptions) -> Self {
        Self {
            settings,
            options,
            probe: VersionProbe::default(),
        }
    }

    fn program(&self) -> &str {
        self.settings.command_or("vyper")
    }

    fn arguments(&self, unit: &Path, version: &str) -> Vec<String> {
        let mut args = vec![
            "-f".to_string(),
            "abi,bytecode".to_string(),
            "-p".to_string(),
            self.options.base_path.display().to_string(),
        ];
        if let Some(evm_version) = &self.settings.evm_version {
            args.push("--evm-version".to_string());
            args.push(evm_version.clone());
        }
        if !self.settings.optimize {
            match semver(version) {
                Some(v) if v < VYPER_NO_OPTIMIZE_SINCE => tracing::warn!(
                    "vyper {} cannot disable the optimizer; compiling with it enabled",
                    version
                ),
                _ => args.push("--no-optimize".to_string()),
            }
        }
        args.extend(self.settings.extra_args.iter().cloned());
        args.push(unit.display().to_string());
        args
    }
}

#[async_trait]
impl ToolchainAdapter for VyperAdapter {
    fn language(&self) -> Language {
        Language::Vyper
    }

    fn flags(&self) -> Vec<String> {
        let mut flags = vec![
            format!("optimize={}", self.settings.optimize),
            format!(
                "evm={}",
                self.settings.evm_version.as_deref().unwrap_or("default")
            ),
        ];
        flags.extend(self.settings.extra_args.iter().cloned());
        flags
    }

    async fn compile(
        &self,
        unit: &SourceUnit,
        version: &str,
        cancel: &CancelToken,
    ) -> Result<CompiledArtifact> {
        self.probe
            .ensure(Language::Vyper, self.program(), version, &self.options, cancel)
            .await?;

        let invocation = Invocation::new(Language::Vyper, self.program(), &unit.path)
            .args(self.arguments(&unit.path, version))
            .with_timeout(self.options.timeout);

        let output = compiler::run(invocation, cancel).await?;
        if let Some(dir) = &self.options.scratch_dir {
            compiler::write_scratch(dir, unit.artifact_name(), Language::Vyper, &output.stdout)?;
        }

        if !output.success {
            return Err(Error::Compile {
                unit: unit.path.clone(),
                diagnostics: parser::stderr_diagnostics(self.program(), &output.stderr, output.code),
            });
        }

        let normalized = parser::parse_vyper_output(&output.stdout).map_err(|diagnostics| {
            Error::Compile {
                unit: unit.path.clone(),
                diagnostics,
            }
        })?;

        Ok(CompiledArtifact::new(unit, version, &self.flags(), normalized))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn options() -> AdapterOptions {
        AdapterOptions {
            base_path: PathBuf::from("/project/contracts"),
            scratch_dir: None,
            timeout: None,
        }
    }

    #[rstest]
    #[case("solc, the solidity compiler commandline interface\nVersion: 0.8.9+commit.e5eed63a.Linux.g++", Some("0.8.9"))]
    #[case("0.3.1+commit.0463ea4c", Some("0.3.1"))]
    #[case("0.3.10", Some("0.3.10"))]
    #[case("vyper unknown", None)]
    fn test_installed_version(#[case] output: &str, #[case] expected: Option<&str>) {
        assert_eq!(installed_version(output).as_deref(), expected);
    }

    #[test]
    fn test_source_key_relative_to_base() {
        assert_eq!(
            source_key(
                Path::new("/project/contracts/tokens/Token.sol"),
                Path::new("/project/contracts")
            ),
            "tokens/Token.sol"
        );
        assert_eq!(
            source_key(Path::new("/elsewhere/Token.sol"), Path::new("/project/contracts")),
            "elsewhere/Token.sol"
        );
    }

    #[test]
    fn test_flags_track_settings() {
        let mut settings = CompilerConfig::new("0.3.1");
        let a = VyperAdapter::new(settings.clone(), options()).flags();
        settings.optimize = false;
        let b = VyperAdapter::new(settings, options()).flags();
        assert_ne!(a, b);
        assert_eq!(a[0], "optimize=true");
    }

    #[test]
    fn test_vyper_arguments() {
        let mut settings = CompilerConfig::new("0.3.1");
        settings.evm_version = Some("berlin".to_string());
        let adapter = VyperAdapter::new(settings, options());
        let args = adapter.arguments(Path::new("/project/contracts/VotingEscrow.vy"), "0.3.1");
        assert_eq!(
            args,
            vec![
                "-f",
                "abi,bytecode",
                "-p",
                "/project/contracts",
                "--evm-version",
                "berlin",
                "/project/contracts/VotingEscrow.vy"
            ]
        );
    }

    #[rstest]
    #[case("0.3.1", false)]
    #[case("0.3.3", false)]
    #[case("0.3.4", true)]
    #[case("0.3.10", true)]
    #[case("0.4.0rc6", true)]
    fn test_no_optimize_follows_vyper_version(#[case] version: &str, #[case] expected: bool) {
        let mut settings = CompilerConfig::new(version);
        settings.optimize = false;
        let adapter = VyperAdapter::new(settings, options());
        let args = adapter.arguments(Path::new("/project/contracts/A.vy"), version);
        assert_eq!(args.iter().any(|a| a == "--no-optimize"), expected);
    }

    #[rstest]
    #[case("0.3.1", Some((0, 3, 1)))]
    #[case("0.3.10+commit.91361694", Some((0, 3, 10)))]
    #[case("0.4.0rc6", Some((0, 4, 0)))]
    #[case("0.8", Some((0, 8, 0)))]
    #[case("latest", None)]
    fn test_semver(#[case] version: &str, #[case] expected: Option<(u64, u64, u64)>) {
        assert_eq!(semver(version), expected);
    }

    #[test]
    fn test_registry_from_config() {
        let config = Config::from_yaml(
            "name: x\ncompilers:\n  vyper:\n    version: \"0.3.1\"\n",
            "/project",
        )
        .unwrap();
        let registry = adapters_from_config(&config);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry[&Language::Vyper].language(), Language::Vyper);
        assert!(!registry.contains_key(&Language::Solidity));
    }

    #[tokio::test]
    async fn test_missing_compiler_fails_version_probe() {
        let mut settings = CompilerConfig::new("0.3.1");
        settings.command = Some("kiln-missing-vyper".to_string());
        let adapter = VyperAdapter::new(settings, options());
        let unit = SourceUnit::new("/project/contracts/A.vy", Language::Vyper, "");
        let err = adapter
            .compile(&unit, "0.3.1", &CancelToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Toolchain { language: Language::Vyper, .. }));
    }

    #[tokio::test]
    async fn test_cancelled_version_check_is_not_remembered() {
        let probe = VersionProbe::default();
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = probe
            .ensure(Language::Vyper, "kiln-missing-vyper", "0.3.1", &options(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert!(probe.installed.get().is_none());

        let err = probe
            .ensure(Language::Vyper, "kiln-missing-vyper", "0.3.1", &options(), &CancelToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Toolchain { .. }));
        assert!(probe.installed.get().is_some());
    }
}
