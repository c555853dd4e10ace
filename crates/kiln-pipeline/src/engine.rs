//! Pipeline execution engine
//!
//! A run moves through `Idle → Compiling → Extracting → Generating → Done`,
//! or ends in `Failed`. Per-unit and per-descriptor errors are collected and
//! the run keeps going; structural errors (duplicate artifacts, unresolved
//! selection, ambiguous interfaces) stop it at the stage that found them.

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

use kiln_codegen::output;
use kiln_codegen::{AdapterRegistry, ArtifactStore, Extractor, Generator, ToolchainAdapter};
use kiln_core::{CancelToken, Config, Fingerprint, InterfaceDescriptor, Language, SourceUnit};

use crate::error::{Error, Result};
use crate::jobs::{CompileJob, JobResult};

type StageResult<T> = kiln_codegen::Result<T>;

/// Stage stamps, relative to the cache directory
pub const STAMPS_FILE: &str = "stamps.json";

/// Pipeline state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineState {
    /// Not started
    Idle,
    /// Compiling source units
    Compiling,
    /// Extracting interface descriptors
    Extracting,
    /// Generating bindings
    Generating,
    /// Finished without errors
    Done,
    /// Finished with at least one error
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PipelineState::Idle => "idle",
            PipelineState::Compiling => "compiling",
            PipelineState::Extracting => "extracting",
            PipelineState::Generating => "generating",
            PipelineState::Done => "done",
            PipelineState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Which stages a run executes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Compile, then extract and generate if `interfaces.run_on_compile` is set
    #[default]
    Auto,
    /// Compile only
    CompileOnly,
    /// Compile, extract and generate
    Full,
}

/// Summary of one pipeline run
#[derive(Debug)]
pub struct RunReport {
    /// Run identifier
    pub id: Uuid,

    /// Final state
    pub state: PipelineState,

    /// Every state the run entered, in order
    pub history: Vec<PipelineState>,

    /// Artifacts compiled during this run
    pub compiled: Vec<String>,

    /// Artifacts served from the store
    pub cache_hits: Vec<String>,

    /// Descriptor files written or confirmed
    pub descriptors: Vec<PathBuf>,

    /// Binding files written or confirmed
    pub bindings: Vec<PathBuf>,

    /// Every error collected during the run
    pub errors: Vec<kiln_codegen::Error>,

    /// Whether generation was skipped because its inputs were unchanged
    pub generate_skipped: bool,
}

impl RunReport {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            state: PipelineState::Idle,
            history: vec![PipelineState::Idle],
            compiled: vec![],
            cache_hits: vec![],
            descriptors: vec![],
            bindings: vec![],
            errors: vec![],
            generate_skipped: false,
        }
    }

    fn transition(&mut self, state: PipelineState) {
        tracing::info!("{} → {}", self.state, state);
        self.state = state;
        self.history.push(state);
    }

    fn finish(&mut self, cancelled: bool) {
        if cancelled {
            self.errors
                .retain(|e| !matches!(e, kiln_codegen::Error::Cancelled));
            self.errors.push(kiln_codegen::Error::Cancelled);
        }
        if self.errors.is_empty() {
            self.transition(PipelineState::Done);
        } else {
            for error in &self.errors {
                tracing::warn!("{}", error);
            }
            self.transition(PipelineState::Failed);
        }
    }

    /// Whether the run reached `Done`
    pub fn is_success(&self) -> bool {
        self.state == PipelineState::Done
    }

    /// Errors that belong to a single source unit
    pub fn compile_errors(&self) -> impl Iterator<Item = &kiln_codegen::Error> {
        self.errors.iter().filter(|e| e.is_compile_failure())
    }
}

/// Cache state of one source unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Freshness {
    /// The stored artifact matches the current source
    Fresh,
    /// A stored artifact exists but was built from other inputs
    Stale,
    /// Nothing stored yet
    Missing,
    /// The language has no configured compiler or adapter
    NoCompiler,
}

impl fmt::Display for Freshness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Freshness::Fresh => "fresh",
            Freshness::Stale => "stale",
            Freshness::Missing => "missing",
            Freshness::NoCompiler => "no compiler",
        };
        f.write_str(s)
    }
}

/// Status line for one source unit
#[derive(Debug, Clone, Serialize)]
pub struct UnitStatus {
    /// Artifact name
    pub name: String,
    /// Source path
    pub path: PathBuf,
    /// Source language
    pub language: Language,
    /// Cache state
    pub freshness: Freshness,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Stamps {
    #[serde(default)]
    generate: Option<String>,
}

impl Stamps {
    fn load(path: &Path) -> Self {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|contents| serde_json::from_str(&contents).ok())
            .unwrap_or_default()
    }

    fn save(&self, path: &Path) -> StageResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        output::write_if_changed(path, &json)?;
        Ok(())
    }
}

/// The contract build pipeline
pub struct Pipeline {
    config: Arc<Config>,
    adapters: AdapterRegistry,
    store: ArtifactStore,
    extractor: Extractor,
    generator: Generator,
}

impl Pipeline {
    /// Create a pipeline over `config` with an explicit adapter per language
    ///
    /// Every language with a compiler section needs an adapter.
    pub fn new(config: Arc<Config>, adapters: AdapterRegistry) -> Result<Self> {
        for language in Language::ALL {
            if config.compiler(language).is_ok() && !adapters.contains_key(&language) {
                return Err(Error::MissingAdapter { language });
            }
        }

        let store = ArtifactStore::open(&config.cache_dir())?;
        let extractor = Extractor::new(&config);
        let generator = Generator::from_config(&config)?;

        Ok(Self {
            config,
            adapters,
            store,
            extractor,
            generator,
        })
    }

    /// Pipeline configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Artifact store
    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Drop every cached artifact and stage stamp
    pub fn clear_cache(&self) -> Result<()> {
        self.store.clear()?;
        let stamps = self.stamps_path();
        if stamps.exists() {
            std::fs::remove_file(&stamps)?;
        }
        tracing::info!("Cleared artifact cache");
        Ok(())
    }

    /// Cache state of every discovered source unit
    pub fn status(&self) -> Result<Vec<UnitStatus>> {
        let mut statuses = Vec::new();
        for path in self.config.discover_sources()? {
            let unit = SourceUnit::read(&path)?;
            let freshness = match (
                self.config.compiler(unit.language),
                self.adapters.get(&unit.language),
            ) {
                (Ok(compiler), Some(adapter)) => {
                    let fingerprint =
                        Fingerprint::compute(&unit, &compiler.version, &adapter.flags());
                    match self.store.lookup(unit.artifact_name()) {
                        Some(artifact) if artifact.fingerprint == fingerprint => Freshness::Fresh,
                        Some(_) => Freshness::Stale,
                        None => Freshness::Missing,
                    }
                }
                _ => Freshness::NoCompiler,
            };
            statuses.push(UnitStatus {
                name: unit.artifact_name().to_string(),
                language: unit.language,
                path,
                freshness,
            });
        }
        Ok(statuses)
    }

    /// Execute one run
    ///
    /// The report always comes back; inspect its state and errors.
    pub async fn run(&self, mode: Mode, cancel: &CancelToken) -> RunReport {
        let mut report = RunReport::new();
        let span = tracing::info_span!("run", id = %report.id);

        async {
            tracing::info!("Starting {} ({:?})", self.config.pipeline.name, mode);
            if let Err(e) = self.stages(mode, cancel, &mut report).await {
                report.errors.push(e);
            }
            report.finish(cancel.is_cancelled());
            tracing::info!(
                "Run finished: {} compiled, {} cached, {} errors",
                report.compiled.len(),
                report.cache_hits.len(),
                report.errors.len()
            );
        }
        .instrument(span)
        .await;

        report
    }

    async fn stages(
        &self,
        mode: Mode,
        cancel: &CancelToken,
        report: &mut RunReport,
    ) -> StageResult<()> {
        report.transition(PipelineState::Compiling);
        let units = self.discover()?;
        let live: HashSet<String> = units
            .iter()
            .map(|u| u.artifact_name().to_string())
            .collect();
        for evicted in self.store.retain(&live)? {
            tracing::info!("Evicted {} (source removed)", evicted);
        }
        checkpoint(cancel)?;

        let failed = self.compile_all(units, cancel, report).await;
        checkpoint(cancel)?;

        let interfaces = &self.config.pipeline.interfaces;
        let extract = match mode {
            Mode::Auto => interfaces.run_on_compile,
            Mode::CompileOnly => false,
            Mode::Full => true,
        };
        if !extract {
            tracing::debug!("Skipping extraction and generation");
            return Ok(());
        }

        report.transition(PipelineState::Extracting);
        let selection: Vec<String> = interfaces
            .only
            .iter()
            .filter(|name| !failed.contains(*name))
            .cloned()
            .collect();
        let externals = self.extractor.load_externals()?;
        let descriptors = self
            .extractor
            .extract(&selection, &self.store, externals)?;
        report.descriptors = self.extractor.write(&descriptors, &interfaces.only)?;
        checkpoint(cancel)?;

        report.transition(PipelineState::Generating);
        self.generate(&descriptors, report)
    }

    /// Read every source unit, rejecting duplicate artifact names
    fn discover(&self) -> StageResult<Vec<SourceUnit>> {
        let mut seen: HashMap<String, PathBuf> = HashMap::new();
        let mut units = Vec::new();

        for path in self.config.discover_sources()? {
            let unit = SourceUnit::read(&path)?;
            let name = unit.artifact_name().to_string();
            if let Some(first) = seen.get(&name) {
                return Err(kiln_codegen::Error::DuplicateArtifact {
                    name,
                    first: first.clone(),
                    second: path,
                });
            }
            seen.insert(name, path);
            units.push(unit);
        }

        tracing::info!("Discovered {} source units", units.len());
        Ok(units)
    }

    /// Compile every unit; returns the selected names that failed
    async fn compile_all(
        &self,
        units: Vec<SourceUnit>,
        cancel: &CancelToken,
        report: &mut RunReport,
    ) -> HashSet<String> {
        let concurrency = self.config.pipeline.build.concurrency.max(1);
        let results: Vec<JobResult> = futures::stream::iter(units.into_iter().enumerate())
            .map(|(index, unit)| self.compile_unit(index, unit, cancel))
            .buffered(concurrency)
            .collect()
            .await;

        let mut failed = HashSet::new();
        for result in results {
            let blocks_extraction = result.blocks_extraction();
            match result.outcome {
                Ok(artifact) if result.cache_hit => {
                    tracing::debug!("Up to date: {}", artifact.name);
                    report.cache_hits.push(result.name);
                }
                Ok(artifact) => {
                    tracing::info!(
                        "Compiled {} ({} bytes)",
                        artifact.name,
                        artifact.size()
                    );
                    report.compiled.push(result.name);
                }
                Err(e) => {
                    tracing::warn!("{} failed: {}", result.path.display(), e);
                    if blocks_extraction {
                        failed.insert(result.name);
                    }
                    report.errors.push(e);
                }
            }
        }
        failed
    }

    async fn compile_unit(&self, index: usize, unit: SourceUnit, cancel: &CancelToken) -> JobResult {
        let selected = self
            .config
            .pipeline
            .interfaces
            .only
            .iter()
            .any(|name| name == unit.artifact_name());
        let adapter = match self.toolchain(unit.language) {
            Ok(adapter) => adapter,
            Err(e) => return JobResult::failed(&unit, selected, e),
        };
        let version = match self.config.compiler(unit.language) {
            Ok(compiler) => compiler.version.clone(),
            Err(e) => {
                let error = kiln_codegen::Error::Toolchain {
                    language: unit.language,
                    message: e.to_string(),
                };
                return JobResult::failed(&unit, selected, error);
            }
        };

        CompileJob::new(unit, version)
            .at(index)
            .selected(selected)
            .run(&self.store, adapter.as_ref(), cancel)
            .await
    }

    fn toolchain(&self, language: Language) -> StageResult<Arc<dyn ToolchainAdapter>> {
        self.adapters
            .get(&language)
            .cloned()
            .ok_or_else(|| kiln_codegen::Error::Toolchain {
                language,
                message: "no adapter registered".to_string(),
            })
    }

    fn generate(
        &self,
        descriptors: &[InterfaceDescriptor],
        report: &mut RunReport,
    ) -> StageResult<()> {
        let stamps_path = self.stamps_path();
        let digest = self.generate_digest(descriptors)?;
        let mut stamps = Stamps::load(&stamps_path);

        let expected = self
            .generator
            .expected_outputs(descriptors.iter().map(|d| d.name.as_str()));
        if stamps.generate.as_deref() == Some(digest.as_str()) && expected.iter().all(|p| p.exists())
        {
            tracing::info!("Bindings up to date");
            report.bindings = descriptors
                .iter()
                .map(|d| self.generator.binding_path(&d.name))
                .collect();
            report.generate_skipped = true;
            return Ok(());
        }

        let outcome = self.generator.generate(descriptors)?;
        report.bindings = outcome.outputs.iter().map(|o| o.path.clone()).collect();

        stamps.generate = outcome.failures.is_empty().then_some(digest);
        report.errors.extend(outcome.failures);
        stamps.save(&stamps_path)
    }

    /// Digest of everything the generation stage reads
    fn generate_digest(&self, descriptors: &[InterfaceDescriptor]) -> StageResult<String> {
        let options = self.generator.options();
        let mut hasher = Sha256::new();

        hasher.update(env!("CARGO_PKG_VERSION").as_bytes());
        hasher.update([0]);
        hasher.update(options.dialect.as_str().as_bytes());
        hasher.update([
            0,
            u8::from(options.always_generate_overloads),
            u8::from(options.clear),
            0,
        ]);
        hasher.update(options.out_dir.to_string_lossy().as_bytes());
        hasher.update([0]);
        for descriptor in descriptors {
            hasher.update(descriptor.name.as_bytes());
            hasher.update([0]);
            hasher.update(descriptor.to_json(0)?.as_bytes());
            hasher.update([0]);
        }

        Ok(hex::encode(hasher.finalize()))
    }

    fn stamps_path(&self) -> PathBuf {
        self.config.cache_dir().join(STAMPS_FILE)
    }
}

fn checkpoint(cancel: &CancelToken) -> StageResult<()> {
    if cancel.is_cancelled() {
        Err(kiln_codegen::Error::Cancelled)
    } else {
        Ok(())
    }
}
