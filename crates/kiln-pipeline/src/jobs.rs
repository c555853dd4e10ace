//! Compile jobs
//!
//! One job per discovered source unit. Jobs are independent; the engine
//! runs them through a bounded, order-preserving stream.

use std::path::PathBuf;
use std::sync::Arc;
use tracing::Instrument;

use kiln_codegen::{ArtifactStore, ToolchainAdapter};
use kiln_core::{CancelToken, CompiledArtifact, Fingerprint, SourceUnit};

/// Job to compile a single source unit
#[derive(Debug, Clone)]
pub struct CompileJob {
    /// Unit to compile
    pub unit: SourceUnit,

    /// Requested compiler version
    pub version: String,

    /// Scheduling metadata
    pub metadata: JobMetadata,
}

/// Job metadata
#[derive(Debug, Clone, Copy, Default)]
pub struct JobMetadata {
    /// Position of the unit in discovery order
    pub index: usize,

    /// Whether the artifact is part of the interface selection
    pub selected: bool,
}

/// Outcome of one compile job
#[derive(Debug)]
pub struct JobResult {
    /// Artifact name
    pub name: String,

    /// Source path
    pub path: PathBuf,

    /// Whether the store already held a fresh artifact
    pub cache_hit: bool,

    /// Whether the artifact is part of the interface selection
    pub selected: bool,

    /// Compiled artifact or the unit's error
    pub outcome: kiln_codegen::Result<Arc<CompiledArtifact>>,
}

impl JobResult {
    /// Result for a unit that never reached a compiler
    pub fn failed(unit: &SourceUnit, selected: bool, error: kiln_codegen::Error) -> Self {
        Self {
            name: unit.artifact_name().to_string(),
            path: unit.path.clone(),
            cache_hit: false,
            selected,
            outcome: Err(error),
        }
    }

    /// Whether a failure leaves a selected artifact without a descriptor
    pub fn blocks_extraction(&self) -> bool {
        self.selected && self.outcome.is_err()
    }

    /// Whether the unit produced an artifact
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

impl CompileJob {
    /// Create a new compile job
    pub fn new(unit: SourceUnit, version: impl Into<String>) -> Self {
        Self {
            unit,
            version: version.into(),
            metadata: JobMetadata::default(),
        }
    }

    /// Set the discovery position
    pub fn at(mut self, index: usize) -> Self {
        self.metadata.index = index;
        self
    }

    /// Mark whether the artifact is selected for extraction
    pub fn selected(mut self, selected: bool) -> Self {
        self.metadata.selected = selected;
        self
    }

    /// Artifact name the job produces
    pub fn name(&self) -> &str {
        self.unit.artifact_name()
    }

    /// Resolve the artifact through the store
    pub async fn run(
        &self,
        store: &ArtifactStore,
        adapter: &dyn ToolchainAdapter,
        cancel: &CancelToken,
    ) -> JobResult {
        let fingerprint = Fingerprint::compute(&self.unit, &self.version, &adapter.flags());
        let cache_hit = store.is_fresh(self.name(), &fingerprint);

        let span = tracing::debug_span!(
            "job",
            index = self.metadata.index,
            unit = %self.name(),
            selected = self.metadata.selected
        );
        let outcome = async {
            tracing::debug!(
                "{} {}",
                if cache_hit { "cached" } else { "compiling" },
                fingerprint.short()
            );
            store
                .get_or_compile(&self.unit, &self.version, adapter, cancel)
                .await
        }
        .instrument(span)
        .await;

        JobResult {
            name: self.name().to_string(),
            path: self.unit.path.clone(),
            cache_hit,
            selected: self.metadata.selected,
            outcome,
        }
    }
}
