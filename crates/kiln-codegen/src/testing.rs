//! Test adapter whose "source" is the ABI JSON itself

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use kiln_core::{AbiItem, CancelToken, CompiledArtifact, CompilerOutput, Language, SourceUnit};

use crate::error::{Error, Result};
use crate::toolchain::ToolchainAdapter;

pub(crate) struct AbiAdapter {
    language: Language,
    delay: Duration,
    calls: AtomicUsize,
}

impl AbiAdapter {
    pub(crate) fn new(language: Language) -> Self {
        Self {
            language,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ToolchainAdapter for AbiAdapter {
    fn language(&self) -> Language {
        self.language
    }

    fn flags(&self) -> Vec<String> {
        vec![]
    }

    async fn compile(
        &self,
        unit: &SourceUnit,
        version: &str,
        cancel: &CancelToken,
    ) -> Result<CompiledArtifact> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            _ = tokio::time::sleep(self.delay) => {}
        }

        let abi: Vec<AbiItem> = serde_json::from_str(&unit.content).map_err(|e| Error::Compile {
            unit: unit.path.clone(),
            diagnostics: vec![e.to_string()],
        })?;
        let output = CompilerOutput {
            abi,
            bytecode: "0x00".to_string(),
        };
        Ok(CompiledArtifact::new(unit, version, &self.flags(), output))
    }
}
