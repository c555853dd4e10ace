//! Compiled artifacts and fingerprints
//!
//! A fingerprint is the identity of one compilation: the source bytes, the
//! compiler version, and every flag that can change the output. Two requests
//! with equal fingerprints never need a second compiler invocation.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::PathBuf;

use crate::abi::{AbiItem, InterfaceDescriptor};
use crate::source::{Language, SourceUnit};

/// Content fingerprint of a compilation (SHA-256, hex)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Compute the fingerprint for compiling `unit` with the given compiler
    /// version and flags
    pub fn compute(unit: &SourceUnit, compiler_version: &str, flags: &[String]) -> Self {
        let mut hasher = Sha256::new();

        // Fields are NUL-separated so adjacent values cannot run together
        hasher.update(unit.language.tag().as_bytes());
        hasher.update([0]);
        hasher.update(compiler_version.as_bytes());
        hasher.update([0]);
        for flag in flags {
            hasher.update(flag.as_bytes());
            hasher.update([0]);
        }
        hasher.update(unit.content.as_bytes());

        Fingerprint(hex::encode(hasher.finalize()))
    }

    /// Full hex digest
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated digest for log lines
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalized output of one compiler invocation
#[derive(Debug, Clone, Default)]
pub struct CompilerOutput {
    /// Interface entries
    pub abi: Vec<AbiItem>,
    /// Deployment bytecode (hex, `0x`-prefixed)
    pub bytecode: String,
}

/// Compiler output for one source unit under one compiler version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledArtifact {
    /// Artifact name (the source file stem)
    pub name: String,

    /// Source language
    pub language: Language,

    /// Compiler version used
    pub compiler_version: String,

    /// Source file the artifact was compiled from
    pub source_path: PathBuf,

    /// Interface entries
    pub abi: Vec<AbiItem>,

    /// Deployment bytecode; not guaranteed to be reproducible
    pub bytecode: String,

    /// Identity of the compilation
    pub fingerprint: Fingerprint,
}

impl CompiledArtifact {
    /// Assemble an artifact from normalized compiler output
    pub fn new(
        unit: &SourceUnit,
        compiler_version: &str,
        flags: &[String],
        output: CompilerOutput,
    ) -> Self {
        Self {
            name: unit.artifact_name().to_string(),
            language: unit.language,
            compiler_version: compiler_version.to_string(),
            source_path: unit.path.clone(),
            abi: output.abi,
            bytecode: output.bytecode,
            fingerprint: Fingerprint::compute(unit, compiler_version, flags),
        }
    }

    /// Interface descriptor of this artifact
    pub fn descriptor(&self) -> InterfaceDescriptor {
        InterfaceDescriptor::new(&self.name, self.abi.clone())
    }

    /// Bytecode size in bytes
    pub fn size(&self) -> usize {
        self.bytecode.trim_start_matches("0x").len() / 2
    }
}
