//! Contract source units
//!
//! A source unit is one contract file read once per pipeline run. Its
//! language is decided by the file extension.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{Error, Result};

/// Contract source languages understood by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// Solidity (`.sol`), compiled with solc
    Solidity,
    /// Vyper (`.vy`), compiled with vyper
    Vyper,
}

impl Language {
    /// All supported languages, in tag order
    pub const ALL: [Language; 2] = [Language::Solidity, Language::Vyper];

    /// Detect the language from a file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "sol" => Some(Language::Solidity),
            "vy" => Some(Language::Vyper),
            _ => None,
        }
    }

    /// Detect the language of a path
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    /// Stable lowercase tag, used in fingerprints and file names
    pub fn tag(&self) -> &'static str {
        match self {
            Language::Solidity => "solidity",
            Language::Vyper => "vyper",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// A single contract source file
///
/// The content is shared (`Arc<str>`) so units can be handed to concurrent
/// compile jobs without copying. Units are never mutated after they are read.
#[derive(Debug, Clone)]
pub struct SourceUnit {
    /// Path of the source file
    pub path: PathBuf,

    /// Source language
    pub language: Language,

    /// File content
    pub content: Arc<str>,

    /// SHA-256 of the content (hex)
    pub content_hash: String,
}

impl SourceUnit {
    /// Create a unit from in-memory content
    pub fn new(path: impl Into<PathBuf>, language: Language, content: impl Into<Arc<str>>) -> Self {
        let content: Arc<str> = content.into();
        let content_hash = hex::encode(Sha256::digest(content.as_bytes()));
        Self {
            path: path.into(),
            language,
            content,
            content_hash,
        }
    }

    /// Read a unit from disk, detecting its language from the extension
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let language = Language::from_path(path).ok_or_else(|| {
            Error::invalid(format!("unsupported source file: {}", path.display()))
        })?;
        let content = std::fs::read_to_string(path)?;
        Ok(Self::new(path, language, content))
    }

    /// Artifact name produced by this unit (the file stem)
    pub fn artifact_name(&self) -> &str {
        self.path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
    }
}

/// Find every contract source under `root`, sorted by path
///
/// A missing root yields no units.
pub fn discover_sources(root: &Path) -> Result<Vec<PathBuf>> {
    if !root.exists() {
        return Ok(vec![]);
    }

    let mut paths = Vec::new();
    for entry in walkdir::WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|e| Error::Io(e.into()))?;
        if entry.file_type().is_file() && Language::from_path(entry.path()).is_some() {
            paths.push(entry.into_path());
        }
    }
    Ok(paths)
}
