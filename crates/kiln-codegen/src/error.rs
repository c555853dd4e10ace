//! Error types for compilation, extraction and code generation

use std::path::{Path, PathBuf};
use std::time::Duration;

use kiln_core::Language;
use thiserror::Error;

/// Result type for codegen operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while compiling, extracting or generating
#[derive(Error, Debug)]
pub enum Error {
    /// The compiler rejected a source unit
    #[error("failed to compile {}: {}", unit.display(), diagnostics.join("; "))]
    Compile {
        /// Source file that failed
        unit: PathBuf,
        /// Compiler diagnostics, one per entry
        diagnostics: Vec<String>,
    },

    /// The compiler could not be invoked or is the wrong version
    #[error("{language} toolchain error: {message}")]
    Toolchain {
        /// Language of the adapter
        language: Language,
        /// Error message
        message: String,
    },

    /// The selection names artifacts that do not exist
    #[error("selection names unknown artifacts: {}", names.join(", "))]
    Selection {
        /// Unresolved names, in selection order
        names: Vec<String>,
    },

    /// Flattening found one symbol with conflicting signatures
    #[error("ambiguous interface: {symbol} differs between '{first}' and '{second}'")]
    AmbiguousInterface {
        /// Conflicting symbol, e.g. `function deposit`
        symbol: String,
        /// Artifact that contributed the symbol first
        first: String,
        /// Artifact that conflicts with it
        second: String,
    },

    /// A parameter type has no safe representation in the binding dialect
    #[error("cannot generate bindings for '{descriptor}': {symbol} uses unsupported type '{ty}'")]
    UnmappableType {
        /// Descriptor being generated
        descriptor: String,
        /// Symbol using the type
        symbol: String,
        /// ABI type
        ty: String,
    },

    /// Two source units produce the same artifact name
    #[error("artifact '{name}' is produced by both {} and {}", first.display(), second.display())]
    DuplicateArtifact {
        /// Artifact name
        name: String,
        /// First source
        first: PathBuf,
        /// Second source
        second: PathBuf,
    },

    /// An external descriptor file could not be read as an ABI
    #[error("invalid descriptor {}: {message}", path.display())]
    InvalidDescriptor {
        /// Descriptor file
        path: PathBuf,
        /// Error message
        message: String,
    },

    /// The run was cancelled
    #[error("cancelled")]
    Cancelled,

    /// A compiler invocation exceeded its timeout
    #[error("compiling {} timed out after {limit:?}", unit.display())]
    Timeout {
        /// Source file being compiled
        unit: PathBuf,
        /// Timeout that elapsed
        limit: Duration,
    },

    /// Artifact store error
    #[error("cache error: {0}")]
    Cache(String),

    /// Invalid binding template
    #[error("template error: {0}")]
    Template(#[from] minijinja::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration or model error
    #[error(transparent)]
    Core(#[from] kiln_core::Error),
}

impl Error {
    /// Rebuild this error for another requester of the same compilation
    ///
    /// Errors without a cheap copy collapse into a [`Error::Compile`] for `unit`.
    pub fn duplicate(&self, unit: &Path) -> Error {
        match self {
            Error::Compile { unit, diagnostics } => Error::Compile {
                unit: unit.clone(),
                diagnostics: diagnostics.clone(),
            },
            Error::Toolchain { language, message } => Error::Toolchain {
                language: *language,
                message: message.clone(),
            },
            Error::Timeout { unit, limit } => Error::Timeout {
                unit: unit.clone(),
                limit: *limit,
            },
            Error::Cancelled => Error::Cancelled,
            other => Error::Compile {
                unit: unit.to_path_buf(),
                diagnostics: vec![other.to_string()],
            },
        }
    }

    /// Whether this error belongs to a single source unit
    pub fn is_compile_failure(&self) -> bool {
        matches!(
            self,
            Error::Compile { .. } | Error::Toolchain { .. } | Error::Timeout { .. }
        )
    }
}
