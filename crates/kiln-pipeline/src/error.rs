//! Pipeline error types
//!
//! These errors stop a pipeline from being built or inspected. Failures that
//! happen during a run are collected in the [`RunReport`](crate::RunReport).

use kiln_core::Language;
use thiserror::Error;

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that prevent a pipeline from starting
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration or model error
    #[error(transparent)]
    Config(#[from] kiln_core::Error),

    /// Artifact store or generator setup error
    #[error(transparent)]
    Codegen(#[from] kiln_codegen::Error),

    /// A configured compiler has no adapter to drive it
    #[error("no toolchain adapter registered for {language}")]
    MissingAdapter {
        /// Language without an adapter
        language: Language,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
