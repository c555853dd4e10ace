//! Kiln Core Library
//!
//! This crate provides the shared model for the Kiln contract build pipeline:
//! - Configuration parsing and validation
//! - Source units and language detection
//! - Compiled artifacts and their fingerprints
//! - Contract interface (ABI) descriptors
//! - Cancellation tokens passed across stage boundaries
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Sources   │────▶│  Artifacts  │────▶│ Interfaces  │────▶│  Bindings   │
//! │ (.sol, .vy) │     │  (compile)  │     │  (extract)  │     │ (generate)  │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use kiln_core::Config;
//!
//! let config = Config::load("./kiln.yaml")?;
//! for unit in config.discover_sources()? {
//!     println!("{} ({})", unit.artifact_name(), unit.language);
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod abi;
pub mod artifact;
pub mod cancel;
pub mod config;
pub mod error;
pub mod source;

pub use abi::{AbiItem, InterfaceDescriptor, Param, StateMutability};
pub use artifact::{CompiledArtifact, CompilerOutput, Fingerprint};
pub use cancel::CancelToken;
pub use config::{Config, PipelineConfig};
pub use error::{Error, Result};
pub use source::{Language, SourceUnit};
