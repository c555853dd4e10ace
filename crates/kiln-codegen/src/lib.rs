//! Kiln Code Generation
//!
//! This crate handles the compile → extract → generate stages of the
//! contract build pipeline.
//!
//! # Pipeline Overview
//!
//! ```text
//! ┌─────────┐     ┌──────────┐     ┌───────────┐     ┌──────────┐
//! │ Sources │────▶│ Artifact │────▶│ Interface │────▶│ Bindings │
//! │(adapter)│     │  Store   │     │ Extractor │     │(generate)│
//! └─────────┘     └──────────┘     └───────────┘     └──────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use kiln_codegen::{ArtifactStore, Extractor, Generator};
//!
//! let store = ArtifactStore::open(&config.cache_dir())?;
//! let artifact = store.get_or_compile(&unit, "0.3.1", adapter.as_ref(), &cancel).await?;
//! let descriptors = Extractor::new(&config).extract(&selection, &store, vec![])?;
//! let outcome = Generator::from_config(&config)?.generate(&descriptors)?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod compiler;
pub mod error;
pub mod extractor;
pub mod generator;
pub mod ir;
pub mod output;
pub mod parser;
pub mod store;
pub mod targets;
pub mod toolchain;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};
pub use extractor::Extractor;
pub use generator::{BindingOutput, GenerateOptions, GenerateOutcome, Generator};
pub use store::ArtifactStore;
pub use toolchain::{AdapterRegistry, ToolchainAdapter, adapters_from_config};
