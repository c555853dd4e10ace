//! Kiln Pipeline
//!
//! This crate drives the contract build pipeline end to end.
//!
//! # Features
//!
//! - Source discovery and bounded-parallel compilation
//! - Stage gating: compile → extract → generate
//! - Stage stamps so unchanged inputs skip generation
//! - A consolidated run report with every collected error
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use kiln_codegen::adapters_from_config;
//! use kiln_core::{CancelToken, Config};
//! use kiln_pipeline::{Mode, Pipeline};
//!
//! let config = Arc::new(Config::load(".")?);
//! let pipeline = Pipeline::new(config.clone(), adapters_from_config(&config))?;
//! let report = pipeline.run(Mode::Auto, &CancelToken::new()).await;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod engine;
pub mod error;
pub mod jobs;

pub use engine::{Freshness, Mode, Pipeline, PipelineState, RunReport, UnitStatus};
pub use error::{Error, Result};
pub use jobs::{CompileJob, JobMetadata, JobResult};
