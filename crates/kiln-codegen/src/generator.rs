//! Binding generation
//!
//! Lowers each descriptor to a [`BindingIR`], renders it with the configured
//! dialect and writes one file per descriptor plus an index. A descriptor
//! that cannot be rendered is reported and skipped; the others still generate.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use kiln_core::config::Dialect;
use kiln_core::{Config, InterfaceDescriptor};

use crate::error::{Error, Result};
use crate::ir::BindingIR;
use crate::output::{self, WriteStatus};
use crate::targets::{self, BindingTarget};

/// Options for the generator
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    /// Output directory for bindings
    pub out_dir: PathBuf,

    /// Binding dialect
    pub dialect: Dialect,

    /// Emit one entry per overload signature
    pub always_generate_overloads: bool,

    /// Remove bindings for descriptors no longer generated
    pub clear: bool,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            out_dir: PathBuf::from("bindings"),
            dialect: Dialect::default(),
            always_generate_overloads: false,
            clear: false,
        }
    }
}

impl GenerateOptions {
    /// Derive options from the pipeline configuration
    pub fn from_config(config: &Config) -> Self {
        let bindings = &config.pipeline.bindings;
        Self {
            out_dir: config.bindings_dir(),
            dialect: bindings.target,
            always_generate_overloads: bindings.always_generate_overloads,
            clear: config.pipeline.interfaces.clear,
        }
    }
}

/// Generated binding for one descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingOutput {
    /// Descriptor the binding was generated from
    pub name: String,

    /// Callable entry keys, in order
    pub entries: Vec<String>,

    /// Output path
    pub path: PathBuf,

    /// Whether the file changed on disk
    pub status: WriteStatus,
}

/// Result of one generation pass
#[derive(Debug, Default)]
pub struct GenerateOutcome {
    /// Bindings written (or already up to date)
    pub outputs: Vec<BindingOutput>,

    /// Per-descriptor failures
    pub failures: Vec<Error>,

    /// Index file, if written
    pub index: Option<PathBuf>,
}

/// Binding generator
pub struct Generator {
    options: GenerateOptions,
    target: Box<dyn BindingTarget>,
}

impl Generator {
    /// Create a generator with the given options
    pub fn new(options: GenerateOptions) -> Result<Self> {
        let target = targets::target_for(options.dialect)?;
        Ok(Self { options, target })
    }

    /// Create a generator from the pipeline configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(GenerateOptions::from_config(config))
    }

    /// Generator options
    pub fn options(&self) -> &GenerateOptions {
        &self.options
    }

    /// Output path of the binding for descriptor `name`
    pub fn binding_path(&self, name: &str) -> PathBuf {
        self.options.out_dir.join(format!(
            "{}.{}",
            self.target.file_stem(name),
            self.target.extension()
        ))
    }

    /// Path of the index file
    pub fn index_path(&self) -> PathBuf {
        self.options
            .out_dir
            .join(format!("{}.{}", self.target.index_stem(), self.target.extension()))
    }

    /// Render one descriptor without touching the filesystem
    pub fn render(&self, descriptor: &InterfaceDescriptor) -> Result<(BindingIR, String)> {
        let ir = BindingIR::lower(descriptor, self.options.always_generate_overloads)?;
        let code = self.target.render(&ir)?;
        Ok((ir, code))
    }

    /// Generate and write bindings for every descriptor
    ///
    /// Rendering failures are collected per descriptor. Filesystem errors on
    /// the output directory itself abort the pass.
    pub fn generate(&self, descriptors: &[InterfaceDescriptor]) -> Result<GenerateOutcome> {
        let out_dir = &self.options.out_dir;
        std::fs::create_dir_all(out_dir)?;

        if self.options.clear {
            let mut keep: HashSet<String> = descriptors
                .iter()
                .map(|d| self.target.file_stem(&d.name))
                .collect();
            keep.insert(self.target.index_stem().to_string());
            output::purge_stale(out_dir, self.target.extension(), &keep)?;
        }

        let mut outcome = GenerateOutcome::default();
        for descriptor in descriptors {
            match self.write_binding(descriptor) {
                Ok(binding) => {
                    if binding.status == WriteStatus::Written {
                        tracing::info!("Generated {}", binding.path.display());
                    }
                    outcome.outputs.push(binding);
                }
                Err(e) => {
                    tracing::warn!("Skipping bindings for {}: {}", descriptor.name, e);
                    outcome.failures.push(e);
                }
            }
        }

        let names: Vec<String> = outcome.outputs.iter().map(|o| o.name.clone()).collect();
        let index = self.target.render_index(&names)?;
        let index_path = self.index_path();
        output::write_if_changed(&index_path, &index)?;
        outcome.index = Some(index_path);

        Ok(outcome)
    }

    fn write_binding(&self, descriptor: &InterfaceDescriptor) -> Result<BindingOutput> {
        let (ir, code) = self.render(descriptor)?;
        let path = self.binding_path(&descriptor.name);
        let status = output::write_if_changed(&path, &code)?;
        Ok(BindingOutput {
            name: descriptor.name.clone(),
            entries: ir.functions.into_iter().map(|f| f.key).collect(),
            path,
            status,
        })
    }

    /// Every file a successful pass over `names` produces
    pub fn expected_outputs<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = names.into_iter().map(|n| self.binding_path(n)).collect();
        paths.push(self.index_path());
        paths
    }

    /// Output directory
    pub fn out_dir(&self) -> &Path {
        &self.options.out_dir
    }
}
