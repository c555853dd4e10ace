//! Interface extraction
//!
//! Turns the selected artifacts (plus any pre-built external descriptors)
//! into interface descriptors, optionally flattened into one namespace, and
//! writes them to the interface output directory.

use regex::Regex;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Component, Path, PathBuf};

use kiln_core::abi::{Shape, Symbol, SymbolKind};
use kiln_core::{AbiItem, Config, InterfaceDescriptor};

use crate::error::{Error, Result};
use crate::output::{self, WriteStatus};
use crate::parser;
use crate::store::ArtifactStore;

/// Extension of descriptor files
pub const DESCRIPTOR_EXT: &str = "json";

/// Selects artifacts and writes their interface descriptors
#[derive(Debug, Clone)]
pub struct Extractor {
    base_path: PathBuf,
    out_dir: PathBuf,
    clear: bool,
    flat: bool,
    flat_name: String,
    spacing: usize,
    external_patterns: Vec<String>,
}

impl Extractor {
    /// Create an extractor from the pipeline configuration
    pub fn new(config: &Config) -> Self {
        let interfaces = &config.pipeline.interfaces;
        Self {
            base_path: config.base_path.clone(),
            out_dir: config.interfaces_dir(),
            clear: interfaces.clear,
            flat: interfaces.flat,
            flat_name: interfaces.flat_name.clone(),
            spacing: interfaces.spacing,
            external_patterns: config.pipeline.bindings.external_artifacts.clone(),
        }
    }

    /// Descriptor output directory
    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Path of the descriptor file for `name`
    pub fn descriptor_path(&self, name: &str) -> PathBuf {
        self.out_dir.join(format!("{}.{}", name, DESCRIPTOR_EXT))
    }

    /// Produce descriptors for `selection`, followed by `externals`
    ///
    /// Every selected name must have an artifact in `store`; otherwise the
    /// whole extraction fails with [`Error::Selection`] listing all of them.
    /// Externals named like a stored artifact are skipped. Under flattening
    /// the result is a single descriptor named after `flat_name`.
    pub fn extract(
        &self,
        selection: &[String],
        store: &ArtifactStore,
        externals: Vec<InterfaceDescriptor>,
    ) -> Result<Vec<InterfaceDescriptor>> {
        let mut missing = Vec::new();
        let mut descriptors = Vec::with_capacity(selection.len() + externals.len());
        for name in selection {
            match store.lookup(name) {
                Some(artifact) => descriptors.push(artifact.descriptor()),
                None => missing.push(name.clone()),
            }
        }
        if !missing.is_empty() {
            return Err(Error::Selection { names: missing });
        }

        for external in externals {
            if store.lookup(&external.name).is_some() {
                tracing::warn!(
                    "Skipping external descriptor '{}': an artifact has the same name",
                    external.name
                );
                continue;
            }
            descriptors.push(external);
        }

        if self.flat {
            Ok(vec![flatten(&self.flat_name, &descriptors)?])
        } else {
            Ok(descriptors)
        }
    }

    /// Load external descriptor files matching the configured patterns
    ///
    /// Files inside the descriptor output directory are never loaded.
    /// The result is sorted by name; on duplicate names the first path wins.
    pub fn load_externals(&self) -> Result<Vec<InterfaceDescriptor>> {
        let mut by_name: HashMap<String, (PathBuf, InterfaceDescriptor)> = HashMap::new();

        for pattern in &self.external_patterns {
            for path in self.expand(pattern)? {
                let descriptor = parser::parse_descriptor_file(&path)?;
                match by_name.get(&descriptor.name) {
                    Some((first, _)) => tracing::warn!(
                        "External descriptor '{}' in {} shadowed by {}",
                        descriptor.name,
                        path.display(),
                        first.display()
                    ),
                    None => {
                        by_name.insert(descriptor.name.clone(), (path, descriptor));
                    }
                }
            }
        }

        let mut externals: Vec<InterfaceDescriptor> =
            by_name.into_values().map(|(_, d)| d).collect();
        externals.sort_by(|a, b| a.name.cmp(&b.name));
        tracing::debug!("Loaded {} external descriptors", externals.len());
        Ok(externals)
    }

    /// Files under the project root matching one glob pattern, sorted
    fn expand(&self, pattern: &str) -> Result<Vec<PathBuf>> {
        let matcher = glob_regex(pattern)?;
        let root = self.base_path.join(literal_prefix(pattern));

        if root.is_file() {
            return Ok(vec![root]);
        }
        if !root.is_dir() {
            return Ok(vec![]);
        }

        let mut matches = Vec::new();
        for entry in walkdir::WalkDir::new(&root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            let path = entry.path();
            if path.starts_with(&self.out_dir) {
                continue;
            }
            let Ok(relative) = path.strip_prefix(&self.base_path) else {
                continue;
            };
            if matcher.is_match(&slash_path(relative)) {
                matches.push(path.to_path_buf());
            }
        }
        Ok(matches)
    }

    /// Write descriptors to the output directory
    ///
    /// With `clear`, descriptor files outside the current scope are removed
    /// first. The scope is the selection plus the descriptors being written;
    /// under flattening it is only the merged descriptor, so per-artifact
    /// files from earlier runs go away. Returns the path of every descriptor.
    pub fn write(
        &self,
        descriptors: &[InterfaceDescriptor],
        selection: &[String],
    ) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(&self.out_dir)?;

        if self.clear {
            let mut scope: HashSet<String> = descriptors.iter().map(|d| d.name.clone()).collect();
            if self.flat {
                scope.insert(self.flat_name.clone());
            } else {
                scope.extend(selection.iter().cloned());
            }
            output::purge_stale(&self.out_dir, DESCRIPTOR_EXT, &scope)?;
        }

        let mut paths = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            let path = self.descriptor_path(&descriptor.name);
            let json = descriptor.to_json(self.spacing)?;
            if output::write_if_changed(&path, &json)? == WriteStatus::Written {
                tracing::info!("Extracted {}", path.display());
            }
            paths.push(path);
        }
        Ok(paths)
    }
}

/// Merge descriptors into one namespace named `name`
///
/// Symbols are matched by kind and name. A symbol whose set of signatures is
/// identical across descriptors appears once; differing sets are an
/// [`Error::AmbiguousInterface`]. Constructors are dropped.
pub fn flatten(name: &str, descriptors: &[InterfaceDescriptor]) -> Result<InterfaceDescriptor> {
    struct Entry<'a> {
        origin: &'a str,
        shapes: BTreeSet<Shape>,
        items: Vec<&'a AbiItem>,
    }

    let mut order: Vec<Symbol> = Vec::new();
    let mut merged: HashMap<Symbol, Entry<'_>> = HashMap::new();

    for descriptor in descriptors {
        for (symbol, items) in descriptor.grouped() {
            if symbol.kind == SymbolKind::Constructor {
                continue;
            }

            let mut shapes = BTreeSet::new();
            let unique: Vec<&AbiItem> = items
                .into_iter()
                .filter(|item| shapes.insert(item.shape()))
                .collect();

            match merged.get(&symbol) {
                Some(existing) if existing.shapes != shapes => {
                    return Err(Error::AmbiguousInterface {
                        symbol: symbol.to_string(),
                        first: existing.origin.to_string(),
                        second: descriptor.name.clone(),
                    });
                }
                Some(_) => {}
                None => {
                    order.push(symbol.clone());
                    merged.insert(
                        symbol,
                        Entry {
                            origin: &descriptor.name,
                            shapes,
                            items: unique,
                        },
                    );
                }
            }
        }
    }

    let items = order
        .iter()
        .filter_map(|symbol| merged.get(symbol))
        .flat_map(|entry| entry.items.iter().map(|item| (*item).clone()))
        .collect();
    Ok(InterfaceDescriptor::new(name, items))
}

/// Leading path components without wildcards
fn literal_prefix(pattern: &str) -> PathBuf {
    Path::new(pattern)
        .components()
        .take_while(|c| match c {
            Component::Normal(part) => !part.to_string_lossy().contains(['*', '?', '[']),
            _ => true,
        })
        .collect()
}

fn slash_path(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Compile a glob (`*`, `**`, `?`) into an anchored regex over `/` paths
fn glob_regex(pattern: &str) -> Result<Regex> {
    let normalized = slash_path(Path::new(pattern));
    let mut re = String::from("^");
    let mut chars = normalized.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                if chars.peek() == Some(&'/') {
                    chars.next();
                    re.push_str("(?:.*/)?");
                } else {
                    re.push_str(".*");
                }
            }
            '*' => re.push_str("[^/]*"),
            '?' => re.push_str("[^/]"),
            c => re.push_str(&regex::escape(&c.to_string())),
        }
    }
    re.push('$');

    Regex::new(&re).map_err(|e| {
        kiln_core::Error::invalid(format!("invalid external_artifacts pattern '{}': {}", pattern, e))
            .into()
    })
}
