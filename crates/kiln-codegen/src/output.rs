//! Output directory helpers shared by the extractor and the generator

use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Result of [`write_if_changed`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStatus {
    /// File was created or its contents replaced
    Written,
    /// File already had identical contents
    Unchanged,
}

/// Atomically write `contents` to `path` unless it already holds them
pub fn write_if_changed(path: &Path, contents: &str) -> Result<WriteStatus> {
    if let Ok(existing) = std::fs::read(path)
        && existing == contents.as_bytes()
    {
        tracing::debug!("Unchanged: {}", path.display());
        return Ok(WriteStatus::Unchanged);
    }

    let dir = path.parent().unwrap_or(Path::new("."));
    std::fs::create_dir_all(dir)?;
    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    file.write_all(contents.as_bytes())?;
    file.persist(path).map_err(|e| Error::Io(e.error))?;
    tracing::debug!("Wrote {}", path.display());
    Ok(WriteStatus::Written)
}

/// Remove `*.<ext>` files in `dir` whose stem is not in `keep`
///
/// Only the top level of `dir` is considered. Returns removed paths, sorted.
pub fn purge_stale(dir: &Path, ext: &str, keep: &HashSet<String>) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(vec![]);
    }

    let mut removed = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() || path.extension().is_none_or(|e| e != ext) {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if !keep.contains(stem) {
            std::fs::remove_file(&path)?;
            tracing::info!("Removed stale {}", path.display());
            removed.push(path);
        }
    }
    removed.sort();
    Ok(removed)
}
