//! On-disk layout of the index directory.
//!
//! ```text
//! <root>/
//!   ACTIVE.json          manifest of the live generation (atomically replaced)
//!   gen-<ts>-<fp>/       one LanceDB database per generation, table `chunks`
//! ```
//!
//! Directories under `<root>` that start with `gen-` and are not named by
//! `ACTIVE.json` are leftovers of an interrupted or superseded rebuild and
//! get swept.
use anyhow::{Context, Result};
use lancedb::{connect, Connection};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const POINTER_FILE: &str = "ACTIVE.json";
pub const GENERATION_PREFIX: &str = "gen-";

/// Description of one built generation, persisted as the active pointer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Manifest {
    pub generation: String,
    /// File name of the document the generation was built from.
    pub source: String,
    pub embedder_id: String,
    pub dim: usize,
    pub entries: usize,
    /// blake3 over the chunk texts, in order.
    pub fingerprint: String,
    pub created_at_ms: i64,
}

pub async fn open_db(dir: &Path) -> Result<Connection> {
    Ok(connect(dir.to_string_lossy().as_ref()).execute().await?)
}

pub fn generation_dir(root: &Path, generation: &str) -> PathBuf {
    root.join(generation)
}

pub fn read_manifest(root: &Path) -> Result<Option<Manifest>> {
    let path = root.join(POINTER_FILE);
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
    let manifest = serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
    Ok(Some(manifest))
}

/// Replace the active pointer: write to a temp file in `root`, fsync, rename.
pub fn write_manifest(root: &Path, manifest: &Manifest) -> Result<()> {
    let mut tmp = tempfile::NamedTempFile::new_in(root)
        .with_context(|| format!("creating temp pointer in {}", root.display()))?;
    serde_json::to_writer_pretty(&mut tmp, manifest)?;
    tmp.write_all(b"\n")?;
    tmp.as_file().sync_all()?;
    tmp.persist(root.join(POINTER_FILE)).map_err(|e| e.error)?;
    Ok(())
}

/// Remove every generation directory except `keep`, plus stray temp pointers.
/// Best effort: failures are logged and skipped. Returns how many were removed.
pub fn sweep_generations(root: &Path, keep: Option<&str>) -> usize {
    let mut removed = 0usize;
    for entry in walkdir::WalkDir::new(root).min_depth(1).max_depth(1).into_iter().filter_map(|e| e.ok()) {
        let name = entry.file_name().to_string_lossy().to_string();
        let is_generation = entry.file_type().is_dir() && name.starts_with(GENERATION_PREFIX);
        let is_stray_tmp = entry.file_type().is_file() && name.starts_with(".tmp");
        if !(is_generation || is_stray_tmp) || Some(name.as_str()) == keep {
            continue;
        }
        let res = if is_generation { fs::remove_dir_all(entry.path()) } else { fs::remove_file(entry.path()) };
        match res {
            Ok(()) => {
                tracing::debug!(path = %entry.path().display(), "removed stale index state");
                removed += 1;
            }
            Err(e) => tracing::warn!(path = %entry.path().display(), error = %e, "could not remove stale index state"),
        }
    }
    removed
}
