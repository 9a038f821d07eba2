use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use lancedb::Table;
use tokio::sync::{Mutex, RwLock};

use docqa_core::{Error, IndexEntry, Result, SearchHit};

use crate::schema::TABLE_NAME;
use crate::search::{nearest, rank};
use crate::table::{generation_dir, open_db, read_manifest, sweep_generations, write_manifest, Manifest, GENERATION_PREFIX};
use crate::writer::write_generation;

pub type VectorIndexHandle = Arc<VectorIndex>;

#[derive(Debug, Clone, Copy)]
pub struct IndexOptions {
    /// Candidates fetched per requested hit before the final re-sort.
    pub overfetch: usize,
}

impl Default for IndexOptions {
    fn default() -> Self { Self { overfetch: 10 } }
}

struct Generation {
    manifest: Manifest,
    table: Table,
}

/// Single-document vector index persisted under one directory.
///
/// Each `rebuild` writes a new generation next to the live one, repoints
/// `ACTIVE.json`, swaps the in-memory handle under the write lock and then
/// deletes the previous generation. Searches hold the read lock for their
/// whole duration, so a search sees exactly one generation.
pub struct VectorIndex {
    root: PathBuf,
    options: IndexOptions,
    live: RwLock<Option<Generation>>,
    rebuild_lock: Mutex<()>,
}

impl fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VectorIndex").field("root", &self.root).field("options", &self.options).finish_non_exhaustive()
    }
}

impl VectorIndex {
    /// Open (or create) the index at `root`, restoring the live generation if any.
    pub async fn open(root: impl AsRef<Path>, options: IndexOptions) -> Result<VectorIndexHandle> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root).map_err(|e| Error::IndexRead(format!("creating {}: {e}", root.display())))?;
        let manifest = read_manifest(&root).map_err(|e| Error::IndexRead(format!("{e:#}")))?;
        let live = match manifest {
            Some(manifest) => {
                let table = open_generation(&root, &manifest.generation)
                    .await
                    .map_err(|e| Error::IndexRead(format!("generation {}: {e:#}", manifest.generation)))?;
                tracing::info!(generation = %manifest.generation, source = %manifest.source, entries = manifest.entries, "restored live index");
                Some(Generation { manifest, table })
            }
            None => None,
        };
        let keep = live.as_ref().map(|g| g.manifest.generation.clone());
        let swept = sweep_generations(&root, keep.as_deref());
        if swept > 0 {
            tracing::info!(swept, "removed orphaned index generations");
        }
        Ok(Arc::new(Self { root, options, live: RwLock::new(live), rebuild_lock: Mutex::new(()) }))
    }

    pub fn root(&self) -> &Path { &self.root }

    pub async fn manifest(&self) -> Option<Manifest> {
        self.live.read().await.as_ref().map(|g| g.manifest.clone())
    }

    pub async fn is_empty(&self) -> bool {
        self.live.read().await.is_none()
    }

    /// Replace the live index with `entries`, all from `source`.
    ///
    /// On any error the previous generation stays live and the partially
    /// written directory is removed.
    pub async fn rebuild(&self, entries: &[IndexEntry], source: &str, embedder_id: &str) -> Result<Manifest> {
        let _serial = self.rebuild_lock.lock().await;
        let started = Instant::now();
        let dim = validate_entries(entries)?;
        let fingerprint = fingerprint(entries);
        let generation = self.next_generation_name(&fingerprint);
        let dir = generation_dir(&self.root, &generation);

        let table = match write_generation(&dir, entries, dim).await {
            Ok(t) => t,
            Err(e) => {
                discard(&dir);
                return Err(Error::IndexWrite(format!("{e:#}")));
            }
        };
        let manifest = Manifest {
            generation: generation.clone(),
            source: source.to_string(),
            embedder_id: embedder_id.to_string(),
            dim,
            entries: entries.len(),
            fingerprint,
            created_at_ms: chrono::Utc::now().timestamp_millis(),
        };
        if let Err(e) = write_manifest(&self.root, &manifest) {
            drop(table);
            discard(&dir);
            return Err(Error::IndexWrite(format!("{e:#}")));
        }

        let previous = {
            let mut live = self.live.write().await;
            live.replace(Generation { manifest: manifest.clone(), table })
        };
        drop(previous);
        sweep_generations(&self.root, Some(&generation));

        tracing::info!(
            %generation,
            source,
            entries = entries.len(),
            dim,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "index generation activated"
        );
        Ok(manifest)
    }

    /// The `k` nearest entries to `query` by cosine similarity.
    ///
    /// Fetches `k * overfetch` candidates; when the k-th score ties with the
    /// weakest candidate the whole generation is scanned, so ties resolve by
    /// insertion order regardless of the order LanceDB returns rows in.
    pub async fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        let live = self.live.read().await;
        let generation = live.as_ref().ok_or(Error::EmptyIndex)?;
        let expected = generation.manifest.dim;
        if query.len() != expected {
            return Err(Error::DimensionMismatch { expected, actual: query.len() });
        }
        if k == 0 {
            return Ok(Vec::new());
        }
        let entries = generation.manifest.entries;
        let mut fetch = k.saturating_mul(self.options.overfetch.max(1)).min(entries).max(1);
        loop {
            let hits = nearest(&generation.table, query, fetch).await.map_err(|e| Error::IndexRead(format!("{e:#}")))?;
            tracing::debug!(k, fetch, candidates = hits.len(), "vector search");
            let candidates = hits.len();
            let ranked = rank(hits, candidates);
            if fetch < entries && candidates >= fetch && boundary_tie(&ranked, k) {
                fetch = entries;
                continue;
            }
            return Ok(rank(ranked, k));
        }
    }

    fn next_generation_name(&self, fingerprint: &str) -> String {
        let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S%3f");
        let base = format!("{GENERATION_PREFIX}{stamp}-{}", &fingerprint[..12]);
        let mut name = base.clone();
        let mut n = 1u32;
        while generation_dir(&self.root, &name).exists() {
            name = format!("{base}-{n}");
            n += 1;
        }
        name
    }
}

/// Whether the k-th best candidate scores the same as the weakest one fetched,
/// meaning unfetched rows may share that score.
fn boundary_tie(ranked: &[SearchHit], k: usize) -> bool {
    match (ranked.get(k.saturating_sub(1)), ranked.last()) {
        (Some(kth), Some(last)) => kth.score == last.score || kth.score.is_nan(),
        _ => false,
    }
}

async fn open_generation(root: &Path, generation: &str) -> anyhow::Result<Table> {
    let db = open_db(&generation_dir(root, generation)).await?;
    Ok(db.open_table(TABLE_NAME).execute().await?)
}

fn validate_entries(entries: &[IndexEntry]) -> Result<usize> {
    let first = entries.first().ok_or_else(|| Error::IndexWrite("no entries to index".into()))?;
    let dim = first.vector.len();
    if dim == 0 {
        return Err(Error::IndexWrite("entries have zero-length vectors".into()));
    }
    if let Some(bad) = entries.iter().find(|e| e.vector.len() != dim) {
        return Err(Error::DimensionMismatch { expected: dim, actual: bad.vector.len() });
    }
    Ok(dim)
}

fn fingerprint(entries: &[IndexEntry]) -> String {
    let mut hasher = blake3::Hasher::new();
    for e in entries {
        hasher.update(e.text.as_bytes());
        hasher.update(&[0]);
    }
    hasher.finalize().to_hex().to_string()
}

fn discard(dir: &Path) {
    if dir.exists() {
        if let Err(e) = std::fs::remove_dir_all(dir) {
            tracing::warn!(dir = %dir.display(), error = %e, "could not remove failed generation");
        }
    }
}
