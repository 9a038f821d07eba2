use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use docqa_core::chunker::{split_document, ChunkingConfig};
use docqa_core::loader::{load, source_name};
use docqa_core::{Chunk, Embedder, Error, FileType, IndexEntry, Result};
use docqa_vector::VectorIndexHandle;

/// load -> chunk -> embed -> rebuild.
///
/// Nothing touches the index until every chunk has a vector, so a failed
/// ingestion leaves the previously live document searchable.
pub struct IngestionPipeline {
    embedder: Arc<dyn Embedder>,
    index: VectorIndexHandle,
    chunking: ChunkingConfig,
}

impl IngestionPipeline {
    pub fn new(embedder: Arc<dyn Embedder>, index: VectorIndexHandle, chunking: ChunkingConfig) -> Result<Self> {
        chunking.validate()?;
        Ok(Self { embedder, index, chunking })
    }

    pub fn index(&self) -> &VectorIndexHandle { &self.index }
    pub fn embedder(&self) -> &Arc<dyn Embedder> { &self.embedder }

    /// Ingest `path` declared as `file_type` (`"pdf"`, `"txt"`/`"text"`).
    #[tracing::instrument(name = "ingest", skip(self, path), fields(path = %path.as_ref().display()))]
    pub async fn process(&self, path: impl AsRef<Path>, file_type: &str) -> Result<VectorIndexHandle> {
        let file_type: FileType = file_type.parse()?;
        self.ingest(path.as_ref().to_path_buf(), file_type).await
    }

    /// Like [`process`](Self::process), inferring the type from the extension.
    pub async fn process_path(&self, path: impl AsRef<Path>) -> Result<VectorIndexHandle> {
        let file_type = FileType::from_path(path.as_ref())?;
        self.process(path, file_type.as_str()).await
    }

    async fn ingest(&self, path: PathBuf, file_type: FileType) -> Result<VectorIndexHandle> {
        let started = Instant::now();
        let source = source_name(&path);

        let chunks = {
            let load_path = path.clone();
            let source = source.clone();
            let config = self.chunking;
            tokio::task::spawn_blocking(move || -> Result<Vec<Chunk>> {
                let units = load(&load_path, file_type)?;
                tracing::debug!(units = units.len(), "document loaded");
                split_document(&units, &source, &config)
            })
            .await
            .map_err(|e| Error::decode(&path, e))??
        };
        if chunks.is_empty() {
            return Err(Error::decode(&path, "document contains no extractable text"));
        }
        tracing::debug!(chunks = chunks.len(), "document chunked");

        let vectors = self.embed_chunks(&chunks).await?;
        let entries: Vec<IndexEntry> = chunks.into_iter().zip(vectors).map(|(c, v)| IndexEntry::new(c, v)).collect();
        let manifest = self.index.rebuild(&entries, &source, self.embedder.id()).await?;

        tracing::info!(
            %source,
            %file_type,
            chunks = manifest.entries,
            generation = %manifest.generation,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "ingestion complete"
        );
        Ok(self.index.clone())
    }

    async fn embed_chunks(&self, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>> {
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embedder = self.embedder.clone();
        let vectors = tokio::task::spawn_blocking(move || embedder.embed_batch(&texts))
            .await
            .map_err(|e| Error::Embedding(e.to_string()))?
            .map_err(|e| Error::Embedding(format!("{e:#}")))?;

        if vectors.len() != chunks.len() {
            return Err(Error::Embedding(format!("expected {} vectors, got {}", chunks.len(), vectors.len())));
        }
        let dim = self.embedder.dim();
        if let Some((i, v)) = vectors.iter().enumerate().find(|(_, v)| v.len() != dim) {
            return Err(Error::Embedding(format!("vector {i} has dimension {}, expected {dim}", v.len())));
        }
        Ok(vectors)
    }
}
