use std::sync::Arc;

use docqa_core::config::MAX_TOP_K;
use docqa_core::{Embedder, Error, Result, SearchHit};
use docqa_vector::VectorIndexHandle;

/// Returned by [`Retriever::retrieve`] while no document is indexed.
pub const NO_DOCUMENT_SENTINEL: &str = "No document processed.";

pub struct Retriever {
    index: VectorIndexHandle,
    embedder: Arc<dyn Embedder>,
    top_k: usize,
}

impl Retriever {
    pub fn new(index: VectorIndexHandle, embedder: Arc<dyn Embedder>, top_k: usize) -> Result<Self> {
        if !(1..=MAX_TOP_K).contains(&top_k) {
            return Err(Error::InvalidConfig(format!("top_k must be in 1..={MAX_TOP_K}, got {top_k}")));
        }
        Ok(Self { index, embedder, top_k })
    }

    pub fn top_k(&self) -> usize { self.top_k }

    /// Top-k chunk texts for `query`, joined by a blank line.
    pub async fn retrieve(&self, query: &str) -> Result<String> {
        match self.retrieve_hits(query).await {
            Ok(hits) => Ok(hits.into_iter().map(|h| h.text).collect::<Vec<_>>().join("\n\n")),
            Err(Error::EmptyIndex) => Ok(NO_DOCUMENT_SENTINEL.to_string()),
            Err(e) => Err(e),
        }
    }

    /// Top-k hits for `query`. A blank query matches nothing.
    pub async fn retrieve_hits(&self, query: &str) -> Result<Vec<SearchHit>> {
        let manifest = self.index.manifest().await.ok_or(Error::EmptyIndex)?;
        if manifest.embedder_id != self.embedder.id() {
            return Err(Error::EmbedderMismatch { indexed: manifest.embedder_id, query: self.embedder.id().to_string() });
        }
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let embedder = self.embedder.clone();
        let text = query.to_string();
        let vector = tokio::task::spawn_blocking(move || embedder.embed(&text))
            .await
            .map_err(|e| Error::Embedding(e.to_string()))?
            .map_err(|e| Error::Embedding(format!("{e:#}")))?;
        let hits = self.index.search(&vector, self.top_k).await?;
        tracing::debug!(hits = hits.len(), top_k = self.top_k, "retrieved");
        Ok(hits)
    }
}
