//! Domain types shared by the loader, chunker, vector index and retriever.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Declared type of an uploaded document.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Pdf,
    Text,
}

impl FileType {
    /// Infer the type from a file extension (`report.PDF` -> `Pdf`).
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .ok_or_else(|| Error::UnsupportedFormat(format!("{} has no extension", path.display())))?;
        ext.parse()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Text => "txt",
        }
    }
}

impl FromStr for FileType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().trim_start_matches('.').to_ascii_lowercase().as_str() {
            "pdf" => Ok(Self::Pdf),
            "txt" | "text" => Ok(Self::Text),
            other => Err(Error::UnsupportedFormat(other.to_string())),
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One logical unit of a loaded document: a PDF page, or a whole text file.
///
/// Units are chunk boundaries; no chunk spans two units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentUnit {
    pub text: String,
    pub page: Option<u32>,
}

/// Where a chunk came from.
///
/// - `source`: file name of the uploaded document
/// - `page`: 1-based PDF page, `None` for text files
/// - `chunk_index`: position of the chunk within its unit
/// - `start_offset`: character offset of the chunk start within its unit
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkMeta {
    pub source: String,
    pub page: Option<u32>,
    pub chunk_index: usize,
    pub start_offset: usize,
}

/// A bounded substring of a source document, the unit of embedding and retrieval.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    pub text: String,
    pub meta: ChunkMeta,
}

/// A chunk paired with its embedding, as handed to the vector index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub text: String,
    pub vector: Vec<f32>,
    pub meta: ChunkMeta,
}

impl IndexEntry {
    pub fn new(chunk: Chunk, vector: Vec<f32>) -> Self {
        Self { text: chunk.text, vector, meta: chunk.meta }
    }
}

/// A single nearest-neighbour result.
///
/// `score` is cosine similarity (higher is better). `ordinal` is the entry's
/// insertion position in the live index and breaks score ties.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    pub text: String,
    pub meta: ChunkMeta,
    pub score: f32,
    pub ordinal: usize,
}
