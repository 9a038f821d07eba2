//! Fixed-size, overlapping character windows.
//!
//! Sizes count Unicode scalar values, so a window never splits a code point.
//! Each window starts `chunk_size - overlap` characters after the previous
//! one; the last window may be shorter and is the first to reach the end of
//! the text.
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{Chunk, ChunkMeta, DocumentUnit};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { chunk_size: 500, overlap: 100 }
    }
}

impl ChunkingConfig {
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        let config = Self { chunk_size, overlap };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::InvalidConfig("chunking.chunk_size must be > 0".into()));
        }
        if self.overlap >= self.chunk_size {
            return Err(Error::InvalidConfig(format!(
                "chunking.overlap ({}) must be < chunking.chunk_size ({})",
                self.overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

/// A window borrowed from the source text. `start` is a character offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window<'a> {
    pub text: &'a str,
    pub start: usize,
}

/// Split `text` into ordered overlapping windows.
///
/// Empty text yields no windows; text no longer than `chunk_size` yields one
/// window equal to the whole text.
pub fn split(text: &str, chunk_size: usize, overlap: usize) -> Result<Vec<Window<'_>>> {
    ChunkingConfig { chunk_size, overlap }.validate()?;
    if text.is_empty() {
        return Ok(Vec::new());
    }

    // byte offset of every char start, plus the end of the text
    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_len = bounds.len() - 1;
    let step = chunk_size - overlap;

    let mut windows = Vec::with_capacity(char_len / step + 1);
    let mut start = 0usize;
    loop {
        let end = (start + chunk_size).min(char_len);
        windows.push(Window { text: &text[bounds[start]..bounds[end]], start });
        if end == char_len {
            break;
        }
        start += step;
    }
    Ok(windows)
}

/// Chunk one document unit and tag every chunk with its origin.
///
/// Whitespace-only units (blank PDF pages) produce no chunks.
pub fn split_unit(unit: &DocumentUnit, source: &str, config: &ChunkingConfig) -> Result<Vec<Chunk>> {
    if unit.text.trim().is_empty() {
        return Ok(Vec::new());
    }
    let windows = split(&unit.text, config.chunk_size, config.overlap)?;
    Ok(windows
        .into_iter()
        .enumerate()
        .map(|(chunk_index, w)| Chunk {
            text: w.text.to_string(),
            meta: ChunkMeta {
                source: source.to_string(),
                page: unit.page,
                chunk_index,
                start_offset: w.start,
            },
        })
        .collect())
}

/// Chunk every unit of a document in order.
pub fn split_document(units: &[DocumentUnit], source: &str, config: &ChunkingConfig) -> Result<Vec<Chunk>> {
    let mut chunks = Vec::new();
    for unit in units {
        chunks.extend(split_unit(unit, source, config)?);
    }
    Ok(chunks)
}
