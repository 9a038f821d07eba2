use anyhow::Result;
use arrow_array::{FixedSizeListArray, Int32Array, Int64Array, RecordBatch, RecordBatchIterator, StringArray};
use arrow_schema::{ArrowError, Schema};
use lancedb::Table;
use std::path::Path;
use std::sync::Arc;

use docqa_core::IndexEntry;

use crate::schema::{build_chunk_schema, TABLE_NAME};
use crate::table::open_db;

const WRITE_BATCH: usize = 1024;

/// Write `entries` as a fresh LanceDB database in `dir` and return its table.
///
/// All batches go into a single `create_table` commit, so the table either
/// exists with every row or not at all.
pub async fn write_generation(dir: &Path, entries: &[IndexEntry], dim: usize) -> Result<Table> {
	std::fs::create_dir_all(dir)?;
	let db = open_db(dir).await?;
	let schema = build_chunk_schema(dim);
	let batches: Vec<Result<RecordBatch, ArrowError>> = entries
		.chunks(WRITE_BATCH)
		.enumerate()
		.map(|(i, part)| entries_to_record_batch(schema.clone(), part, i * WRITE_BATCH, dim))
		.collect();
	let reader = Box::new(RecordBatchIterator::new(batches.into_iter(), schema));
	let table = db.create_table(TABLE_NAME, reader).execute().await?;
	tracing::debug!(dir = %dir.display(), rows = entries.len(), "wrote generation table");
	Ok(table)
}

fn entries_to_record_batch(schema: Arc<Schema>, entries: &[IndexEntry], first_ordinal: usize, dim: usize) -> Result<RecordBatch, ArrowError> {
	let mut ordinals = Vec::with_capacity(entries.len()); let mut contents = Vec::with_capacity(entries.len()); let mut sources = Vec::with_capacity(entries.len());
	let mut pages = Vec::with_capacity(entries.len()); let mut chunk_indices = Vec::with_capacity(entries.len()); let mut offsets = Vec::with_capacity(entries.len());
	let mut vectors: Vec<Option<Vec<Option<f32>>>> = Vec::with_capacity(entries.len());
	for (i, e) in entries.iter().enumerate() {
		ordinals.push((first_ordinal + i) as i64);
		contents.push(e.text.as_str());
		sources.push(e.meta.source.as_str());
		pages.push(e.meta.page.map(|p| p as i32));
		chunk_indices.push(e.meta.chunk_index as i64);
		offsets.push(e.meta.start_offset as i64);
		vectors.push(Some(e.vector.iter().map(|&x| Some(x)).collect()));
	}
	RecordBatch::try_new(schema, vec![
		Arc::new(Int64Array::from(ordinals)),
		Arc::new(StringArray::from(contents)),
		Arc::new(StringArray::from(sources)),
		Arc::new(Int32Array::from(pages)),
		Arc::new(Int64Array::from(chunk_indices)),
		Arc::new(Int64Array::from(offsets)),
		Arc::new(FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(vectors.into_iter(), dim as i32)),
	])
}
