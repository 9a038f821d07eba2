use anyhow::{anyhow, Result};
use arrow_array::{Array, Float32Array, Int32Array, Int64Array, RecordBatch, StringArray};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{DistanceType, Table};
use std::cmp::Ordering;

use docqa_core::{ChunkMeta, SearchHit};

use crate::schema::VECTOR_COLUMN;

/// Flat cosine scan returning up to `fetch` rows; score is `1 - distance`.
pub async fn nearest(table: &Table, query: &[f32], fetch: usize) -> Result<Vec<SearchHit>> {
	let mut stream = table
		.vector_search(query.to_vec())?
		.column(VECTOR_COLUMN)
		.distance_type(DistanceType::Cosine)
		.limit(fetch)
		.execute()
		.await?;
	let mut hits = Vec::new();
	while let Some(batch) = stream.try_next().await? {
		hits.extend(batch_to_hits(&batch)?);
	}
	Ok(hits)
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
	batch
		.column_by_name(name)
		.ok_or_else(|| anyhow!("result batch has no '{name}' column"))?
		.as_any()
		.downcast_ref::<T>()
		.ok_or_else(|| anyhow!("column '{name}' has unexpected type"))
}

fn batch_to_hits(batch: &RecordBatch) -> Result<Vec<SearchHit>> {
	let ordinals = column::<Int64Array>(batch, "ordinal")?;
	let contents = column::<StringArray>(batch, "content")?;
	let sources = column::<StringArray>(batch, "source")?;
	let pages = column::<Int32Array>(batch, "page")?;
	let chunk_indices = column::<Int64Array>(batch, "chunk_index")?;
	let offsets = column::<Int64Array>(batch, "start_offset")?;
	let distances = column::<Float32Array>(batch, "_distance")?;
	let mut hits = Vec::with_capacity(batch.num_rows());
	for i in 0..batch.num_rows() {
		let page = if pages.is_null(i) { None } else { Some(pages.value(i) as u32) };
		hits.push(SearchHit {
			text: contents.value(i).to_string(),
			meta: ChunkMeta {
				source: sources.value(i).to_string(),
				page,
				chunk_index: chunk_indices.value(i) as usize,
				start_offset: offsets.value(i) as usize,
			},
			score: 1.0 - distances.value(i),
			ordinal: ordinals.value(i) as usize,
		});
	}
	Ok(hits)
}

/// Order by score descending, then by insertion order; keep the first `k`.
///
/// NaN scores sort last.
pub fn rank(mut hits: Vec<SearchHit>, k: usize) -> Vec<SearchHit> {
	fn key(score: f32) -> f32 { if score.is_nan() { f32::NEG_INFINITY } else { score } }
	hits.sort_by(|a, b| match key(b.score).total_cmp(&key(a.score)) {
		Ordering::Equal => a.ordinal.cmp(&b.ordinal),
		other => other,
	});
	hits.truncate(k);
	hits
}
