use arrow_schema::{DataType, Field, Schema};
use std::sync::Arc;

pub const TABLE_NAME: &str = "chunks";
pub const VECTOR_COLUMN: &str = "vector";

/// One row per chunk; `ordinal` is the insertion position within the generation.
pub fn build_chunk_schema(dim: usize) -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new("ordinal", DataType::Int64, false),
		Field::new("content", DataType::Utf8, false),
		Field::new("source", DataType::Utf8, false),
		Field::new("page", DataType::Int32, true),
		Field::new("chunk_index", DataType::Int64, false),
		Field::new("start_offset", DataType::Int64, false),
		Field::new(VECTOR_COLUMN, DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim as i32), true),
	]))
}
