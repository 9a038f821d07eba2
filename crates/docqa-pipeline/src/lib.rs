//! docqa-pipeline
//!
//! Document ingestion into the live vector index, and top-k retrieval over it.
mod ingest;
mod retrieve;

pub use ingest::IngestionPipeline;
pub use retrieve::{Retriever, NO_DOCUMENT_SENTINEL};
