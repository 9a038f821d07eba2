//! docqa-vector
//!
//! LanceDB-backed nearest-neighbour index holding exactly one document at a
//! time. See [`VectorIndex`] for the generation/pointer lifecycle.
pub mod schema;
pub mod search;
pub mod table;
pub mod writer;
mod index;

pub use index::{IndexOptions, VectorIndex, VectorIndexHandle};
pub use table::{Manifest, POINTER_FILE};
