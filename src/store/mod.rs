//! Document store, summary index, and the context that keeps them paired.

pub mod context;
pub mod document_store;
pub mod index;

pub use context::{BucketOutcome, RagContext, ResetError};
pub use document_store::{DocumentStore, ElementId, StoreError};
pub use index::{
    IndexEntry, IndexHit, IndexQueryError, IndexWriteError, QdrantSummaryIndex, SummaryIndex,
};
