//! Qdrant vector store integration.

pub mod client;
pub mod payload;
pub mod types;

pub use client::QdrantService;
pub use payload::{SummaryPayload, read_payload};
pub use types::{QdrantError, QdrantSettings, ScoredPoint, SummaryPoint};
