//! Ingestion and answering orchestration.
//!
//! [`IngestionOrchestrator`] turns PDFs into stored elements with indexed summaries;
//! [`AnsweringOrchestrator`] answers questions against them. [`RagService`] bundles both over
//! one [`RagContext`](crate::store::RagContext) for the HTTP and console surfaces.

pub mod answer;
pub mod ingest;
pub mod service;
pub mod types;

pub use answer::{APOLOGY_REPLY, AnsweringOrchestrator, GREETING_REPLY};
pub use ingest::IngestionOrchestrator;
pub use service::{RagApi, RagService, ServiceBuildError};
pub use types::{
    Answer, AnswerError, AnswerPath, DocumentFailure, IngestError, IngestReport, RetrievedElement,
};
