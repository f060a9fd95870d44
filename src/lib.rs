#![deny(missing_docs)]

//! Core library for the multimodal PDF RAG service.

/// HTTP routing and REST handlers.
pub mod api;
/// Ollama runtime health check and autostart.
pub mod bootstrap;
/// Element classification into summarization buckets.
pub mod classify;
/// Environment-driven configuration management.
pub mod config;
/// Interactive console chat loop.
pub mod console;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// JSON Lines chunk export.
pub mod export;
/// PDF extraction adapters and the element model.
pub mod extraction;
/// Answering language-model adapters.
pub mod llm;
/// Structured logging and tracing setup.
pub mod logging;
/// Ingestion and answering counters.
pub mod metrics;
/// Ingestion and answering orchestration.
pub mod pipeline;
/// Qdrant vector store integration.
pub mod qdrant;
/// Timeouts and retries around collaborator calls.
pub mod resilience;
/// Document store, summary index, and their shared context.
pub mod store;
/// Element summarization.
pub mod summarization;
