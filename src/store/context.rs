//! Process-wide pairing of the document store and the summary index.

use super::{DocumentStore, ElementId, IndexEntry, StoreError, SummaryIndex};
use crate::extraction::{Element, ElementKind};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Result of registering one bucket of elements.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BucketOutcome {
    /// Elements written to the document store.
    pub stored: usize,
    /// Summaries written to the index.
    pub indexed: usize,
    /// Elements whose summary was blank and therefore not indexed.
    pub dropped_empty: usize,
    /// Store or index failure, if any.
    pub failure: Option<String>,
}

/// Owner of the document store and summary index, shared by both orchestrators.
pub struct RagContext {
    store: DocumentStore,
    index: Arc<dyn SummaryIndex>,
    write_lock: Mutex<()>,
}

impl RagContext {
    /// Bind a store and an index together.
    pub fn new(store: DocumentStore, index: Arc<dyn SummaryIndex>) -> Self {
        Self {
            store,
            index,
            write_lock: Mutex::new(()),
        }
    }

    /// Original elements keyed by identifier.
    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    /// Semantic index over summaries.
    pub fn index(&self) -> &dyn SummaryIndex {
        self.index.as_ref()
    }

    /// Register `elements` and their `summaries` (same order, same length) under fresh
    /// identifiers.
    ///
    /// All elements are written to the store first; only then are the non-blank summaries
    /// upserted to the index, so every indexed identifier resolves in the store. Concurrent
    /// registrations are serialized.
    pub async fn register_bucket(
        &self,
        kind: ElementKind,
        elements: Vec<Element>,
        summaries: Vec<String>,
    ) -> BucketOutcome {
        if elements.len() != summaries.len() {
            tracing::warn!(
                bucket = %kind,
                elements = elements.len(),
                summaries = summaries.len(),
                "Summary count does not match element count; unmatched elements stay unindexed"
            );
        }
        if elements.is_empty() {
            return BucketOutcome::default();
        }

        let _guard = self.write_lock.lock().await;

        let mut summaries = summaries.into_iter();
        let mut records = Vec::with_capacity(elements.len());
        let mut entries = Vec::new();
        let mut dropped_empty = 0;
        for element in elements {
            let id = self.fresh_id().await;
            let summary = summaries.next().unwrap_or_default();
            let summary = summary.trim();
            if summary.is_empty() {
                dropped_empty += 1;
            } else {
                entries.push(IndexEntry {
                    id,
                    kind,
                    summary: summary.to_string(),
                    source: element.provenance().source.clone(),
                    page_number: element.provenance().page_number,
                });
            }
            records.push((id, element));
        }

        let stored = records.len();
        if let Err(error) = self.store.set_many(records).await {
            tracing::error!(
                bucket = %kind,
                error = %error,
                "Document store write failed; bucket skipped"
            );
            return BucketOutcome {
                stored: 0,
                indexed: 0,
                dropped_empty,
                failure: Some(error.to_string()),
            };
        }

        match self.index.upsert(entries).await {
            Ok(indexed) => {
                tracing::info!(bucket = %kind, stored, indexed, dropped_empty, "Bucket registered");
                BucketOutcome {
                    stored,
                    indexed,
                    dropped_empty,
                    failure: None,
                }
            }
            Err(error) => {
                tracing::error!(
                    bucket = %kind,
                    stored,
                    error = %error,
                    "Summary index write failed; elements remain store-only"
                );
                BucketOutcome {
                    stored,
                    indexed: 0,
                    dropped_empty,
                    failure: Some(error.to_string()),
                }
            }
        }
    }

    /// Remove every element and summary.
    pub async fn reset(&self) -> Result<(), ResetError> {
        let _guard = self.write_lock.lock().await;
        self.index.reset().await?;
        self.store.clear().await?;
        tracing::info!("Document store and summary index reset");
        Ok(())
    }

    async fn fresh_id(&self) -> ElementId {
        loop {
            let id = ElementId::generate();
            if !self.store.contains(&id).await {
                return id;
            }
        }
    }
}

/// Failure while resetting persisted state.
#[derive(Debug, thiserror::Error)]
pub enum ResetError {
    /// Index could not be dropped.
    #[error(transparent)]
    Index(#[from] super::IndexWriteError),
    /// Store files could not be removed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::Provenance;
    use crate::store::{IndexHit, IndexQueryError, IndexWriteError};
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct RecordingIndex {
        entries: StdMutex<Vec<IndexEntry>>,
        fail: bool,
    }

    #[async_trait]
    impl SummaryIndex for RecordingIndex {
        async fn upsert(&self, entries: Vec<IndexEntry>) -> Result<usize, IndexWriteError> {
            if self.fail {
                return Err(IndexWriteError::Timeout {
                    operation: "qdrant upsert",
                    after: std::time::Duration::from_secs(1),
                });
            }
            let count = entries.len();
            self.entries.lock().expect("lock").extend(entries);
            Ok(count)
        }

        async fn query(&self, _text: &str, _k: usize) -> Result<Vec<IndexHit>, IndexQueryError> {
            Ok(Vec::new())
        }

        async fn reset(&self) -> Result<(), IndexWriteError> {
            self.entries.lock().expect("lock").clear();
            Ok(())
        }
    }

    fn texts(n: usize) -> Vec<Element> {
        (0..n)
            .map(|i| {
                Element::text(
                    format!("paragraph {i}"),
                    Provenance {
                        source: "doc.pdf".into(),
                        page_number: Some(1),
                    },
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn blank_summaries_are_store_only() {
        let index = Arc::new(RecordingIndex::default());
        let context = RagContext::new(DocumentStore::in_memory(), index.clone());

        let outcome = context
            .register_bucket(
                ElementKind::Text,
                texts(4),
                vec!["one".into(), "  ".into(), "three".into(), String::new()],
            )
            .await;

        assert_eq!(outcome.stored, 4);
        assert_eq!(outcome.indexed, 2);
        assert_eq!(outcome.dropped_empty, 2);
        assert_eq!(context.store().len().await, 4);

        let indexed = index.entries.lock().expect("lock").clone();
        for entry in &indexed {
            assert!(context.store().get(&entry.id).await.is_some());
        }
    }

    #[tokio::test]
    async fn index_failure_keeps_store_entries() {
        let index = Arc::new(RecordingIndex {
            fail: true,
            ..Default::default()
        });
        let context = RagContext::new(DocumentStore::in_memory(), index);
        let outcome = context
            .register_bucket(ElementKind::Table, texts(2), vec!["a".into(), "b".into()])
            .await;
        assert_eq!(outcome.stored, 2);
        assert_eq!(outcome.indexed, 0);
        assert!(outcome.failure.is_some());
    }

    #[tokio::test]
    async fn concurrent_registrations_keep_distinct_identifiers() {
        let index = Arc::new(RecordingIndex::default());
        let context = Arc::new(RagContext::new(DocumentStore::in_memory(), index.clone()));

        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let context = context.clone();
                tokio::spawn(async move {
                    context
                        .register_bucket(ElementKind::Text, texts(5), vec!["s".into(); 5])
                        .await
                })
            })
            .collect();
        for task in tasks {
            task.await.expect("join");
        }

        assert_eq!(context.store().len().await, 20);
        assert_eq!(index.entries.lock().expect("lock").len(), 20);
    }

    #[tokio::test]
    async fn reset_clears_both_sides() {
        let index = Arc::new(RecordingIndex::default());
        let context = RagContext::new(DocumentStore::in_memory(), index.clone());
        context
            .register_bucket(ElementKind::Text, texts(1), vec!["x".into()])
            .await;
        context.reset().await.expect("reset");
        assert!(context.store().is_empty().await);
        assert!(index.entries.lock().expect("lock").is_empty());
    }
}
