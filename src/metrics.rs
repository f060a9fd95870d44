use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing ingestion and answering activity.
#[derive(Default)]
pub struct RagMetrics {
    documents_ingested: AtomicU64,
    elements_stored: AtomicU64,
    summaries_indexed: AtomicU64,
    questions_answered: AtomicU64,
}

impl RagMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one ingestion call.
    pub fn record_ingestion(&self, documents: u64, stored: u64, indexed: u64) {
        self.documents_ingested
            .fetch_add(documents, Ordering::Relaxed);
        self.elements_stored.fetch_add(stored, Ordering::Relaxed);
        self.summaries_indexed.fetch_add(indexed, Ordering::Relaxed);
    }

    /// Record one answered question.
    pub fn record_question(&self) {
        self.questions_answered.fetch_add(1, Ordering::Relaxed);
    }

    /// Zero the storage counters after a reset; answered questions keep counting.
    pub fn clear_storage(&self) {
        self.elements_stored.store(0, Ordering::Relaxed);
        self.summaries_indexed.store(0, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_ingested: self.documents_ingested.load(Ordering::Relaxed),
            elements_stored: self.elements_stored.load(Ordering::Relaxed),
            summaries_indexed: self.summaries_indexed.load(Ordering::Relaxed),
            questions_answered: self.questions_answered.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of the counters used for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Documents extracted successfully since startup.
    pub documents_ingested: u64,
    /// Elements written to the document store since startup or the last reset.
    pub elements_stored: u64,
    /// Summaries written to the index since startup or the last reset.
    pub summaries_indexed: u64,
    /// Questions answered since startup.
    pub questions_answered: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_ingestions_and_questions() {
        let metrics = RagMetrics::new();
        metrics.record_ingestion(1, 4, 3);
        metrics.record_ingestion(2, 6, 6);
        metrics.record_question();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.documents_ingested, 3);
        assert_eq!(snapshot.elements_stored, 10);
        assert_eq!(snapshot.summaries_indexed, 9);
        assert_eq!(snapshot.questions_answered, 1);
    }

    #[test]
    fn clearing_storage_keeps_activity_counters() {
        let metrics = RagMetrics::new();
        metrics.record_ingestion(1, 2, 2);
        metrics.record_question();
        metrics.clear_storage();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.elements_stored, 0);
        assert_eq!(snapshot.summaries_indexed, 0);
        assert_eq!(snapshot.documents_ingested, 1);
        assert_eq!(snapshot.questions_answered, 1);
    }
}
