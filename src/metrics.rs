use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing indexing activity.
#[derive(Default)]
pub struct IndexingMetrics {
    documents_indexed: AtomicU64,
    chunks_indexed: AtomicU64,
    jobs_failed: AtomicU64,
}

impl IndexingMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an indexed document and the number of chunks written for it.
    pub fn record_document(&self, chunk_count: u64) {
        self.documents_indexed.fetch_add(1, Ordering::Relaxed);
        self.chunks_indexed
            .fetch_add(chunk_count, Ordering::Relaxed);
    }

    /// Record a job that ended in the `error` phase.
    pub fn record_failure(&self) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_indexed: self.documents_indexed.load(Ordering::Relaxed),
            chunks_indexed: self.chunks_indexed.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of indexing counters, served by `GET /metrics`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Documents indexed since startup.
    pub documents_indexed: u64,
    /// Chunks written across all indexed documents.
    pub chunks_indexed: u64,
    /// Jobs that finished in the `error` phase.
    pub jobs_failed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_documents_chunks_and_failures() {
        let metrics = IndexingMetrics::new();
        metrics.record_document(2);
        metrics.record_document(3);
        metrics.record_failure();

        assert_eq!(
            metrics.snapshot(),
            MetricsSnapshot {
                documents_indexed: 2,
                chunks_indexed: 5,
                jobs_failed: 1,
            }
        );
    }

    #[test]
    fn snapshot_starts_at_zero() {
        let snapshot = IndexingMetrics::new().snapshot();
        assert_eq!(snapshot.documents_indexed, 0);
        assert_eq!(snapshot.jobs_failed, 0);
    }
}
