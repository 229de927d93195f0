use model::{execution::run::RunStats, records::chunk::ChunkSummary};
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

#[derive(Debug, Default)]
struct InnerMetrics {
    rows_read: AtomicU64,
    documents_processed: AtomicU64,
    documents_written: AtomicU64,
    process_skips: AtomicU64,
    write_skips: AtomicU64,
    retries: AtomicU64,
    chunks_committed: AtomicU64,
    chunks_aborted: AtomicU64,
}

/// Run-wide counters shared by every chunk worker.
#[derive(Debug, Clone)]
pub struct RunMetrics {
    inner: Arc<InnerMetrics>,
}

impl RunMetrics {
    pub fn new() -> Self {
        RunMetrics {
            inner: Arc::new(InnerMetrics::default()),
        }
    }

    pub fn record_chunk(&self, chunk: &ChunkSummary, committed: bool) {
        let m = &self.inner;
        m.rows_read.fetch_add(chunk.read_count, Ordering::Relaxed);
        m.documents_processed
            .fetch_add(chunk.processed_count, Ordering::Relaxed);
        m.documents_written
            .fetch_add(chunk.written_count, Ordering::Relaxed);
        m.process_skips
            .fetch_add(chunk.process_skips, Ordering::Relaxed);
        m.write_skips.fetch_add(chunk.write_skips, Ordering::Relaxed);
        m.retries.fetch_add(chunk.retry_count, Ordering::Relaxed);
        if committed {
            m.chunks_committed.fetch_add(1, Ordering::Relaxed);
        } else {
            m.chunks_aborted.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> RunStats {
        let m = &self.inner;
        RunStats {
            rows_read: m.rows_read.load(Ordering::Relaxed),
            documents_processed: m.documents_processed.load(Ordering::Relaxed),
            documents_written: m.documents_written.load(Ordering::Relaxed),
            process_skips: m.process_skips.load(Ordering::Relaxed),
            write_skips: m.write_skips.load(Ordering::Relaxed),
            retries: m.retries.load(Ordering::Relaxed),
            chunks_committed: m.chunks_committed.load(Ordering::Relaxed),
            chunks_aborted: m.chunks_aborted.load(Ordering::Relaxed),
        }
    }
}

impl Default for RunMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn concurrent_chunks_accumulate() {
        let metrics = RunMetrics::new();
        let mut handles = Vec::new();
        for sequence in 0..8 {
            let metrics = metrics.clone();
            handles.push(tokio::spawn(async move {
                let chunk = ChunkSummary {
                    sequence,
                    read_count: 100,
                    processed_count: 100,
                    written_count: 99,
                    write_skips: 1,
                    ..Default::default()
                };
                metrics.record_chunk(&chunk, true);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let stats = metrics.snapshot();
        assert_eq!(stats.rows_read, 800);
        assert_eq!(stats.documents_written, 792);
        assert_eq!(stats.write_skips, 8);
        assert_eq!(stats.chunks_committed, 8);
    }
}
