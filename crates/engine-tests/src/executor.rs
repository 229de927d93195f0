#[cfg(test)]
mod tests {
    use crate::{
        fakes::{CollectingListener, FlakyTransform, RecordingWriter, VecRowReader},
        utils::{job, order_rows, with_archive},
    };
    use connectors::writer::DocumentWriter;
    use engine_core::event_bus::{
        EventBus,
        listener::{AttachedListener, RunListener},
    };
    use engine_processing::{
        executor::{ChunkExecutor, ExecutionOutcome, ExecutorParams},
        transform::{RecordTransformer, Transform},
        writer::WriterChain,
    };
    use engine_runtime::factory::writer_chain;
    use model::{
        events::RunEvent,
        execution::{job::JobSpec, run::RunStatus},
        records::{
            chunk::{FailedItem, ItemPhase},
            row::SourceRow,
        },
    };
    use serde_json::json;
    use std::{sync::Arc, time::Duration};
    use tokio_util::sync::CancellationToken;
    use tracing_test::traced_test;

    fn executor(
        job: &JobSpec,
        writers: WriterChain,
        bus: EventBus,
        cancel: CancellationToken,
    ) -> ChunkExecutor {
        executor_with(job, Arc::new(RecordTransformer::from_job(job)), writers, bus, cancel)
    }

    fn executor_with(
        job: &JobSpec,
        transformer: Arc<dyn Transform>,
        writers: WriterChain,
        bus: EventBus,
        cancel: CancellationToken,
    ) -> ChunkExecutor {
        ChunkExecutor::new(ExecutorParams {
            run_id: "run-1".into(),
            job: job.clone(),
            transformer,
            writers,
            bus,
            cancel,
        })
    }

    async fn run(job: &JobSpec, rows: Vec<SourceRow>, upsert: &RecordingWriter) -> ExecutionOutcome {
        let writers = WriterChain::default().with_writer(Arc::new(upsert.clone()));
        let mut reader = VecRowReader::new(rows);
        executor(job, writers, EventBus::new(), CancellationToken::new())
            .execute(&mut reader)
            .await
    }

    fn read_counts(outcome: &ExecutionOutcome) -> Vec<u64> {
        outcome.chunks.iter().map(|c| c.read_count).collect()
    }

    #[traced_test]
    #[tokio::test]
    async fn skippable_failures_within_budget_complete_the_run() {
        let job = job("orders", 1000, 10, 4);
        let upsert = RecordingWriter::new("upsert");

        let outcome = run(&job, order_rows(2500, &[10, 1500, 2499]), &upsert).await;
        let report = &outcome.report;

        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(report.stats.rows_read, 2500);
        assert_eq!(report.stats.documents_written, 2497);
        assert_eq!(report.stats.process_skips, 3);
        assert_eq!(report.stats.chunks_committed, 3);
        assert_eq!(read_counts(&outcome), vec![1000, 1000, 500]);
        assert_eq!(upsert.documents().len(), 2497);

        assert_eq!(outcome.skipped.len(), 3);
        assert!(outcome.skipped.iter().all(|s| s.phase == ItemPhase::Process));
        assert!(outcome.skipped.iter().all(|s| matches!(s.item, FailedItem::Row(_))));
    }

    #[tokio::test]
    async fn chunk_count_is_rows_over_chunk_size_rounded_up() {
        let upsert = RecordingWriter::new("upsert");

        let outcome = run(&job("orders", 3, 10, 2), order_rows(10, &[]), &upsert).await;
        assert_eq!(read_counts(&outcome), vec![3, 3, 3, 1]);

        let outcome = run(&job("orders", 3, 10, 2), order_rows(9, &[]), &upsert).await;
        assert_eq!(read_counts(&outcome), vec![3, 3, 3]);

        let outcome = run(&job("orders", 3, 10, 2), Vec::new(), &upsert).await;
        assert!(outcome.chunks.is_empty());
        assert_eq!(outcome.report.status, RunStatus::Completed);
    }

    #[tokio::test]
    async fn exceeding_the_skip_limit_fails_the_run_and_stops_dispatch() {
        let job = job("orders", 1000, 2, 1);
        let upsert = RecordingWriter::new("upsert");

        let outcome = run(&job, order_rows(3000, &[1001, 1002, 1003]), &upsert).await;
        let report = &outcome.report;

        assert_eq!(report.status, RunStatus::Failed);
        assert!(report.error.as_deref().unwrap_or_default().contains("Skip limit of 2"));
        assert_eq!(report.stats.chunks_committed, 1);
        assert_eq!(report.stats.chunks_aborted, 1);
        // The third chunk was never read.
        assert_eq!(report.stats.rows_read, 2000);
        assert_eq!(read_counts(&outcome), vec![1000, 1000]);
        // Nothing from the aborted chunk reached the sink.
        assert_eq!(upsert.documents().len(), 1000);
        assert_eq!(upsert.call_count(), 1);
    }

    #[tokio::test]
    async fn breach_during_a_pending_read_starts_no_further_chunk() {
        let job = job("orders", 1, 0, 2);
        let upsert = RecordingWriter::new("upsert");
        let writers = WriterChain::default().with_writer(Arc::new(upsert.clone()));
        let mut reader =
            VecRowReader::new(order_rows(5, &[0])).with_read_delay(Duration::from_millis(50));

        let outcome = executor(&job, writers, EventBus::new(), CancellationToken::new())
            .execute(&mut reader)
            .await;
        let report = &outcome.report;

        assert_eq!(report.status, RunStatus::Failed);
        assert_eq!(report.stats.chunks_aborted, 1);
        assert_eq!(report.stats.chunks_committed, 0);
        assert_eq!(read_counts(&outcome), vec![1]);
        assert!(upsert.documents().is_empty());
        assert_eq!(upsert.call_count(), 0);
    }

    #[tokio::test]
    async fn single_slot_processes_chunks_in_extraction_order() {
        let job = job("orders", 10, 0, 1);
        let upsert = RecordingWriter::new("upsert").with_delay(Duration::from_millis(5));

        let outcome = run(&job, order_rows(50, &[]), &upsert).await;

        assert_eq!(outcome.report.status, RunStatus::Completed);
        assert_eq!(upsert.max_in_flight(), 1);
        let firsts: Vec<String> = upsert.batches().iter().map(|b| b[0].clone()).collect();
        assert_eq!(firsts, vec!["0", "10", "20", "30", "40"]);
    }

    #[tokio::test]
    async fn parallel_chunks_are_bounded_and_keep_row_order() {
        let job = job("orders", 10, 0, 4);
        let upsert = RecordingWriter::new("upsert").with_delay(Duration::from_millis(20));

        let outcome = run(&job, order_rows(80, &[]), &upsert).await;

        assert_eq!(outcome.report.status, RunStatus::Completed);
        assert_eq!(upsert.max_in_flight(), 4);
        for batch in upsert.batches() {
            let ids: Vec<u64> = batch.iter().map(|id| id.parse().unwrap()).collect();
            assert!(ids.windows(2).all(|w| w[1] == w[0] + 1), "batch out of order: {ids:?}");
        }
        assert_eq!(upsert.documents().len(), 80);
    }

    #[tokio::test]
    async fn transient_write_failures_are_retried() {
        let job = job("orders", 100, 0, 1);
        let upsert = RecordingWriter::new("upsert").fail_transiently(2);

        let outcome = run(&job, order_rows(100, &[]), &upsert).await;

        assert_eq!(outcome.report.status, RunStatus::Completed);
        assert_eq!(outcome.report.stats.retries, 2);
        assert_eq!(outcome.report.stats.documents_written, 100);
        assert_eq!(upsert.call_count(), 3);
    }

    #[tokio::test]
    async fn transient_transform_failures_are_retried_per_item() {
        let job = job("orders", 5, 0, 1);
        let upsert = RecordingWriter::new("upsert");
        let transform = Arc::new(FlakyTransform::new(RecordTransformer::from_job(&job), 1));
        let writers = WriterChain::default().with_writer(Arc::new(upsert.clone()));

        let mut reader = VecRowReader::new(order_rows(5, &[]));
        let outcome = executor_with(&job, transform, writers, EventBus::new(), CancellationToken::new())
            .execute(&mut reader)
            .await;

        assert_eq!(outcome.report.status, RunStatus::Completed);
        assert_eq!(outcome.report.stats.retries, 5);
        assert_eq!(upsert.documents().len(), 5);
    }

    #[tokio::test]
    async fn rejected_document_is_isolated_by_item_writes() {
        let job = job("orders", 10, 5, 1);
        let upsert = RecordingWriter::new("upsert").reject_id("4");

        let outcome = run(&job, order_rows(10, &[]), &upsert).await;

        assert_eq!(outcome.report.status, RunStatus::Completed);
        assert_eq!(outcome.report.stats.write_skips, 1);
        assert_eq!(outcome.report.stats.documents_written, 9);
        assert!(upsert.document("4").is_none());
        // One failed chunk write, then one write per document.
        assert_eq!(upsert.call_count(), 11);

        let skipped = &outcome.skipped[0];
        assert_eq!(skipped.phase, ItemPhase::Write);
        assert!(matches!(&skipped.item, FailedItem::Document(doc) if doc.id == "4"));
        assert!(skipped.error.contains("Writer 'upsert' failed"));
    }

    #[tokio::test]
    async fn rerunning_the_same_rows_upserts_in_place() {
        let job = job("orders", 100, 0, 2);
        let upsert = RecordingWriter::new("upsert");

        run(&job, order_rows(250, &[]), &upsert).await;
        let first = upsert.documents();
        run(&job, order_rows(250, &[]), &upsert).await;
        let second = upsert.documents();

        assert_eq!(first.len(), 250);
        assert_eq!(second.len(), 250);
        assert_eq!(
            first.keys().collect::<Vec<_>>(),
            second.keys().collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn documents_carry_recovered_payload_and_metadata() {
        let job = job("orders", 10, 0, 1);
        let upsert = RecordingWriter::new("upsert");

        run(&job, order_rows(3, &[]), &upsert).await;

        let doc = upsert.document("2").unwrap();
        assert_eq!(doc.source_table, "ORDERS");
        assert_eq!(doc.status, "MIGRATED");
        assert_eq!(doc.version, "1.0");
        assert_eq!(doc.data["ORDER_ID"], json!(2));
        assert_eq!(doc.data["PAYLOAD"], json!({"lines": [{"sku": "A2", "qty": 3}]}));
        assert_eq!(doc.data["CUSTOMER"], json!("customer-2"));
    }

    #[tokio::test]
    async fn disabled_archive_is_never_invoked() {
        let upsert = RecordingWriter::new("upsert");
        let archive = RecordingWriter::new("archive");

        for (enabled, expected_archive_calls) in [(false, 0), (true, 2)] {
            let job = with_archive(job("orders", 10, 0, 1), enabled);
            let writers = writer_chain(
                &job,
                Arc::new(upsert.clone()),
                Some(Arc::new(archive.clone()) as Arc<dyn DocumentWriter>),
            );
            let mut reader = VecRowReader::new(order_rows(20, &[]));

            let outcome = executor(&job, writers, EventBus::new(), CancellationToken::new())
                .execute(&mut reader)
                .await;

            assert_eq!(outcome.report.status, RunStatus::Completed);
            assert_eq!(archive.call_count(), expected_archive_calls);
        }
    }

    #[tokio::test]
    async fn extraction_failure_fails_the_run_after_in_flight_chunks() {
        let job = job("orders", 1000, 0, 2);
        let upsert = RecordingWriter::new("upsert");
        let writers = WriterChain::default().with_writer(Arc::new(upsert.clone()));
        let mut reader = VecRowReader::new(order_rows(3000, &[])).failing_after(1500);

        let outcome = executor(&job, writers, EventBus::new(), CancellationToken::new())
            .execute(&mut reader)
            .await;

        assert_eq!(outcome.report.status, RunStatus::Failed);
        assert!(outcome.report.error.as_deref().unwrap_or_default().contains("Extraction failed"));
        assert_eq!(outcome.report.stats.chunks_committed, 1);
        assert_eq!(upsert.documents().len(), 1000);
    }

    #[tokio::test]
    async fn cancellation_before_start_stops_without_chunks() {
        let job = job("orders", 10, 0, 1);
        let upsert = RecordingWriter::new("upsert");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let writers = WriterChain::default().with_writer(Arc::new(upsert.clone()));
        let mut reader = VecRowReader::new(order_rows(100, &[]));
        let outcome = executor(&job, writers, EventBus::new(), cancel)
            .execute(&mut reader)
            .await;

        assert_eq!(outcome.report.status, RunStatus::Stopped);
        assert!(outcome.chunks.is_empty());
        assert_eq!(upsert.call_count(), 0);
    }

    #[tokio::test]
    async fn cancellation_lets_in_flight_chunks_commit() {
        let job = job("orders", 10, 0, 1);
        let upsert = RecordingWriter::new("upsert").with_delay(Duration::from_millis(200));
        let cancel = CancellationToken::new();

        let canceller = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                cancel.cancel();
            })
        };

        let writers = WriterChain::default().with_writer(Arc::new(upsert.clone()));
        let mut reader = VecRowReader::new(order_rows(100, &[]));
        let outcome = executor(&job, writers, EventBus::new(), cancel)
            .execute(&mut reader)
            .await;
        canceller.await.unwrap();

        assert_eq!(outcome.report.status, RunStatus::Stopped);
        assert_eq!(outcome.report.stats.chunks_committed, 1);
        assert_eq!(upsert.documents().len(), 10);
    }

    #[tokio::test]
    async fn events_bracket_the_run() {
        let job = job("orders", 10, 0, 2);
        let upsert = RecordingWriter::new("upsert");
        let bus = EventBus::new();
        let listener = Arc::new(CollectingListener::default());
        let attached =
            AttachedListener::attach(&bus, listener.clone() as Arc<dyn RunListener>, 8).await;

        let writers = WriterChain::default().with_writer(Arc::new(upsert.clone()));
        let mut reader = VecRowReader::new(order_rows(30, &[]));
        executor(&job, writers, bus.clone(), CancellationToken::new())
            .execute(&mut reader)
            .await;
        attached.detach(&bus).await;

        let types = listener.event_types();
        assert_eq!(types.first(), Some(&"run.started"));
        assert_eq!(types.last(), Some(&"run.terminal"));
        assert_eq!(types.iter().filter(|t| **t == "chunk.started").count(), 3);
        assert_eq!(types.iter().filter(|t| **t == "chunk.committed").count(), 3);

        let Some(RunEvent::RunTerminal { report }) = listener.events().pop() else {
            panic!("last event must be terminal");
        };
        assert_eq!(report.stats.documents_written, 30);
    }
}
