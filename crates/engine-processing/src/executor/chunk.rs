use crate::{
    error::LimitExceeded,
    fault::FaultBudget,
    retry::{classify_chain_error, classify_transform_error},
    transform::Transform,
    writer::WriterChain,
};
use engine_core::{event_bus::EventBus, metrics::RunMetrics, retry::RetryPolicy};
use model::{
    events::RunEvent,
    records::{
        chunk::{ChunkResult, ChunkState, FailedItem, ItemPhase, SkippedItem},
        document::MigrationDocument,
        row::SourceRow,
    },
};
use std::{sync::Arc, time::Instant};
use tracing::{info, warn};

/// State shared by every chunk worker of one run.
pub(crate) struct ChunkContext {
    pub run_id: String,
    pub job_name: String,
    pub transformer: Arc<dyn Transform>,
    pub writers: WriterChain,
    pub retry: RetryPolicy,
    pub budget: FaultBudget,
    pub bus: EventBus,
    pub metrics: RunMetrics,
}

impl ChunkContext {
    fn skip(
        &self,
        result: &mut ChunkResult,
        item: FailedItem,
        phase: ItemPhase,
        error: String,
    ) -> Result<(), LimitExceeded> {
        warn!(
            job = %self.job_name,
            run_id = %self.run_id,
            chunk = result.sequence,
            phase = ?phase,
            error = %error,
            "Skipping item"
        );
        let admitted = self.budget.try_skip(&error);
        result.skipped.push(SkippedItem { item, phase, error });
        admitted
    }
}

/// Runs one chunk to a terminal state and reports it on the bus.
pub(crate) async fn process_chunk(
    ctx: &ChunkContext,
    sequence: u64,
    rows: Vec<SourceRow>,
) -> ChunkResult {
    let started = Instant::now();
    let mut result = ChunkResult::new(sequence, rows.len());

    // Another worker may have exhausted the budget while this chunk was being read.
    let outcome = match ctx.budget.check() {
        Ok(()) => {
            ctx.bus
                .publish(RunEvent::ChunkStarted {
                    run_id: ctx.run_id.clone(),
                    job_name: ctx.job_name.clone(),
                    sequence,
                    rows: rows.len() as u64,
                })
                .await;
            run_chunk(ctx, rows, &mut result).await
        }
        Err(breach) => Err(breach),
    };
    result.elapsed = started.elapsed();

    match outcome {
        Ok(()) => {
            result.state = ChunkState::Committed;
            let summary = result.summary();
            ctx.metrics.record_chunk(&summary, true);

            info!(
                job = %ctx.job_name,
                run_id = %ctx.run_id,
                chunk = sequence,
                rows = summary.read_count,
                written = summary.written_count,
                skipped = summary.skipped(),
                retries = summary.retry_count,
                duration_ms = summary.elapsed_ms,
                "Chunk committed"
            );

            ctx.bus
                .publish(RunEvent::ChunkCommitted {
                    run_id: ctx.run_id.clone(),
                    job_name: ctx.job_name.clone(),
                    summary,
                })
                .await;
        }
        Err(breach) => {
            result.state = ChunkState::Aborted;
            let summary = result.summary();
            ctx.metrics.record_chunk(&summary, false);

            warn!(
                job = %ctx.job_name,
                run_id = %ctx.run_id,
                chunk = sequence,
                written = summary.written_count,
                skipped = summary.skipped(),
                error = %breach,
                "Chunk aborted"
            );

            ctx.bus
                .publish(RunEvent::ChunkAborted {
                    run_id: ctx.run_id.clone(),
                    job_name: ctx.job_name.clone(),
                    summary,
                    error: breach.to_string(),
                })
                .await;
        }
    }

    result
}

async fn run_chunk(
    ctx: &ChunkContext,
    rows: Vec<SourceRow>,
    result: &mut ChunkResult,
) -> Result<(), LimitExceeded> {
    result.state = ChunkState::Processing;

    let transformer = ctx.transformer.as_ref();
    let mut documents = Vec::with_capacity(rows.len());
    for row in rows {
        let source = &row;
        let outcome = ctx
            .retry
            .run(
                move || async move { transformer.transform(source) },
                classify_transform_error,
            )
            .await;
        result.retry_count += outcome.retries;

        match outcome.result {
            Ok(document) => documents.push(document),
            Err(err) => {
                let error = err.into_inner().to_string();
                ctx.skip(result, FailedItem::Row(row), ItemPhase::Process, error)?;
            }
        }
    }
    result.processed_count = documents.len();

    if documents.is_empty() {
        return Ok(());
    }

    result.state = ChunkState::Writing;
    let writers = &ctx.writers;
    let batch = documents.as_slice();
    let outcome = ctx
        .retry
        .run(move || writers.write(batch), classify_chain_error)
        .await;
    result.retry_count += outcome.retries;

    match outcome.result {
        Ok(()) => {
            result.written_count = documents.len();
            Ok(())
        }
        Err(err) => {
            warn!(
                job = %ctx.job_name,
                run_id = %ctx.run_id,
                chunk = result.sequence,
                error = %err.inner(),
                "Chunk write failed, writing documents one at a time"
            );
            scan(ctx, documents, result).await
        }
    }
}

/// Writes each document on its own so one bad document cannot sink the chunk.
async fn scan(
    ctx: &ChunkContext,
    documents: Vec<MigrationDocument>,
    result: &mut ChunkResult,
) -> Result<(), LimitExceeded> {
    let writers = &ctx.writers;
    for document in documents {
        let single = std::slice::from_ref(&document);
        let outcome = ctx
            .retry
            .run(move || writers.write(single), classify_chain_error)
            .await;
        result.retry_count += outcome.retries;

        match outcome.result {
            Ok(()) => result.written_count += 1,
            Err(err) => {
                let error = err.into_inner().to_string();
                ctx.skip(result, FailedItem::Document(document), ItemPhase::Write, error)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransformError;
    use model::{
        core::value::{FieldValue, Value},
        records::document::MigrationDocument,
    };
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    #[derive(Default)]
    struct Counting {
        calls: AtomicUsize,
    }

    impl Transform for Counting {
        fn transform(&self, row: &SourceRow) -> Result<MigrationDocument, TransformError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(MigrationDocument::new("1".into(), &row.table, Default::default()))
        }
    }

    fn context(transformer: Arc<Counting>, skip_limit: u64) -> ChunkContext {
        ChunkContext {
            run_id: "run-1".into(),
            job_name: "orders".into(),
            transformer,
            writers: WriterChain::default(),
            retry: RetryPolicy::from_retry_limit(0, Duration::from_millis(1)),
            budget: FaultBudget::new(skip_limit),
            bus: EventBus::new(),
            metrics: RunMetrics::new(),
        }
    }

    fn rows(count: usize) -> Vec<SourceRow> {
        (0..count)
            .map(|i| SourceRow::new("ORDERS", vec![FieldValue::new("ID", Value::Int(i as i64))]))
            .collect()
    }

    #[tokio::test]
    async fn chunk_aborts_without_work_once_the_budget_is_gone() {
        let transformer = Arc::new(Counting::default());
        let ctx = context(Arc::clone(&transformer), 0);
        let _ = ctx.budget.try_skip("earlier chunk");

        let result = process_chunk(&ctx, 4, rows(3)).await;

        assert_eq!(result.state, ChunkState::Aborted);
        assert_eq!(result.written_count, 0);
        assert_eq!(transformer.calls.load(Ordering::SeqCst), 0);
        assert_eq!(ctx.metrics.snapshot().chunks_aborted, 1);
    }

    #[tokio::test]
    async fn chunk_runs_while_budget_remains() {
        let transformer = Arc::new(Counting::default());
        let ctx = context(Arc::clone(&transformer), 0);

        let result = process_chunk(&ctx, 0, rows(3)).await;

        assert_eq!(result.state, ChunkState::Committed);
        assert_eq!(result.processed_count, 3);
        assert_eq!(transformer.calls.load(Ordering::SeqCst), 3);
    }
}
