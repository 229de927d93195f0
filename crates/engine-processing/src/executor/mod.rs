use crate::{
    error::ProcessingError, fault::FaultBudget, transform::Transform, writer::WriterChain,
};
use chrono::{DateTime, Utc};
use chunk::ChunkContext;
use connectors::reader::RowReader;
use engine_core::{event_bus::EventBus, metrics::RunMetrics, retry::RetryPolicy};
use model::{
    events::RunEvent,
    execution::{
        job::{JobSpec, Tunables},
        run::{RunReport, RunStats, RunStatus},
    },
    records::chunk::{ChunkResult, ChunkSummary, SkippedItem},
};
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::Semaphore,
    task::{JoinError, JoinSet},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

mod chunk;

/// Everything a run needs besides its row source.
pub struct ExecutorParams {
    pub run_id: String,
    pub job: JobSpec,
    pub transformer: Arc<dyn Transform>,
    pub writers: WriterChain,
    pub bus: EventBus,
    pub cancel: CancellationToken,
}

/// Terminal report plus per-chunk detail, chunks in extraction order.
#[derive(Debug)]
pub struct ExecutionOutcome {
    pub report: RunReport,
    pub chunks: Vec<ChunkSummary>,
    pub skipped: Vec<SkippedItem>,
}

/// Drives a run: pulls chunks from the reader and hands each to a worker, with at
/// most `throttle_limit` chunks in flight and one job-wide skip budget.
pub struct ChunkExecutor {
    run_id: String,
    job_name: String,
    tunables: Tunables,
    transformer: Arc<dyn Transform>,
    writers: WriterChain,
    bus: EventBus,
    cancel: CancellationToken,
    metrics: RunMetrics,
}

impl ChunkExecutor {
    pub fn new(params: ExecutorParams) -> Self {
        Self {
            run_id: params.run_id,
            job_name: params.job.name,
            tunables: params.job.tunables,
            transformer: params.transformer,
            writers: params.writers,
            bus: params.bus,
            cancel: params.cancel,
            metrics: RunMetrics::new(),
        }
    }

    pub fn metrics(&self) -> &RunMetrics {
        &self.metrics
    }

    pub async fn execute(self, reader: &mut dyn RowReader) -> ExecutionOutcome {
        let started_at = Utc::now();
        let chunk_size = self.tunables.chunk_size.max(1);
        let throttle = self.tunables.throttle_limit.max(1);

        info!(
            job = %self.job_name,
            run_id = %self.run_id,
            chunk_size,
            throttle,
            skip_limit = self.tunables.skip_limit,
            retry_limit = self.tunables.retry_limit,
            "Run started"
        );
        self.bus
            .publish(RunEvent::RunStarted {
                run_id: self.run_id.clone(),
                job_name: self.job_name.clone(),
                timestamp: started_at,
            })
            .await;

        let ctx = Arc::new(ChunkContext {
            run_id: self.run_id.clone(),
            job_name: self.job_name.clone(),
            transformer: Arc::clone(&self.transformer),
            writers: self.writers.clone(),
            retry: RetryPolicy::from_retry_limit(
                self.tunables.retry_limit,
                Duration::from_millis(self.tunables.retry_backoff_ms),
            ),
            budget: FaultBudget::new(self.tunables.skip_limit),
            bus: self.bus.clone(),
            metrics: self.metrics.clone(),
        });

        let slots = Arc::new(Semaphore::new(throttle));
        let mut workers: JoinSet<ChunkResult> = JoinSet::new();
        let mut results = Vec::new();
        let mut failure: Option<ProcessingError> = None;
        let mut stopped = false;
        let mut sequence = 0u64;

        loop {
            // A slot frees up when a worker finishes; only then is the next chunk read.
            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    stopped = true;
                    break;
                }
                permit = Arc::clone(&slots).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            while let Some(joined) = workers.try_join_next() {
                collect(joined, &mut results, &mut failure);
            }
            if ctx.budget.is_exhausted() || failure.is_some() {
                break;
            }

            let rows = match reader.read_chunk(chunk_size).await {
                Ok(rows) => rows,
                Err(err) => {
                    error!(job = %self.job_name, run_id = %self.run_id, error = %err, "Extraction failed");
                    failure = Some(err.into());
                    break;
                }
            };
            if rows.is_empty() {
                break;
            }

            // A worker may have breached the budget while the read was pending.
            while let Some(joined) = workers.try_join_next() {
                collect(joined, &mut results, &mut failure);
            }
            if ctx.budget.is_exhausted() || failure.is_some() {
                debug!(
                    job = %self.job_name,
                    run_id = %self.run_id,
                    rows = rows.len(),
                    "Dropping chunk read after the run failed"
                );
                break;
            }

            let drained = rows.len() < chunk_size;
            let worker_ctx = Arc::clone(&ctx);
            let chunk_sequence = sequence;
            sequence += 1;
            workers.spawn(async move {
                let result = chunk::process_chunk(&worker_ctx, chunk_sequence, rows).await;
                drop(permit);
                result
            });

            if drained {
                break;
            }
        }

        while let Some(joined) = workers.join_next().await {
            collect(joined, &mut results, &mut failure);
        }

        let (status, error) = if let Some(breach) = ctx.budget.breach() {
            (
                RunStatus::Failed,
                Some(ProcessingError::from(breach.clone()).to_string()),
            )
        } else if let Some(err) = failure {
            (RunStatus::Failed, Some(err.to_string()))
        } else if stopped {
            (RunStatus::Stopped, None)
        } else {
            (RunStatus::Completed, None)
        };

        let report = RunReport {
            run_id: self.run_id.clone(),
            job_name: self.job_name.clone(),
            status,
            stats: self.metrics.snapshot(),
            started_at,
            ended_at: Utc::now(),
            error,
        };

        match report.status {
            RunStatus::Completed => info!(
                job = %report.job_name,
                run_id = %report.run_id,
                rows = report.stats.rows_read,
                written = report.stats.documents_written,
                skipped = report.stats.skipped(),
                chunks = report.stats.chunks(),
                duration_ms = report.duration_ms(),
                "Run completed"
            ),
            RunStatus::Stopped => warn!(
                job = %report.job_name,
                run_id = %report.run_id,
                chunks = report.stats.chunks(),
                "Run stopped"
            ),
            _ => error!(
                job = %report.job_name,
                run_id = %report.run_id,
                error = report.error.as_deref().unwrap_or_default(),
                "Run failed"
            ),
        }

        self.bus
            .publish(RunEvent::RunTerminal {
                report: report.clone(),
            })
            .await;

        results.sort_by_key(|r| r.sequence);
        let chunks = results.iter().map(ChunkResult::summary).collect();
        let skipped = results.into_iter().flat_map(|r| r.skipped).collect();

        ExecutionOutcome {
            report,
            chunks,
            skipped,
        }
    }
}

fn collect(
    joined: Result<ChunkResult, JoinError>,
    results: &mut Vec<ChunkResult>,
    failure: &mut Option<ProcessingError>,
) {
    match joined {
        Ok(result) => results.push(result),
        Err(err) => {
            error!(error = %err, "Chunk worker failed");
            if failure.is_none() {
                *failure = Some(err.into());
            }
        }
    }
}

/// Reports a run that failed before its first chunk, e.g. when the source
/// cursor could not be opened, so listeners still see a start and an end.
pub async fn publish_failed_run(
    bus: &EventBus,
    run_id: &str,
    job_name: &str,
    started_at: DateTime<Utc>,
    error: String,
) -> RunReport {
    bus.publish(RunEvent::RunStarted {
        run_id: run_id.to_string(),
        job_name: job_name.to_string(),
        timestamp: started_at,
    })
    .await;

    error!(job = %job_name, run_id = %run_id, error = %error, "Run failed before the first chunk");

    let report = RunReport {
        run_id: run_id.to_string(),
        job_name: job_name.to_string(),
        status: RunStatus::Failed,
        stats: RunStats::default(),
        started_at,
        ended_at: Utc::now(),
        error: Some(error),
    };
    bus.publish(RunEvent::RunTerminal {
        report: report.clone(),
    })
    .await;
    report
}
