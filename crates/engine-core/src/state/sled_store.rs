use crate::{
    error::StateStoreError,
    state::{RunStore, models::RunRecord},
};
use async_trait::async_trait;
use chrono::Utc;
use model::{
    execution::run::{RunReport, RunStatus},
    records::chunk::ChunkSummary,
};
use sled::transaction::{ConflictableTransactionError, TransactionError};
use std::{cell::Cell, path::Path};

pub struct SledRunStore {
    db: sled::Db,
}

impl SledRunStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StateStoreError> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    #[inline]
    fn run_key(job_name: &str, run_id: &str) -> String {
        format!("run:{}:{}", job_name, run_id)
    }

    /// Atomic read-modify-write of one record. `update` returns false to leave it untouched.
    fn update<F>(&self, key: &str, update: F) -> Result<(), StateStoreError>
    where
        F: Fn(Option<RunRecord>) -> Option<RunRecord>,
    {
        let result = self.db.transaction::<_, _, StateStoreError>(|tx_db| {
            let existing = match tx_db.get(key)? {
                Some(bytes) => Some(
                    bincode::deserialize::<RunRecord>(&bytes)
                        .map_err(|e| ConflictableTransactionError::Abort(e.into()))?,
                ),
                None => None,
            };

            if let Some(next) = update(existing) {
                let bytes = bincode::serialize(&next)
                    .map_err(|e| ConflictableTransactionError::Abort(e.into()))?;
                tx_db.insert(key, bytes)?;
            }
            Ok(())
        });

        match result {
            Ok(()) => Ok(()),
            Err(TransactionError::Abort(e)) => Err(e),
            Err(TransactionError::Storage(e)) => Err(e.into()),
        }
    }
}

#[async_trait]
impl RunStore for SledRunStore {
    async fn record_run_start(&self, record: &RunRecord) -> Result<(), StateStoreError> {
        let key = Self::run_key(&record.job_name, &record.run_id);
        self.db.insert(key, bincode::serialize(record)?)?;
        self.db.flush_async().await?;
        Ok(())
    }

    async fn record_run_progress(
        &self,
        job_name: &str,
        run_id: &str,
        chunk: &ChunkSummary,
        committed: bool,
    ) -> Result<(), StateStoreError> {
        let key = Self::run_key(job_name, run_id);
        let missing = Cell::new(false);

        self.update(&key, |existing| {
            let Some(mut record) = existing else {
                missing.set(true);
                return None;
            };
            // Late progress never reopens a finished run.
            if record.status.is_terminal() {
                return None;
            }
            record.status = RunStatus::Running;
            record.stats.record_chunk(chunk, committed);
            record.updated_at = Utc::now();
            Some(record)
        })?;

        if missing.get() {
            return Err(StateStoreError::UnknownRun {
                job_name: job_name.to_string(),
                run_id: run_id.to_string(),
            });
        }
        Ok(())
    }

    async fn record_run_end(&self, report: &RunReport) -> Result<(), StateStoreError> {
        let key = Self::run_key(&report.job_name, &report.run_id);
        self.update(&key, |existing| {
            Some(match existing {
                Some(mut record) => {
                    record.apply_report(report);
                    record
                }
                None => RunRecord::from_report(report),
            })
        })?;
        self.db.flush_async().await?;
        Ok(())
    }

    async fn run(&self, job_name: &str, run_id: &str) -> Result<Option<RunRecord>, StateStoreError> {
        match self.db.get(Self::run_key(job_name, run_id))? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn runs_for_job(
        &self,
        job_name: &str,
        limit: usize,
    ) -> Result<Vec<RunRecord>, StateStoreError> {
        let prefix = format!("run:{}:", job_name);
        let mut records = Vec::new();

        for item in self.db.scan_prefix(prefix) {
            let (_key, value) = item?;
            records.push(bincode::deserialize::<RunRecord>(&value)?);
        }

        records.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        records.truncate(limit);
        Ok(records)
    }
}
