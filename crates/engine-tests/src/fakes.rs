//! In-memory stand-ins for the source, the sinks and the run history.

use async_trait::async_trait;
use connectors::{
    error::{ExtractionError, WriteError},
    reader::RowReader,
    writer::DocumentWriter,
};
use engine_core::{
    error::StateStoreError,
    event_bus::listener::RunListener,
    state::{RunStore, models::RunRecord},
};
use engine_processing::{
    transform::{RecordTransformer, Transform},
    writer::WriterChain,
};
use engine_runtime::{
    error::MigrationError,
    factory::{PipelineFactory, writer_chain},
};
use model::{
    events::RunEvent,
    execution::{job::JobSpec, run::RunReport, run::RunStatus},
    records::{chunk::ChunkSummary, document::MigrationDocument, row::SourceRow},
};
use std::{
    collections::{BTreeMap, HashMap, HashSet, VecDeque},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

/// Serves rows from memory, optionally failing once `fail_after` rows were handed out.
pub struct VecRowReader {
    rows: VecDeque<SourceRow>,
    served: usize,
    fail_after: Option<usize>,
    read_delay: Option<Duration>,
}

impl VecRowReader {
    pub fn new(rows: Vec<SourceRow>) -> Self {
        Self {
            rows: rows.into(),
            served: 0,
            fail_after: None,
            read_delay: None,
        }
    }

    pub fn failing_after(mut self, rows: usize) -> Self {
        self.fail_after = Some(rows);
        self
    }

    /// Sleeps before every row, like a slow cursor.
    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = Some(delay);
        self
    }
}

#[async_trait]
impl RowReader for VecRowReader {
    async fn read(&mut self) -> Result<Option<SourceRow>, ExtractionError> {
        if let Some(delay) = self.read_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_after.is_some_and(|limit| self.served >= limit) {
            return Err(ExtractionError::Other("source connection reset".into()));
        }
        let row = self.rows.pop_front();
        if row.is_some() {
            self.served += 1;
        }
        Ok(row)
    }
}

#[derive(Default)]
struct WriterState {
    documents: Mutex<BTreeMap<String, MigrationDocument>>,
    batches: Mutex<Vec<Vec<String>>>,
    rejected_ids: Mutex<HashSet<String>>,
    transient_failures: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    delay: Mutex<Option<Duration>>,
}

/// Upserting sink that records every batch it receives. Clones share state.
#[derive(Clone)]
pub struct RecordingWriter {
    name: String,
    state: Arc<WriterState>,
}

impl RecordingWriter {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: Arc::new(WriterState::default()),
        }
    }

    /// Any batch containing this id is refused without retry.
    pub fn reject_id(self, id: &str) -> Self {
        self.state
            .rejected_ids
            .lock()
            .unwrap()
            .insert(id.to_string());
        self
    }

    /// The next `count` calls fail with a retryable error.
    pub fn fail_transiently(self, count: usize) -> Self {
        self.state.transient_failures.store(count, Ordering::SeqCst);
        self
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        *self.state.delay.lock().unwrap() = Some(delay);
        self
    }

    pub fn documents(&self) -> BTreeMap<String, MigrationDocument> {
        self.state.documents.lock().unwrap().clone()
    }

    pub fn document(&self, id: &str) -> Option<MigrationDocument> {
        self.state.documents.lock().unwrap().get(id).cloned()
    }

    /// Ids of every batch in arrival order, failed attempts included.
    pub fn batches(&self) -> Vec<Vec<String>> {
        self.state.batches.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.state.batches.lock().unwrap().len()
    }

    pub fn max_in_flight(&self) -> usize {
        self.state.max_in_flight.load(Ordering::SeqCst)
    }

    async fn write_inner(&self, documents: &[MigrationDocument]) -> Result<(), WriteError> {
        let ids: Vec<String> = documents.iter().map(|d| d.id.clone()).collect();
        self.state.batches.lock().unwrap().push(ids.clone());

        let delay = *self.state.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let transient = self
            .state
            .transient_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if transient {
            return Err(WriteError::Transient("connection pool exhausted".into()));
        }

        {
            let rejected = self.state.rejected_ids.lock().unwrap();
            if let Some(id) = ids.iter().find(|id| rejected.contains(*id)) {
                return Err(WriteError::Rejected(format!("document {id} violates a constraint")));
            }
        }

        let mut stored = self.state.documents.lock().unwrap();
        for document in documents {
            stored.insert(document.id.clone(), document.clone());
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentWriter for RecordingWriter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn write(&self, documents: &[MigrationDocument]) -> Result<(), WriteError> {
        let current = self.state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.max_in_flight.fetch_max(current, Ordering::SeqCst);

        let result = self.write_inner(documents).await;

        self.state.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Run history kept in a map, with an injectable failure on run start.
#[derive(Default)]
pub struct MemoryRunStore {
    runs: Mutex<HashMap<(String, String), RunRecord>>,
    fail_starts: AtomicBool,
}

impl MemoryRunStore {
    pub fn failing_starts() -> Self {
        let store = Self::default();
        store.fail_starts.store(true, Ordering::SeqCst);
        store
    }

    pub fn len(&self) -> usize {
        self.runs.lock().unwrap().len()
    }

    fn key(job_name: &str, run_id: &str) -> (String, String) {
        (job_name.to_string(), run_id.to_string())
    }
}

#[async_trait]
impl RunStore for MemoryRunStore {
    async fn record_run_start(&self, record: &RunRecord) -> Result<(), StateStoreError> {
        if self.fail_starts.load(Ordering::SeqCst) {
            return Err(StateStoreError::UnknownRun {
                job_name: record.job_name.clone(),
                run_id: record.run_id.clone(),
            });
        }
        self.runs
            .lock()
            .unwrap()
            .insert(Self::key(&record.job_name, &record.run_id), record.clone());
        Ok(())
    }

    async fn record_run_progress(
        &self,
        job_name: &str,
        run_id: &str,
        chunk: &ChunkSummary,
        committed: bool,
    ) -> Result<(), StateStoreError> {
        let mut runs = self.runs.lock().unwrap();
        let record = runs
            .get_mut(&Self::key(job_name, run_id))
            .ok_or_else(|| StateStoreError::UnknownRun {
                job_name: job_name.to_string(),
                run_id: run_id.to_string(),
            })?;
        if !record.status.is_terminal() {
            record.status = RunStatus::Running;
            record.stats.record_chunk(chunk, committed);
        }
        Ok(())
    }

    async fn record_run_end(&self, report: &RunReport) -> Result<(), StateStoreError> {
        let mut runs = self.runs.lock().unwrap();
        runs.entry(Self::key(&report.job_name, &report.run_id))
            .and_modify(|record| record.apply_report(report))
            .or_insert_with(|| RunRecord::from_report(report));
        Ok(())
    }

    async fn run(&self, job_name: &str, run_id: &str) -> Result<Option<RunRecord>, StateStoreError> {
        Ok(self
            .runs
            .lock()
            .unwrap()
            .get(&Self::key(job_name, run_id))
            .cloned())
    }

    async fn runs_for_job(
        &self,
        job_name: &str,
        limit: usize,
    ) -> Result<Vec<RunRecord>, StateStoreError> {
        let mut records: Vec<RunRecord> = self
            .runs
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.job_name == job_name)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        records.truncate(limit);
        Ok(records)
    }
}

/// Collects every event it sees, for ordering assertions.
#[derive(Default)]
pub struct CollectingListener {
    events: Mutex<Vec<RunEvent>>,
}

impl CollectingListener {
    pub fn events(&self) -> Vec<RunEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn event_types(&self) -> Vec<&'static str> {
        use model::events::Event;
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.event_type())
            .collect()
    }
}

#[async_trait]
impl RunListener for CollectingListener {
    async fn on_event(&self, event: &RunEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

/// Transformer that fails the first `failures` attempts of every row with a retryable error.
pub struct FlakyTransform {
    inner: RecordTransformer,
    failures: usize,
    attempts: Mutex<HashMap<String, usize>>,
}

impl FlakyTransform {
    pub fn new(inner: RecordTransformer, failures: usize) -> Self {
        Self {
            inner,
            failures,
            attempts: Mutex::new(HashMap::new()),
        }
    }
}

impl Transform for FlakyTransform {
    fn transform(
        &self,
        row: &SourceRow,
    ) -> Result<MigrationDocument, engine_processing::error::TransformError> {
        let document = self.inner.transform(row)?;
        let mut attempts = self.attempts.lock().unwrap();
        let seen = attempts.entry(document.id.clone()).or_insert(0);
        *seen += 1;
        if *seen <= self.failures {
            return Err(engine_processing::error::TransformError::Transient(
                "reference lookup timed out".into(),
            ));
        }
        Ok(document)
    }
}

/// Pipeline pieces served from memory. Every run reads a fresh copy of `rows`.
pub struct FakeFactory {
    rows: Vec<SourceRow>,
    pub upsert: RecordingWriter,
    pub archive: RecordingWriter,
    fail_open: AtomicBool,
    opened: AtomicUsize,
}

impl FakeFactory {
    pub fn new(rows: Vec<SourceRow>) -> Self {
        Self {
            rows,
            upsert: RecordingWriter::new("upsert"),
            archive: RecordingWriter::new("archive"),
            fail_open: AtomicBool::new(false),
            opened: AtomicUsize::new(0),
        }
    }

    pub fn with_upsert(mut self, upsert: RecordingWriter) -> Self {
        self.upsert = upsert;
        self
    }

    pub fn set_fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PipelineFactory for FakeFactory {
    async fn open_reader(&self, _job: &JobSpec) -> Result<Box<dyn RowReader>, MigrationError> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(MigrationError::Extraction(ExtractionError::Other(
                "relation \"sales.orders\" does not exist".into(),
            )));
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(VecRowReader::new(self.rows.clone())))
    }

    async fn writers(&self, job: &JobSpec) -> Result<WriterChain, MigrationError> {
        Ok(writer_chain(
            job,
            Arc::new(self.upsert.clone()),
            Some(Arc::new(self.archive.clone())),
        ))
    }
}
