use crate::records::{document::MigrationDocument, row::SourceRow};
use serde::{Deserialize, Serialize};
use std::{fmt, time::Duration};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChunkState {
    Pending,
    Reading,
    Processing,
    Writing,
    Committed,
    Aborted,
}

impl ChunkState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ChunkState::Committed | ChunkState::Aborted)
    }
}

impl fmt::Display for ChunkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChunkState::Pending => "pending",
            ChunkState::Reading => "reading",
            ChunkState::Processing => "processing",
            ChunkState::Writing => "writing",
            ChunkState::Committed => "committed",
            ChunkState::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// Where an item failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemPhase {
    Process,
    Write,
}

/// The failing item: the raw row if transformation failed, the document if writing did.
#[derive(Debug, Clone, PartialEq)]
pub enum FailedItem {
    Row(SourceRow),
    Document(MigrationDocument),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedItem {
    pub item: FailedItem,
    pub phase: ItemPhase,
    pub error: String,
}

/// Outcome of a single chunk.
#[derive(Debug, Clone)]
pub struct ChunkResult {
    pub sequence: u64,
    pub state: ChunkState,
    pub read_count: usize,
    pub processed_count: usize,
    pub written_count: usize,
    pub retry_count: usize,
    pub skipped: Vec<SkippedItem>,
    pub elapsed: Duration,
}

impl ChunkResult {
    pub fn new(sequence: u64, read_count: usize) -> Self {
        Self {
            sequence,
            state: ChunkState::Pending,
            read_count,
            processed_count: 0,
            written_count: 0,
            retry_count: 0,
            skipped: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }

    pub fn skipped_in(&self, phase: ItemPhase) -> usize {
        self.skipped.iter().filter(|s| s.phase == phase).count()
    }

    pub fn summary(&self) -> ChunkSummary {
        ChunkSummary {
            sequence: self.sequence,
            read_count: self.read_count as u64,
            processed_count: self.processed_count as u64,
            written_count: self.written_count as u64,
            process_skips: self.skipped_in(ItemPhase::Process) as u64,
            write_skips: self.skipped_in(ItemPhase::Write) as u64,
            retry_count: self.retry_count as u64,
            elapsed_ms: self.elapsed.as_millis() as u64,
        }
    }
}

/// Counters of a chunk without the failed items, cheap to publish and persist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkSummary {
    pub sequence: u64,
    pub read_count: u64,
    pub processed_count: u64,
    pub written_count: u64,
    pub process_skips: u64,
    pub write_skips: u64,
    pub retry_count: u64,
    pub elapsed_ms: u64,
}

impl ChunkSummary {
    pub fn skipped(&self) -> u64 {
        self.process_skips + self.write_skips
    }
}
