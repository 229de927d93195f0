use crate::error::ExtractionError;
use async_trait::async_trait;
use model::records::row::SourceRow;

/// Forward-only, pull-based row source. `Ok(None)` marks exhaustion.
#[async_trait]
pub trait RowReader: Send {
    async fn read(&mut self) -> Result<Option<SourceRow>, ExtractionError>;

    /// Pulls up to `max` rows, stopping early at exhaustion.
    async fn read_chunk(&mut self, max: usize) -> Result<Vec<SourceRow>, ExtractionError> {
        let mut rows = Vec::with_capacity(max.min(4096));
        while rows.len() < max {
            match self.read().await? {
                Some(row) => rows.push(row),
                None => break,
            }
        }
        Ok(rows)
    }
}
