use crate::{
    error::ExtractionError,
    reader::RowReader,
    sql::postgres::{query, row::to_source_row, utils::connect_client},
};
use async_trait::async_trait;
use model::{execution::job::SourceSpec, records::row::SourceRow};
use std::collections::VecDeque;
use tokio_postgres::Client;
use tracing::{debug, info};

/// Streams rows through a server-side cursor, holding at most one fetch in memory.
pub struct PgRowReader {
    client: Client,
    source: SourceSpec,
    fetch_size: usize,
    buffer: VecDeque<SourceRow>,
    exhausted: bool,
    fetched: u64,
}

impl PgRowReader {
    pub async fn open(
        url: &str,
        source: &SourceSpec,
        fetch_size: usize,
    ) -> Result<Self, ExtractionError> {
        let client = connect_client(url).await?;
        let select = query::select_statement(source);

        info!(table = %source.qualified_table(), sql = %select, "Opening source cursor");

        client
            .batch_execute(&query::declare_cursor(&select))
            .await
            .map_err(|source_err| ExtractionError::Open {
                table: source.qualified_table(),
                source: source_err,
            })?;

        Ok(Self {
            client,
            source: source.clone(),
            fetch_size: fetch_size.max(1),
            buffer: VecDeque::with_capacity(fetch_size),
            exhausted: false,
            fetched: 0,
        })
    }

    async fn fill(&mut self) -> Result<(), ExtractionError> {
        let rows = self
            .client
            .query(&query::fetch_forward(self.fetch_size), &[])
            .await
            .map_err(ExtractionError::Fetch)?;

        if rows.is_empty() {
            self.client
                .batch_execute(&query::close_cursor())
                .await
                .map_err(ExtractionError::Fetch)?;
            self.exhausted = true;
            info!(table = %self.source.table, rows = self.fetched, "Source cursor exhausted");
            return Ok(());
        }

        debug!(table = %self.source.table, rows = rows.len(), "Fetched rows");
        self.fetched += rows.len() as u64;
        for row in &rows {
            self.buffer.push_back(to_source_row(row, &self.source)?);
        }
        Ok(())
    }
}

#[async_trait]
impl RowReader for PgRowReader {
    async fn read(&mut self) -> Result<Option<SourceRow>, ExtractionError> {
        if self.buffer.is_empty() && !self.exhausted {
            self.fill().await?;
        }
        Ok(self.buffer.pop_front())
    }
}
