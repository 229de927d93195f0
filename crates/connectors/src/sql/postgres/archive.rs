use crate::{
    error::{ConnectorError, WriteError},
    sql::postgres::utils::connect_client,
    writer::DocumentWriter,
};
use async_trait::async_trait;
use chrono::Utc;
use model::records::document::{MigrationDocument, STATUS_COMPLETED};
use tokio::sync::Mutex;
use tokio_postgres::Client;
use tracing::debug;

/// Append-only audit rows, one per migrated document.
///
/// Expects a table shaped like
/// `(DOCUMENT_ID TEXT, SOURCE_TABLE TEXT, MIGRATION_TIME TIMESTAMPTZ, STATUS TEXT, DATA TEXT)`.
/// Each chunk is inserted inside one transaction, so a failed chunk leaves no rows behind.
/// Rows are not deduplicated: a retried chunk archives again.
pub struct PgArchiveWriter {
    client: Mutex<Client>,
    table: String,
    statement: String,
}

impl PgArchiveWriter {
    pub async fn connect(url: &str, table: &str) -> Result<Self, ConnectorError> {
        let client = connect_client(url).await?;
        Ok(Self::new(client, table))
    }

    pub fn new(client: Client, table: &str) -> Self {
        Self {
            client: Mutex::new(client),
            table: table.to_string(),
            statement: insert_statement(table),
        }
    }
}

pub fn insert_statement(table: &str) -> String {
    format!(
        "INSERT INTO {table} (DOCUMENT_ID, SOURCE_TABLE, MIGRATION_TIME, STATUS, DATA) \
         VALUES ($1, $2, $3, $4, $5)"
    )
}

#[async_trait]
impl DocumentWriter for PgArchiveWriter {
    fn name(&self) -> &str {
        "archive"
    }

    async fn write(&self, documents: &[MigrationDocument]) -> Result<(), WriteError> {
        if documents.is_empty() {
            return Ok(());
        }

        let mut client = self.client.lock().await;
        let tx = client.transaction().await?;
        let stmt = tx.prepare(&self.statement).await?;
        let archived_at = Utc::now();

        for doc in documents {
            let data = doc.data_json();
            tx.execute(
                &stmt,
                &[
                    &doc.id,
                    &doc.source_table,
                    &archived_at,
                    &STATUS_COMPLETED,
                    &data,
                ],
            )
            .await?;
        }

        // Dropping an uncommitted transaction rolls it back.
        tx.commit().await?;
        debug!(table = %self.table, rows = documents.len(), "Archived chunk");
        Ok(())
    }
}
