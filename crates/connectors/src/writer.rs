use crate::error::WriteError;
use async_trait::async_trait;
use model::records::document::MigrationDocument;

/// A sink that receives whole chunks of documents.
#[async_trait]
pub trait DocumentWriter: Send + Sync {
    fn name(&self) -> &str;

    async fn write(&self, documents: &[MigrationDocument]) -> Result<(), WriteError>;
}
