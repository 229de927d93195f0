use crate::{error::WriteError, writer::DocumentWriter};
use async_trait::async_trait;
use model::records::document::MigrationDocument;
use mongodb::{
    Collection, Database,
    bson::{self, Document, doc},
};
use tracing::debug;

/// Replace-or-insert by `_id`. Writing the same document twice leaves the collection unchanged.
pub struct MongoUpsertWriter {
    collection: Collection<Document>,
}

impl MongoUpsertWriter {
    pub fn new(database: &Database, collection: &str) -> Self {
        Self {
            collection: database.collection::<Document>(collection),
        }
    }
}

pub fn to_bson_document(document: &MigrationDocument) -> Result<Document, WriteError> {
    let data = bson::to_bson(&document.data).map_err(|e| WriteError::Encode {
        id: document.id.clone(),
        reason: e.to_string(),
    })?;

    let mut out = doc! {
        "_id": document.id.as_str(),
        "sourceTable": document.source_table.as_str(),
        "migrationTime": bson::DateTime::from_millis(document.migration_time.timestamp_millis()),
        "version": document.version.as_str(),
        "status": document.status.as_str(),
        "data": data,
    };
    if let Some(message) = &document.error_message {
        out.insert("errorMessage", message.as_str());
    }
    Ok(out)
}

#[async_trait]
impl DocumentWriter for MongoUpsertWriter {
    fn name(&self) -> &str {
        "upsert"
    }

    async fn write(&self, documents: &[MigrationDocument]) -> Result<(), WriteError> {
        for document in documents {
            let replacement = to_bson_document(document)?;
            self.collection
                .replace_one(doc! { "_id": document.id.as_str() }, replacement)
                .upsert(true)
                .await?;
        }

        debug!(
            collection = %self.collection.name(),
            documents = documents.len(),
            "Upserted chunk"
        );
        Ok(())
    }
}
