use crate::error::TransformError;
use model::records::{document::MigrationDocument, row::SourceRow};

pub mod record;
pub mod recovery;

pub use record::RecordTransformer;

/// Turns one source row into one target document. Must be pure: the executor
/// may call it again for the same row when a failure is classified as retryable.
pub trait Transform: Send + Sync {
    fn transform(&self, row: &SourceRow) -> Result<MigrationDocument, TransformError>;
}
