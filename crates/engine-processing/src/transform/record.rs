use super::{Transform, recovery};
use crate::error::TransformError;
use model::{
    core::value::Value,
    execution::job::{JobSpec, KeyPolicy},
    records::{document::MigrationDocument, row::SourceRow},
};
use serde_json::{Map, Value as JsonValue};

/// Joins key fragments into a document identifier.
pub const KEY_SEPARATOR: char = '_';

/// Maps a source row onto a [`MigrationDocument`] keyed by the job's key columns.
#[derive(Debug, Clone)]
pub struct RecordTransformer {
    key_columns: Vec<String>,
    key_policy: KeyPolicy,
    max_depth: usize,
}

impl RecordTransformer {
    pub fn new(key_columns: Vec<String>, key_policy: KeyPolicy) -> Self {
        Self {
            key_columns,
            key_policy,
            max_depth: recovery::DEFAULT_MAX_DEPTH,
        }
    }

    pub fn from_job(job: &JobSpec) -> Self {
        Self::new(job.source.key_columns.clone(), job.key_policy)
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Pass-through entry: no row in, no document out.
    pub fn process(
        &self,
        row: Option<&SourceRow>,
    ) -> Result<Option<MigrationDocument>, TransformError> {
        row.map(|row| self.transform_row(row)).transpose()
    }

    pub fn transform_row(&self, row: &SourceRow) -> Result<MigrationDocument, TransformError> {
        if row.is_empty() {
            return Err(TransformError::Malformed(format!(
                "row from '{}' has no columns",
                row.table
            )));
        }

        let id = self.derive_id(row)?;

        let mut data = Map::with_capacity(row.len());
        for field in &row.field_values {
            let value = match &field.value {
                Value::String(text) => recovery::recover_text(text, self.max_depth),
                other => other.to_json(),
            };
            if data.insert(field.name.clone(), value).is_some() {
                return Err(TransformError::Malformed(format!(
                    "duplicate column '{}'",
                    field.name
                )));
            }
        }

        Ok(MigrationDocument::new(id, &row.table, data))
    }

    /// Key fragments in declared order, each followed by the separator, minus the final one.
    /// Under the lenient policy an absent or NULL key is dropped along with its separator.
    pub fn derive_id(&self, row: &SourceRow) -> Result<String, TransformError> {
        let mut id = String::new();
        let mut has_content = false;

        for column in &self.key_columns {
            let value = match row.get(column).map(|f| &f.value) {
                None | Some(Value::Null) => match self.key_policy {
                    KeyPolicy::Strict => {
                        return Err(TransformError::MissingKey {
                            column: column.clone(),
                        });
                    }
                    KeyPolicy::Lenient => continue,
                },
                Some(value) => value,
            };
            let fragment = value
                .as_string()
                .ok_or_else(|| TransformError::UnsupportedKey {
                    column: column.clone(),
                    kind: value.type_name(),
                })?;

            has_content |= !fragment.is_empty();
            id.push_str(&fragment);
            id.push(KEY_SEPARATOR);
        }

        if !has_content {
            return Err(TransformError::EmptyIdentifier {
                columns: self.key_columns.clone(),
            });
        }

        id.pop();
        Ok(id)
    }
}

impl Transform for RecordTransformer {
    fn transform(&self, row: &SourceRow) -> Result<MigrationDocument, TransformError> {
        self.transform_row(row)
    }
}
