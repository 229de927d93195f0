use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Schema version stamped on every document.
pub const SCHEMA_VERSION: &str = "1.0";

/// Status of a freshly transformed document.
pub const STATUS_MIGRATED: &str = "MIGRATED";

/// Status written to archive rows.
pub const STATUS_COMPLETED: &str = "COMPLETED";

/// The document written to the target store for one source row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationDocument {
    pub id: String,
    pub source_table: String,
    pub migration_time: DateTime<Utc>,
    pub version: String,
    pub data: Map<String, JsonValue>,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl MigrationDocument {
    pub fn new(id: String, source_table: &str, data: Map<String, JsonValue>) -> Self {
        Self {
            id,
            source_table: source_table.to_string(),
            migration_time: Utc::now(),
            version: SCHEMA_VERSION.to_string(),
            data,
            status: STATUS_MIGRATED.to_string(),
            error_message: None,
        }
    }

    /// Serialized payload as stored in the archive table.
    pub fn data_json(&self) -> String {
        JsonValue::Object(self.data.clone()).to_string()
    }
}
